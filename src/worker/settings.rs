//! Runtime settings for one worker process

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::ConfigError;

/// Dataflow engine executable and its fixed arguments
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl EngineCommand {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }
}

/// Settings shared by a worker's coordinator, leader and supervisor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerSettings {
    /// Unique worker name
    pub name: String,

    /// Delay between message polls
    pub poll_interval: Duration,

    /// Delay between leader ticks
    pub leader_interval: Duration,

    /// Engine started once per topology
    pub engine: EngineCommand,
}

impl WorkerSettings {
    pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);
    pub const DEFAULT_LEADER_INTERVAL: Duration = Duration::from_secs(3);

    pub fn builder() -> WorkerSettingsBuilder {
        WorkerSettingsBuilder::default()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::missing("name"));
        }
        if self.poll_interval.is_zero() {
            return Err(ConfigError::invalid("poll_interval", "must be greater than 0"));
        }
        if self.leader_interval.is_zero() {
            return Err(ConfigError::invalid("leader_interval", "must be greater than 0"));
        }
        if self.engine.program.trim().is_empty() {
            return Err(ConfigError::missing("engine.program"));
        }
        Ok(())
    }
}

/// Builder for WorkerSettings
#[derive(Debug, Default)]
pub struct WorkerSettingsBuilder {
    name: Option<String>,
    poll_interval: Option<Duration>,
    leader_interval: Option<Duration>,
    engine: Option<EngineCommand>,
}

impl WorkerSettingsBuilder {
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = Some(interval);
        self
    }

    pub fn leader_interval(mut self, interval: Duration) -> Self {
        self.leader_interval = Some(interval);
        self
    }

    pub fn engine<I, S>(mut self, program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.engine = Some(EngineCommand::new(program, args));
        self
    }

    pub fn build(self) -> Result<WorkerSettings, ConfigError> {
        let settings = WorkerSettings {
            name: self.name.ok_or_else(|| ConfigError::missing("name"))?,
            poll_interval: self
                .poll_interval
                .unwrap_or(WorkerSettings::DEFAULT_POLL_INTERVAL),
            leader_interval: self
                .leader_interval
                .unwrap_or(WorkerSettings::DEFAULT_LEADER_INTERVAL),
            engine: self
                .engine
                .ok_or_else(|| ConfigError::missing("engine.program"))?,
        };

        settings.validate()?;
        Ok(settings)
    }
}
