//! Seam for the topology configuration compiler
//!
//! Expanding and validating a topology definition belongs to the dataflow
//! toolchain. The worker only needs "config in, engine-ready config out", so
//! that is all [`TopologyCompiler`] asks for.

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::models::TopologyConfig;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CompileError {
    #[error("Invalid topology {uuid}: {reason}")]
    Invalid { uuid: String, reason: String },
}

/// Turns a stored topology definition into what the engine is started with
#[async_trait]
pub trait TopologyCompiler: Send + Sync {
    async fn compile(&self, uuid: &str, config: &TopologyConfig) -> Result<TopologyConfig, CompileError>;
}

/// Hands the definition through after a shape check
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughCompiler;

#[async_trait]
impl TopologyCompiler for PassthroughCompiler {
    async fn compile(&self, uuid: &str, config: &TopologyConfig) -> Result<TopologyConfig, CompileError> {
        match config.as_value() {
            Value::Object(_) => Ok(config.clone()),
            other => Err(CompileError::Invalid {
                uuid: uuid.to_string(),
                reason: format!("definition must be a JSON object, got {}", kind_of(other)),
            }),
        }
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
