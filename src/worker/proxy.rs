//! Bridge to one engine child process
//!
//! Each running topology gets its own engine process. The proxy talks to it
//! over stdin/stdout with newline-delimited JSON:
//!
//! ```text
//!   proxy ── {"cmd":"init","data":{"uuid":..,"config":..}} ──► engine
//!   proxy ◄── {"cmd":"response_init","data":{"err":null}} ─── engine
//! ```
//!
//! Every verb has one callback slot. A second request for a verb whose
//! response is still outstanding fails fast. When the child goes away every
//! outstanding slot is resolved: success on exit code 0, failure otherwise.
//! The owner hears about the exit once, through the channel passed to
//! [`TopologyLocalProxy::spawn`].

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::future::Future;
use std::process::Stdio;
use std::sync::Arc;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio::sync::{mpsc, oneshot, Mutex};

use super::settings::EngineCommand;
use crate::models::TopologyConfig;

/// Environment variable carrying the topology uuid into the engine
pub const TOPOLOGY_UUID_ENV: &str = "TOPOVISOR_TOPOLOGY_UUID";

// ============================================================================
// Protocol
// ============================================================================

/// Requests the proxy can send to the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProxyVerb {
    Init,
    Run,
    Pause,
    Shutdown,
}

impl ProxyVerb {
    pub const ALL: [ProxyVerb; 4] = [Self::Init, Self::Run, Self::Pause, Self::Shutdown];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::Run => "run",
            Self::Pause => "pause",
            Self::Shutdown => "shutdown",
        }
    }

    /// The `cmd` the engine answers this verb with
    pub fn response_cmd(&self) -> &'static str {
        match self {
            Self::Init => "response_init",
            Self::Run => "response_run",
            Self::Pause => "response_pause",
            Self::Shutdown => "response_shutdown",
        }
    }

    pub fn from_response(cmd: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|verb| verb.response_cmd() == cmd)
    }

    fn slot(self) -> usize {
        self as usize
    }
}

impl fmt::Display for ProxyVerb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Deserialize)]
struct EngineResponse {
    cmd: String,

    #[serde(default)]
    data: Value,
}

impl EngineResponse {
    /// `data.err`, when the engine reported one
    fn error(&self) -> Option<String> {
        match self.data.get("err") {
            None | Some(Value::Null) | Some(Value::Bool(false)) => None,
            Some(Value::String(message)) => Some(message.clone()),
            Some(other) => Some(other.to_string()),
        }
    }
}

// ============================================================================
// Errors and exit notices
// ============================================================================

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProxyError {
    #[error("Failed to start engine {program}: {reason}")]
    Spawn { program: String, reason: String },

    #[error("A {verb} request is already waiting for a response")]
    PendingCallbackExists { verb: ProxyVerb },

    #[error("Engine rejected {verb}: {message}")]
    Engine { verb: ProxyVerb, message: String },

    #[error("Engine exited {}", exit_label(.code))]
    ChildExited { code: Option<i32> },

    #[error("Engine pipe error: {0}")]
    Io(String),

    #[error("Engine response channel closed")]
    Closed,
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("with code {code}"),
        None => "without an exit code".to_string(),
    }
}

/// Sent once when an engine child goes away
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyExit {
    pub uuid: String,

    /// `None` when killed by a signal or the wait itself failed
    pub code: Option<i32>,
}

impl ProxyExit {
    pub fn is_clean(&self) -> bool {
        self.code == Some(0)
    }
}

type Callback = oneshot::Sender<Result<(), ProxyError>>;

#[derive(Default)]
struct Callbacks {
    pending: [Option<Callback>; 4],

    /// Set once the child is gone
    exited: Option<Option<i32>>,
}

// ============================================================================
// Proxy
// ============================================================================

/// One engine child process and its request/response bookkeeping
pub struct TopologyLocalProxy {
    uuid: String,
    writer: Mutex<Box<dyn AsyncWrite + Send + Unpin>>,
    callbacks: Arc<Mutex<Callbacks>>,
    kill: Mutex<Option<oneshot::Sender<()>>>,
}

impl fmt::Debug for TopologyLocalProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TopologyLocalProxy")
            .field("uuid", &self.uuid)
            .finish_non_exhaustive()
    }
}

impl TopologyLocalProxy {
    /// Start the engine for `uuid`
    ///
    /// The exit notice goes to `exits` exactly once.
    pub fn spawn(
        uuid: &str,
        engine: &EngineCommand,
        exits: mpsc::UnboundedSender<ProxyExit>,
    ) -> Result<Self, ProxyError> {
        let spawn_error = |reason: String| ProxyError::Spawn {
            program: engine.program.clone(),
            reason,
        };

        let mut child = Command::new(&engine.program)
            .args(&engine.args)
            .env(TOPOLOGY_UUID_ENV, uuid)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| spawn_error(e.to_string()))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| spawn_error("stdin was not captured".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| spawn_error("stdout was not captured".to_string()))?;

        tracing::info!(uuid = %uuid, program = %engine.program, pid = ?child.id(), "Engine started");

        let (kill_tx, kill_rx) = oneshot::channel::<()>();
        let id = uuid.to_string();
        let exit = async move {
            let status = tokio::select! {
                status = child.wait() => status,
                Ok(()) = kill_rx => {
                    if let Err(e) = child.start_kill() {
                        tracing::warn!(uuid = %id, error = %e, "Failed to kill engine");
                    }
                    child.wait().await
                }
            };

            match status {
                Ok(status) => status.code(),
                Err(e) => {
                    tracing::warn!(uuid = %id, error = %e, "Failed to wait for engine");
                    None
                }
            }
        };

        Ok(Self::attach(uuid, stdin, stdout, exit, Some(kill_tx), exits))
    }

    /// Wire a proxy onto arbitrary pipes and an exit future
    pub(crate) fn attach<W, R, F>(
        uuid: &str,
        writer: W,
        reader: R,
        exit: F,
        kill: Option<oneshot::Sender<()>>,
        exits: mpsc::UnboundedSender<ProxyExit>,
    ) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
        R: AsyncRead + Send + Unpin + 'static,
        F: Future<Output = Option<i32>> + Send + 'static,
    {
        let callbacks = Arc::new(Mutex::new(Callbacks::default()));

        tokio::spawn(read_responses(
            uuid.to_string(),
            reader,
            Arc::clone(&callbacks),
        ));

        let id = uuid.to_string();
        let exit_callbacks = Arc::clone(&callbacks);
        tokio::spawn(async move {
            let code = exit.await;
            broadcast_exit(id, code, &exit_callbacks, &exits).await;
        });

        Self {
            uuid: uuid.to_string(),
            writer: Mutex::new(Box::new(writer)),
            callbacks,
            kill: Mutex::new(kill),
        }
    }

    pub fn uuid(&self) -> &str {
        &self.uuid
    }

    /// Hand the compiled definition to the engine
    pub async fn init(&self, config: &TopologyConfig) -> Result<(), ProxyError> {
        self.call(
            ProxyVerb::Init,
            json!({ "uuid": self.uuid, "config": config }),
        )
        .await
    }

    pub async fn run(&self) -> Result<(), ProxyError> {
        self.call(ProxyVerb::Run, json!({})).await
    }

    pub async fn pause(&self) -> Result<(), ProxyError> {
        self.call(ProxyVerb::Pause, json!({})).await
    }

    /// Ask the engine to stop; it is expected to exit afterwards
    pub async fn shutdown(&self) -> Result<(), ProxyError> {
        self.call(ProxyVerb::Shutdown, json!({})).await
    }

    /// Kill the child without asking
    pub async fn kill(&self) {
        if let Some(kill) = self.kill.lock().await.take() {
            let _ = kill.send(());
        }
    }

    pub async fn has_exited(&self) -> bool {
        self.callbacks.lock().await.exited.is_some()
    }

    async fn call(&self, verb: ProxyVerb, data: Value) -> Result<(), ProxyError> {
        let response = {
            let mut callbacks = self.callbacks.lock().await;
            if let Some(code) = callbacks.exited {
                return Err(ProxyError::ChildExited { code });
            }

            let slot = &mut callbacks.pending[verb.slot()];
            if slot.is_some() {
                return Err(ProxyError::PendingCallbackExists { verb });
            }

            let (tx, rx) = oneshot::channel();
            *slot = Some(tx);
            rx
        };

        if let Err(e) = self.send(verb, &data).await {
            self.callbacks.lock().await.pending[verb.slot()] = None;
            return Err(e);
        }

        tracing::debug!(uuid = %self.uuid, verb = %verb, "Waiting for engine response");
        response.await.unwrap_or(Err(ProxyError::Closed))
    }

    async fn send(&self, verb: ProxyVerb, data: &Value) -> Result<(), ProxyError> {
        let mut frame = serde_json::to_vec(&json!({ "cmd": verb, "data": data }))
            .map_err(|e| ProxyError::Io(e.to_string()))?;
        frame.push(b'\n');

        let mut writer = self.writer.lock().await;
        writer
            .write_all(&frame)
            .await
            .map_err(|e| ProxyError::Io(e.to_string()))?;
        writer
            .flush()
            .await
            .map_err(|e| ProxyError::Io(e.to_string()))
    }
}

async fn read_responses<R>(uuid: String, reader: R, callbacks: Arc<Mutex<Callbacks>>)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => dispatch_line(&uuid, &line, &callbacks).await,
            Ok(None) => {
                tracing::debug!(uuid = %uuid, "Engine output closed");
                break;
            }
            Err(e) => {
                tracing::warn!(uuid = %uuid, error = %e, "Failed to read engine output");
                break;
            }
        }
    }
}

async fn dispatch_line(uuid: &str, line: &str, callbacks: &Mutex<Callbacks>) {
    let line = line.trim();
    if line.is_empty() {
        return;
    }

    let response: EngineResponse = match serde_json::from_str(line) {
        Ok(response) => response,
        Err(_) => {
            tracing::debug!(uuid = %uuid, line = %line, "Ignoring non-protocol engine output");
            return;
        }
    };

    let Some(verb) = ProxyVerb::from_response(&response.cmd) else {
        tracing::debug!(uuid = %uuid, cmd = %response.cmd, "Ignoring unsolicited engine message");
        return;
    };

    let result = match response.error() {
        None => Ok(()),
        Some(message) => Err(ProxyError::Engine { verb, message }),
    };

    let callback = callbacks.lock().await.pending[verb.slot()].take();
    match callback {
        Some(callback) => {
            let _ = callback.send(result);
        }
        None => {
            tracing::warn!(uuid = %uuid, verb = %verb, "Engine answered a request nobody is waiting on");
        }
    }
}

async fn broadcast_exit(
    uuid: String,
    code: Option<i32>,
    callbacks: &Mutex<Callbacks>,
    exits: &mpsc::UnboundedSender<ProxyExit>,
) {
    let waiting: Vec<Callback> = {
        let mut callbacks = callbacks.lock().await;
        if callbacks.exited.is_some() {
            return;
        }
        callbacks.exited = Some(code);
        callbacks.pending.iter_mut().filter_map(Option::take).collect()
    };

    for callback in waiting {
        let result = if code == Some(0) {
            Ok(())
        } else {
            Err(ProxyError::ChildExited { code })
        };
        let _ = callback.send(result);
    }

    if code == Some(0) {
        tracing::info!(uuid = %uuid, "Engine exited");
    } else {
        tracing::warn!(uuid = %uuid, code = ?code, "Engine exited abnormally");
    }

    if exits.send(ProxyExit { uuid, code }).is_err() {
        tracing::debug!("Exit listener already gone");
    }
}

// ============================================================================
// Tests
// ============================================================================
