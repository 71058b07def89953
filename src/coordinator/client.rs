//! HTTP client backend for the coordination store
//!
//! [`HttpCoordinator`] implements [`CoordinationStorage`] by issuing one POST
//! per call against a [`super::CoordinationServer`]. Domain failures come back
//! as the same [`StorageError`] the server-side store produced; network and
//! protocol failures become [`StorageError::Transport`]. Nothing is retried
//! here: the next poll cycle is the retry.

use async_trait::async_trait;
use reqwest::Client;
use serde::de::{DeserializeOwned, IgnoredAny};
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use url::Url;

use crate::models::{
    LeadershipStatus, Message, TopologyConfig, TopologyRecord, TopologyStatus, WorkerRecord,
    WorkerStatus,
};
use crate::storage::{CoordinationStorage, StorageError, StorageResult};

use super::api::{
    paths, AssignRequest, ErrorResponse, RegisterTopologyRequest, TopologyRequest,
    TopologyStatusRequest, WorkerRequest, WorkerStatusRequest,
};

// ============================================================================
// Client Configuration
// ============================================================================

/// Configuration for the coordination client
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Coordination service base URL
    pub base_url: String,

    /// Request timeout
    pub timeout: Duration,
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout: Duration::from_secs(10),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

// ============================================================================
// Client Errors
// ============================================================================

/// Failures below the storage contract
#[derive(Error, Debug, Clone)]
pub enum ClientError {
    #[error("Initialization error: {0}")]
    Init(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("HTTP error ({status}): {message}")]
    Http { status: u16, message: String },

    #[error("Parse error: {0}")]
    Parse(String),
}

impl From<ClientError> for StorageError {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::Http { status, message } if (400..500).contains(&status) => {
                StorageError::invalid_request(format!("HTTP {status}: {message}"))
            }
            other => StorageError::transport(other.to_string()),
        }
    }
}

// ============================================================================
// Http Coordinator
// ============================================================================

/// Coordination store living behind a remote HTTP service
#[derive(Debug, Clone)]
pub struct HttpCoordinator {
    base: Url,
    http_client: Client,
}

impl HttpCoordinator {
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        let mut raw = config.base_url.trim().to_string();
        if !raw.ends_with('/') {
            raw.push('/');
        }
        let base = Url::parse(&raw).map_err(|e| ClientError::Init(format!("{raw}: {e}")))?;

        let http_client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ClientError::Init(e.to_string()))?;

        Ok(Self { base, http_client })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    fn endpoint(&self, path: &str) -> Result<Url, ClientError> {
        self.base
            .join(path.trim_start_matches('/'))
            .map_err(|e| ClientError::Init(format!("{path}: {e}")))
    }

    /// One POST; the body of a non-2xx response is decoded as [`ErrorResponse`]
    async fn post<B, R>(&self, path: &str, body: &B) -> StorageResult<R>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let url = self.endpoint(path)?;

        let response = self
            .http_client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| ClientError::Network(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return response
                .json::<R>()
                .await
                .map_err(|e| ClientError::Parse(e.to_string()).into());
        }

        let text = response
            .text()
            .await
            .map_err(|e| ClientError::Network(e.to_string()))?;
        match serde_json::from_str::<ErrorResponse>(&text) {
            Ok(err) => Err(err.detail),
            Err(_) => Err(ClientError::Http {
                status: status.as_u16(),
                message: text,
            }
            .into()),
        }
    }

    async fn post_ack<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> StorageResult<()> {
        self.post::<B, IgnoredAny>(path, body).await.map(|_| ())
    }

    fn worker(name: &str) -> WorkerRequest {
        WorkerRequest {
            worker: name.to_string(),
        }
    }

    fn topology(uuid: &str) -> TopologyRequest {
        TopologyRequest {
            uuid: uuid.to_string(),
        }
    }
}

/// Empty JSON object for operations without arguments
#[derive(Serialize)]
struct NoArgs {}

#[async_trait]
impl CoordinationStorage for HttpCoordinator {
    async fn register_worker(&self, name: &str) -> StorageResult<()> {
        self.post_ack(paths::REGISTER_WORKER, &Self::worker(name)).await
    }

    async fn get_worker_status(&self) -> StorageResult<Vec<WorkerRecord>> {
        self.post(paths::WORKER_STATUSES, &NoArgs {}).await
    }

    async fn get_topology_status(&self) -> StorageResult<Vec<TopologyRecord>> {
        self.post(paths::TOPOLOGY_STATUSES, &NoArgs {}).await
    }

    async fn get_topologies_for_worker(&self, name: &str) -> StorageResult<Vec<TopologyRecord>> {
        self.post(paths::WORKER_TOPOLOGIES, &Self::worker(name)).await
    }

    async fn get_leadership_status(&self) -> StorageResult<LeadershipStatus> {
        self.post(paths::LEADERSHIP_STATUS, &NoArgs {}).await
    }

    async fn announce_leader_candidacy(&self, name: &str) -> StorageResult<()> {
        self.post_ack(paths::ANNOUNCE_LEADER_CANDIDACY, &Self::worker(name))
            .await
    }

    async fn check_leader_candidacy(&self, name: &str) -> StorageResult<bool> {
        self.post(paths::CHECK_LEADER_CANDIDACY, &Self::worker(name))
            .await
    }

    async fn assign_topology(&self, uuid: &str, worker: &str) -> StorageResult<()> {
        let body = AssignRequest {
            uuid: uuid.to_string(),
            worker: worker.to_string(),
        };
        self.post_ack(paths::ASSIGN_TOPOLOGY, &body).await
    }

    async fn set_topology_status(
        &self,
        uuid: &str,
        status: TopologyStatus,
        error: Option<&str>,
    ) -> StorageResult<()> {
        let body = TopologyStatusRequest {
            uuid: uuid.to_string(),
            status,
            error: error.map(str::to_string),
        };
        self.post_ack(paths::SET_TOPOLOGY_STATUS, &body).await
    }

    async fn set_worker_status(&self, name: &str, status: WorkerStatus) -> StorageResult<()> {
        let body = WorkerStatusRequest {
            worker: name.to_string(),
            status,
        };
        self.post_ack(paths::SET_WORKER_STATUS, &body).await
    }

    async fn get_messages(&self, name: &str) -> StorageResult<Vec<Message>> {
        self.post(paths::GET_MESSAGES, &Self::worker(name)).await
    }

    async fn register_topology(&self, uuid: &str, config: TopologyConfig) -> StorageResult<()> {
        let body = RegisterTopologyRequest {
            uuid: uuid.to_string(),
            config,
        };
        self.post_ack(paths::REGISTER_TOPOLOGY, &body).await
    }

    async fn enable_topology(&self, uuid: &str) -> StorageResult<()> {
        self.post_ack(paths::ENABLE_TOPOLOGY, &Self::topology(uuid)).await
    }

    async fn disable_topology(&self, uuid: &str) -> StorageResult<()> {
        self.post_ack(paths::DISABLE_TOPOLOGY, &Self::topology(uuid)).await
    }

    async fn delete_topology(&self, uuid: &str) -> StorageResult<()> {
        self.post_ack(paths::DELETE_TOPOLOGY, &Self::topology(uuid)).await
    }

    async fn stop_topology(&self, uuid: &str) -> StorageResult<()> {
        self.post_ack(paths::STOP_TOPOLOGY, &Self::topology(uuid)).await
    }

    async fn clear_topology_error(&self, uuid: &str) -> StorageResult<()> {
        self.post_ack(paths::CLEAR_TOPOLOGY_ERROR, &Self::topology(uuid))
            .await
    }

    async fn shut_down_worker(&self, name: &str) -> StorageResult<()> {
        self.post_ack(paths::SHUT_DOWN_WORKER, &Self::worker(name)).await
    }

    async fn get_topology_info(&self, uuid: &str) -> StorageResult<TopologyRecord> {
        self.post(paths::TOPOLOGY_INFO, &Self::topology(uuid)).await
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> HttpCoordinator {
        HttpCoordinator::new(ClientConfig::new(server.uri()).with_timeout(Duration::from_secs(2)))
            .unwrap()
    }

    #[test]
    fn test_client_config() {
        let config = ClientConfig::new("http://localhost:8080").with_timeout(Duration::from_secs(3));
        assert_eq!(config.timeout, Duration::from_secs(3));
    }

    #[test]
    fn test_base_url_gets_trailing_slash() {
        let client = HttpCoordinator::new(ClientConfig::new("http://localhost:8080/coord")).unwrap();
        assert_eq!(client.base_url().as_str(), "http://localhost:8080/coord/");
        assert_eq!(
            client.endpoint(paths::GET_MESSAGES).unwrap().as_str(),
            "http://localhost:8080/coord/get-messages"
        );
    }

    #[test]
    fn test_invalid_base_url() {
        let result = HttpCoordinator::new(ClientConfig::new("not a url"));
        assert!(matches!(result, Err(ClientError::Init(_))));
    }

    #[tokio::test]
    async fn test_request_body_shape() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/assign-topology"))
            .and(body_json(json!({"uuid": "t1", "worker": "w1"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(1)
            .mount(&server)
            .await;

        client(&server).assign_topology("t1", "w1").await.unwrap();
    }

    #[tokio::test]
    async fn test_bare_response_values() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/check-leader-candidacy"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!(true)))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/leadership-status"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!("pending")))
            .mount(&server)
            .await;

        let client = client(&server);
        assert!(client.check_leader_candidacy("w1").await.unwrap());
        assert_eq!(
            client.get_leadership_status().await.unwrap(),
            LeadershipStatus::Pending
        );
    }

    #[tokio::test]
    async fn test_domain_error_is_rebuilt() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/topology-info"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "error": "Topology not found: t9",
                "kind": "topology_not_found",
                "uuid": "t9"
            })))
            .mount(&server)
            .await;

        let err = client(&server).get_topology_info("t9").await.unwrap_err();
        assert_eq!(err, StorageError::topology_not_found("t9"));
        assert!(!err.is_transport());
    }

    #[tokio::test]
    async fn test_server_failure_without_body_is_transport() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .mount(&server)
            .await;

        let err = client(&server).get_messages("w1").await.unwrap_err();
        assert!(err.is_transport());
    }

    #[tokio::test]
    async fn test_unparsable_success_body_is_transport() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/worker-statuses"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        let err = client(&server).get_worker_status().await.unwrap_err();
        assert!(err.is_transport());
    }

    #[tokio::test]
    async fn test_connection_refused_is_transport() {
        let client = HttpCoordinator::new(
            ClientConfig::new("http://127.0.0.1:9").with_timeout(Duration::from_millis(500)),
        )
        .unwrap();
        let err = client.register_worker("w1").await.unwrap_err();
        assert!(err.is_transport());
    }

    #[tokio::test]
    async fn test_truncated_error_body_is_transport() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let responder = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = [0u8; 1024];
            let _ = socket.read(&mut request).await.unwrap();
            socket
                .write_all(
                    b"HTTP/1.1 404 Not Found\r\ncontent-type: application/json\r\ncontent-length: 64\r\n\r\n{\"error\"",
                )
                .await
                .unwrap();
            socket.shutdown().await.unwrap();
        });

        let client = HttpCoordinator::new(
            ClientConfig::new(format!("http://{addr}")).with_timeout(Duration::from_secs(2)),
        )
        .unwrap();
        let err = client.get_topology_info("t1").await.unwrap_err();
        assert!(matches!(err, StorageError::Transport { .. }));

        responder.await.unwrap();
    }
}
