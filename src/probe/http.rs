//! HTTP status probing
//!
//! Authenticated GET against a configured status endpoint. The target
//! URL and the status path concatenate verbatim; a parameterless spec
//! probes the bare target.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use tracing::debug;

use super::status::ProbeStatus;
use super::{ProbeBackend, ProbeSpec, PARAM_NONE};
use crate::error::Result;

/// Probes status endpoints with authenticated HTTP GET requests.
///
/// A 200 answer counts as success, 401 and 403 classify as auth
/// failures, everything else (connection errors included) as other.
pub struct HttpStatusBackend {
    client: Client,
}

impl HttpStatusBackend {
    /// One shared client; connection establishment is bounded by
    /// `connect_timeout`, overall duration by the batch deadline.
    pub fn new(connect_timeout: Duration) -> Result<Self> {
        let client = Client::builder().connect_timeout(connect_timeout).build()?;
        Ok(Self { client })
    }

    fn request_url(spec: &ProbeSpec) -> String {
        if spec.param == PARAM_NONE {
            spec.target.clone()
        } else {
            format!("{}{}", spec.target, spec.param)
        }
    }
}

#[async_trait]
impl ProbeBackend for HttpStatusBackend {
    async fn perform(&self, spec: &ProbeSpec) -> ProbeStatus {
        let url = Self::request_url(spec);
        let result = self
            .client
            .get(&url)
            .basic_auth(&spec.username, Some(&spec.password))
            .send()
            .await;

        match result {
            Ok(response) => match response.status() {
                StatusCode::OK => ProbeStatus::Success,
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                    debug!(
                        target = %spec.display_target,
                        status = %response.status(),
                        "status endpoint rejected credentials"
                    );
                    ProbeStatus::ErrorAuth
                }
                other => {
                    debug!(
                        target = %spec.display_target,
                        status = %other,
                        "status endpoint answered unexpectedly"
                    );
                    ProbeStatus::ErrorOther
                }
            },
            Err(e) => {
                debug!(target = %spec.display_target, error = %e, "status request failed");
                ProbeStatus::ErrorOther
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::ActionKind;
    use std::sync::Arc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn spec(target: &str, param: &str) -> ProbeSpec {
        ProbeSpec {
            action: ActionKind::StatusCheck,
            target: target.to_string(),
            display_target: target.to_string(),
            param: param.to_string(),
            username: "probe_user".to_string(),
            password: "probe_pass".to_string(),
        }
    }

    /// Answer exactly one request with the given status line and hand
    /// back the raw request for header assertions.
    async fn serve_once(status_line: &'static str) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 4096];
            let n = socket.read(&mut buf).await.unwrap();
            let request = String::from_utf8_lossy(&buf[..n]).to_string();
            let response = format!(
                "HTTP/1.1 {status_line}\r\ncontent-length: 2\r\nconnection: close\r\n\r\n{{}}"
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
            request
        });
        (format!("http://{addr}"), handle)
    }

    fn backend() -> HttpStatusBackend {
        HttpStatusBackend::new(Duration::from_secs(2)).unwrap()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn ok_answer_is_success() {
        let (target, server) = serve_once("200 OK").await;
        let status = backend().perform(&spec(&target, PARAM_NONE)).await;
        assert_eq!(status, ProbeStatus::Success);
        server.await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn unauthorized_is_error_auth() {
        let (target, server) = serve_once("401 Unauthorized").await;
        let status = backend().perform(&spec(&target, PARAM_NONE)).await;
        assert_eq!(status, ProbeStatus::ErrorAuth);
        server.await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn forbidden_is_error_auth() {
        let (target, server) = serve_once("403 Forbidden").await;
        let status = backend().perform(&spec(&target, PARAM_NONE)).await;
        assert_eq!(status, ProbeStatus::ErrorAuth);
        server.await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn server_error_is_error_other() {
        let (target, server) = serve_once("503 Service Unavailable").await;
        let status = backend().perform(&spec(&target, PARAM_NONE)).await;
        assert_eq!(status, ProbeStatus::ErrorOther);
        server.await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn connection_failure_is_error_other() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let target = format!("http://{}", listener.local_addr().unwrap());
        drop(listener);
        let status = backend().perform(&spec(&target, PARAM_NONE)).await;
        assert_eq!(status, ProbeStatus::ErrorOther);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn sends_basic_auth_and_requested_path() {
        let (target, server) = serve_once("200 OK").await;
        let probe_spec = spec(&target, "/webhdfs/v1/?op=GETFILESTATUS");
        let status = backend().perform(&probe_spec).await;
        assert_eq!(status, ProbeStatus::Success);
        let request = server.await.unwrap();
        assert!(request.starts_with("GET /webhdfs/v1/?op=GETFILESTATUS"));
        assert!(request.to_lowercase().contains("authorization: basic "));
    }

    #[test]
    fn request_url_concatenates_target_and_param() {
        let with_path = spec("https://gw.example:8443/gateway/default/webhdfs/v1", "/?op=LISTSTATUS");
        assert_eq!(
            HttpStatusBackend::request_url(&with_path),
            "https://gw.example:8443/gateway/default/webhdfs/v1/?op=LISTSTATUS"
        );
        let bare = spec("https://gw.example:8443/gateway/default/hbase/status", PARAM_NONE);
        assert_eq!(
            HttpStatusBackend::request_url(&bare),
            "https://gw.example:8443/gateway/default/hbase/status"
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn usable_through_the_backend_trait_object() {
        let (target, server) = serve_once("200 OK").await;
        let backend: Arc<dyn ProbeBackend> = Arc::new(backend());
        let status = backend.perform(&spec(&target, PARAM_NONE)).await;
        assert_eq!(status, ProbeStatus::Success);
        server.await.unwrap();
    }
}
