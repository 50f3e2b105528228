//! Remote automation client: the single point of entry for all calls to the
//! automation backend.
//!
//! ARCHITECTURAL RULE: No other module may talk to the backend directly.
//! This client performs no retries and no caching; retry policy belongs to
//! the workflow orchestrator.

use std::time::Duration;

use anyhow::{bail, Context};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Url};
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::debug;

use crate::models::ApplyRequest;

pub mod wire;

pub use wire::{ApplyDetail, BulkApplyReply, LoginReply, ResumeEntry};
use wire::{
    BulkApplyBody, EmptyBody, ErrorReply, LoginStatusReply, PhoneBody, ResumeListReply,
    ResumeTextReply, VerifyCodeBody,
};

#[derive(Debug, Clone, Error)]
pub enum BackendError {
    /// Connection refused, DNS failure, timeout or a dropped body.
    #[error("backend unreachable: {0}")]
    Unreachable(String),

    /// The reply did not match the expected contract.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Non-2xx reply carrying the backend's own message.
    #[error("backend rejected request (status {status}): {message}")]
    Rejected { status: u16, message: String },
}

/// Typed interface over the automation backend. Carried by the orchestrator
/// as `Arc<dyn AutomationBackend>` so tests can swap in a scripted double.
#[async_trait]
pub trait AutomationBackend: Send + Sync {
    async fn login_status(&self, phone: &str) -> Result<bool, BackendError>;

    async fn init_login(&self, phone: &str) -> Result<LoginReply, BackendError>;

    async fn verify_code(&self, phone: &str, code: &str) -> Result<LoginReply, BackendError>;

    /// Resumes in the backend's listing order.
    async fn list_resumes(&self) -> Result<Vec<ResumeEntry>, BackendError>;

    /// `None` when the backend has no text for the file.
    async fn resume_text(&self, filename: &str) -> Result<Option<String>, BackendError>;

    async fn bulk_apply(&self, request: &ApplyRequest) -> Result<BulkApplyReply, BackendError>;

    async fn logout(&self, phone: &str) -> Result<LoginReply, BackendError>;
}

/// HTTP implementation of [`AutomationBackend`] over reqwest.
#[derive(Clone)]
pub struct HttpBackend {
    client: Client,
    base_url: Url,
    bulk_apply_timeout: Duration,
}

impl HttpBackend {
    /// `timeout` bounds every call except bulk-apply, which gets its own
    /// (much longer) bound since the backend runs the whole batch before replying.
    pub fn new(
        base_url: &str,
        timeout: Duration,
        bulk_apply_timeout: Duration,
    ) -> anyhow::Result<Self> {
        let base_url = Url::parse(base_url)
            .with_context(|| format!("Invalid automation backend URL '{base_url}'"))?;
        if base_url.cannot_be_a_base() {
            bail!("Automation backend URL '{base_url}' cannot carry a path");
        }

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url,
            bulk_apply_timeout,
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    /// Sends one request and decodes the reply.
    /// Transport failures, non-2xx replies and undecodable bodies are kept apart.
    async fn exchange<T: DeserializeOwned>(
        &self,
        op: &'static str,
        request: RequestBuilder,
    ) -> Result<T, BackendError> {
        let response = request
            .send()
            .await
            .map_err(|e| BackendError::Unreachable(describe_transport_error(op, &e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| BackendError::Unreachable(describe_transport_error(op, &e)))?;

        debug!("Backend {op} replied with status {status}");

        if !status.is_success() {
            let message = serde_json::from_str::<ErrorReply>(&body)
                .ok()
                .and_then(ErrorReply::into_message)
                .ok_or_else(|| {
                    BackendError::Protocol(format!(
                        "{op} returned status {status} without an error message"
                    ))
                })?;
            return Err(BackendError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        serde_json::from_str(&body)
            .map_err(|e| BackendError::Protocol(format!("{op} reply is malformed: {e}")))
    }
}

fn describe_transport_error(op: &str, err: &reqwest::Error) -> String {
    if err.is_timeout() {
        format!("{op} timed out")
    } else if err.is_connect() {
        format!("{op} could not connect: {err}")
    } else {
        format!("{op} failed: {err}")
    }
}

#[async_trait]
impl AutomationBackend for HttpBackend {
    async fn login_status(&self, phone: &str) -> Result<bool, BackendError> {
        let url = self.endpoint(&["api", "simple-apply", "status", phone]);
        let reply: LoginStatusReply = self.exchange("login-status", self.client.get(url)).await?;
        Ok(reply.logged_in)
    }

    async fn init_login(&self, phone: &str) -> Result<LoginReply, BackendError> {
        let url = self.endpoint(&["api", "simple-apply", "init-login"]);
        self.exchange(
            "init-login",
            self.client.post(url).json(&PhoneBody { phone }),
        )
        .await
    }

    async fn verify_code(&self, phone: &str, code: &str) -> Result<LoginReply, BackendError> {
        let url = self.endpoint(&["api", "simple-apply", "verify-code"]);
        self.exchange(
            "verify-code",
            self.client.post(url).json(&VerifyCodeBody { phone, code }),
        )
        .await
    }

    async fn list_resumes(&self) -> Result<Vec<ResumeEntry>, BackendError> {
        let url = self.endpoint(&["api", "resume", "list"]);
        let reply: ResumeListReply = self
            .exchange("resume-list", self.client.post(url).json(&EmptyBody {}))
            .await?;
        Ok(reply.resumes)
    }

    async fn resume_text(&self, filename: &str) -> Result<Option<String>, BackendError> {
        let url = self.endpoint(&["api", "resume", "text", filename]);
        let reply: ResumeTextReply = self
            .exchange("resume-text", self.client.post(url).json(&EmptyBody {}))
            .await?;
        Ok(reply.text)
    }

    async fn bulk_apply(&self, request: &ApplyRequest) -> Result<BulkApplyReply, BackendError> {
        let url = self.endpoint(&["api", "simple-apply", "apply"]);
        let body = BulkApplyBody {
            phone: &request.phone,
            resume_text: &request.resume_text,
            job_keyword: &request.job_keyword,
            city: &request.city,
            count: request.requested_count,
        };
        self.exchange(
            "bulk-apply",
            self.client
                .post(url)
                .timeout(self.bulk_apply_timeout)
                .json(&body),
        )
        .await
    }

    async fn logout(&self, phone: &str) -> Result<LoginReply, BackendError> {
        let url = self.endpoint(&["api", "simple-apply", "logout", phone]);
        self.exchange("logout", self.client.post(url)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};
    use serde_json::json;

    fn backend(url: &str) -> HttpBackend {
        HttpBackend::new(url, Duration::from_secs(5), Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_rejects_unparseable_base_url() {
        assert!(HttpBackend::new("not a url", Duration::from_secs(1), Duration::from_secs(1))
            .is_err());
    }

    #[test]
    fn test_endpoint_joins_segments_under_base_path() {
        let client = backend("http://localhost:8765/automation/");
        let url = client.endpoint(&["api", "resume", "text", "my resume.pdf"]);
        assert_eq!(
            url.as_str(),
            "http://localhost:8765/automation/api/resume/text/my%20resume.pdf"
        );
    }

    #[tokio::test]
    async fn test_login_status_reads_logged_in_flag() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/api/simple-apply/status/13800138000")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"logged_in": true, "phone": "13800138000", "message": "ok"}"#)
            .create_async()
            .await;

        let logged_in = backend(&server.url())
            .login_status("13800138000")
            .await
            .unwrap();
        assert!(logged_in);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_init_login_sends_phone_and_decodes_reply() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/api/simple-apply/init-login")
            .match_body(Matcher::Json(json!({"phone": "13800138000"})))
            .with_status(200)
            .with_body(r#"{"success": true, "message": "sent"}"#)
            .create_async()
            .await;

        let reply = backend(&server.url())
            .init_login("13800138000")
            .await
            .unwrap();
        assert_eq!(
            reply,
            LoginReply {
                success: true,
                message: "sent".to_string()
            }
        );
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_non_success_status_carries_backend_detail() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/api/simple-apply/verify-code")
            .with_status(401)
            .with_body(r#"{"detail": "code expired"}"#)
            .create_async()
            .await;

        let err = backend(&server.url())
            .verify_code("13800138000", "123456")
            .await
            .unwrap_err();
        match err {
            BackendError::Rejected { status, message } => {
                assert_eq!(status, 401);
                assert_eq!(message, "code expired");
            }
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_non_success_without_message_is_protocol_error() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/api/simple-apply/init-login")
            .with_status(502)
            .with_body("<html>Bad Gateway</html>")
            .create_async()
            .await;

        let err = backend(&server.url())
            .init_login("13800138000")
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::Protocol(_)));
    }

    #[tokio::test]
    async fn test_missing_required_field_is_protocol_error() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/api/simple-apply/init-login")
            .with_status(200)
            .with_body(r#"{"success": true}"#)
            .create_async()
            .await;

        let err = backend(&server.url())
            .init_login("13800138000")
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::Protocol(_)));
    }

    #[tokio::test]
    async fn test_resume_list_keeps_listing_order() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/api/resume/list")
            .with_status(200)
            .with_body(
                r#"{"resumes": [{"filename": "b.pdf", "size": 10}, {"filename": "a.pdf"}]}"#,
            )
            .create_async()
            .await;

        let resumes = backend(&server.url()).list_resumes().await.unwrap();
        let names: Vec<&str> = resumes.iter().map(|r| r.filename.as_str()).collect();
        assert_eq!(names, vec!["b.pdf", "a.pdf"]);
    }

    #[tokio::test]
    async fn test_resume_text_missing_is_none() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/api/resume/text/r1.pdf")
            .with_status(200)
            .with_body(r#"{"filename": "r1.pdf"}"#)
            .create_async()
            .await;

        let text = backend(&server.url()).resume_text("r1.pdf").await.unwrap();
        assert_eq!(text, None);
    }

    #[tokio::test]
    async fn test_bulk_apply_posts_snake_case_payload() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/api/simple-apply/apply")
            .match_body(Matcher::Json(json!({
                "phone": "13800138000",
                "resume_text": "John Doe resume...",
                "job_keyword": "rust",
                "city": "Beijing",
                "count": 3
            })))
            .with_status(200)
            .with_body(
                r#"{"success": true, "message": "done", "total": 1, "success_count": 1,
                    "failed_count": 0,
                    "details": [{"job_title": "Engineer", "company": "Acme", "success": true}]}"#,
            )
            .create_async()
            .await;

        let request = ApplyRequest {
            phone: "13800138000".to_string(),
            resume_text: "John Doe resume...".to_string(),
            job_keyword: "rust".to_string(),
            city: "Beijing".to_string(),
            requested_count: 3,
        };
        let reply = backend(&server.url()).bulk_apply(&request).await.unwrap();
        assert!(reply.success);
        assert_eq!(reply.success_count, Some(1));
        assert_eq!(reply.details.unwrap()[0].company, "Acme");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_connection_refused_is_unreachable() {
        // Port 9 (discard) is closed on test hosts.
        let err = backend("http://127.0.0.1:9")
            .login_status("13800138000")
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::Unreachable(_)));
    }

    #[tokio::test]
    async fn test_silent_backend_times_out_as_unreachable() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        // Accept and hold the connection without ever answering.
        let silent = tokio::spawn(async move {
            let (_socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(10)).await;
        });

        let client = HttpBackend::new(
            &format!("http://{addr}"),
            Duration::from_millis(100),
            Duration::from_millis(100),
        )
        .unwrap();
        let err = client.init_login("13800138000").await.unwrap_err();
        match err {
            BackendError::Unreachable(message) => assert!(message.contains("timed out")),
            other => panic!("expected timeout, got {other:?}"),
        }
        silent.abort();
    }
}
