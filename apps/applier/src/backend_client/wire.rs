//! Request and response records exchanged with the automation backend.
//! Field names follow the backend's snake_case JSON.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Serialize)]
pub(crate) struct PhoneBody<'a> {
    pub phone: &'a str,
}

#[derive(Debug, Serialize)]
pub(crate) struct VerifyCodeBody<'a> {
    pub phone: &'a str,
    pub code: &'a str,
}

#[derive(Debug, Serialize)]
pub(crate) struct BulkApplyBody<'a> {
    pub phone: &'a str,
    pub resume_text: &'a str,
    pub job_keyword: &'a str,
    pub city: &'a str,
    pub count: u32,
}

#[derive(Debug, Serialize)]
pub(crate) struct EmptyBody {}

#[derive(Debug, Deserialize)]
pub(crate) struct LoginStatusReply {
    pub logged_in: bool,
}

/// Reply shared by init-login, verify-code and logout.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoginReply {
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ResumeListReply {
    pub resumes: Vec<ResumeEntry>,
}

/// A stored resume as listed by the backend. Extra metadata is ignored.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ResumeEntry {
    pub filename: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ResumeTextReply {
    #[serde(default)]
    pub text: Option<String>,
}

/// Raw bulk-apply reply. A failed run omits the counts and details, so they
/// are optional here and enforced when the batch result is built.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BulkApplyReply {
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub success_count: Option<u32>,
    #[serde(default)]
    pub failed_count: Option<u32>,
    #[serde(default)]
    pub details: Option<Vec<ApplyDetail>>,
}

/// One attempted application. `job_title` and `company` must be top-level
/// fields; a detail that nests them under `job` is rejected as malformed
/// rather than filled in with placeholders.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ApplyDetail {
    pub job_title: String,
    pub company: String,
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
}

/// Error body of a non-2xx reply. `detail` is a string for business errors
/// and a list of field errors for request validation failures.
#[derive(Debug, Deserialize)]
pub(crate) struct ErrorReply {
    #[serde(default)]
    pub detail: Option<Value>,
    #[serde(default)]
    pub message: Option<String>,
}

impl ErrorReply {
    pub fn into_message(self) -> Option<String> {
        match self.detail {
            Some(Value::String(detail)) => Some(detail),
            Some(Value::Null) | None => self.message,
            Some(other) => Some(other.to_string()),
        }
    }
}
