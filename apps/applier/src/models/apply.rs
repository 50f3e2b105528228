use serde::{Deserialize, Serialize};

/// One bulk-apply submission. Transient, never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyRequest {
    pub phone: String,
    pub resume_text: String,
    pub job_keyword: String,
    pub city: String,
    pub requested_count: u32,
}

/// Outcome of a single attempted application, as reported by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyOutcome {
    pub job_title: String,
    pub company_name: String,
    pub succeeded: bool,
    pub detail_message: String,
}

/// Aggregate of one bulk-apply run.
/// `success_count + failed_count == outcomes.len()` holds for every value
/// built through [`ApplyBatchResult::from_parts`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyBatchResult {
    pub success_count: u32,
    pub failed_count: u32,
    /// Backend reporting order.
    pub outcomes: Vec<ApplyOutcome>,
}

impl ApplyBatchResult {
    /// Builds a batch result from backend-reported counts, rejecting counts
    /// that disagree with the outcome list or exceed the requested bound.
    pub fn from_parts(
        success_count: u32,
        failed_count: u32,
        outcomes: Vec<ApplyOutcome>,
        requested_count: u32,
    ) -> Result<Self, String> {
        let reported = u64::from(success_count) + u64::from(failed_count);
        if reported != outcomes.len() as u64 {
            return Err(format!(
                "bulk-apply reported {success_count} succeeded + {failed_count} failed \
                 but listed {} outcomes",
                outcomes.len()
            ));
        }
        if outcomes.len() as u64 > u64::from(requested_count) {
            return Err(format!(
                "bulk-apply returned {} outcomes for a request of {requested_count}",
                outcomes.len()
            ));
        }
        Ok(Self {
            success_count,
            failed_count,
            outcomes,
        })
    }
}
