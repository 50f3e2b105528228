pub mod apply;
pub mod session;

pub use apply::{ApplyBatchResult, ApplyOutcome, ApplyRequest};
pub use session::{Session, Stage};
