use std::sync::atomic::{AtomicBool, Ordering};

use crate::errors::AppError;
use crate::workflow::progress::{Operation, ProgressReporter};

/// The single exclusive-access flag around the session.
/// At most one transition holds it; everyone else fails fast.
#[derive(Debug, Default)]
pub(crate) struct InFlight {
    busy: AtomicBool,
}

impl InFlight {
    pub fn try_begin<'a>(
        &'a self,
        operation: Operation,
        reporter: &'a ProgressReporter,
    ) -> Result<InFlightGuard<'a>, AppError> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| AppError::AlreadyRunning)?;
        reporter.operation_started(operation);
        Ok(InFlightGuard {
            busy: &self.busy,
            reporter,
        })
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

/// Releases the flag on drop, including when the owning future is dropped.
pub(crate) struct InFlightGuard<'a> {
    busy: &'a AtomicBool,
    reporter: &'a ProgressReporter,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.reporter.operation_finished();
        self.busy.store(false, Ordering::Release);
    }
}
