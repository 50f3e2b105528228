//! Session workflow orchestrator.
//!
//! Drives one session through `AwaitingPhone -> AwaitingCode -> Authenticated`
//! and runs bulk-apply batches once authenticated. Every transition holds the
//! in-flight guard for its whole duration, so transitions never interleave;
//! a concurrent request fails with `AppError::AlreadyRunning`.
//! Failed transitions leave the session untouched.

pub mod guard;
pub mod handlers;
pub mod progress;
pub mod validation;

use std::num::NonZeroU32;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::backend_client::{ApplyDetail, AutomationBackend, BackendError, BulkApplyReply};
use crate::errors::AppError;
use crate::models::{ApplyBatchResult, ApplyOutcome, ApplyRequest, Session, Stage};
use crate::session_store::SessionStore;
use guard::{InFlight, InFlightGuard};
use progress::{Operation, ProgressEvent, ProgressReporter};
use validation::{validate_apply_params, validate_code, validate_phone};

#[derive(Debug, Clone, Default)]
pub struct WorkflowOptions {
    /// Rejected verification codes allowed per requested code. `None` = unlimited.
    pub max_code_attempts: Option<NonZeroU32>,
}

pub struct Orchestrator {
    backend: Arc<dyn AutomationBackend>,
    store: Arc<dyn SessionStore>,
    reporter: ProgressReporter,
    options: WorkflowOptions,
    session: RwLock<Session>,
    in_flight: InFlight,
    code_attempts: AtomicU32,
}

impl Orchestrator {
    pub fn new(
        backend: Arc<dyn AutomationBackend>,
        store: Arc<dyn SessionStore>,
        reporter: ProgressReporter,
        options: WorkflowOptions,
    ) -> Self {
        Self {
            backend,
            store,
            reporter,
            options,
            session: RwLock::new(Session::new()),
            in_flight: InFlight::default(),
            code_attempts: AtomicU32::new(0),
        }
    }

    pub async fn session(&self) -> Session {
        self.session.read().await.clone()
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.is_busy()
    }

    fn begin(&self, operation: Operation) -> Result<InFlightGuard<'_>, AppError> {
        self.in_flight.try_begin(operation, &self.reporter)
    }

    /// Replaces the session and reports the stage change, if any.
    async fn commit(&self, next: Session) -> Session {
        let mut session = self.session.write().await;
        let from = session.stage;
        *session = next.clone();
        drop(session);

        if from != next.stage {
            info!("Session stage {:?} -> {:?}", from, next.stage);
            self.reporter.record(ProgressEvent::StageChanged {
                from,
                to: next.stage,
            });
        }
        next
    }

    /// Records a failure in the progress snapshot. A rejected overlapping call
    /// is only logged: it says nothing about the operation that is running.
    fn report<T>(&self, operation: Operation, result: Result<T, AppError>) -> Result<T, AppError> {
        match &result {
            Err(AppError::AlreadyRunning) => {
                debug!("{:?} rejected: another operation is running", operation);
            }
            Err(e) => {
                warn!("{:?} failed: {e}", operation);
                self.reporter.record(ProgressEvent::OperationFailed {
                    operation,
                    code: e.code(),
                    message: e.message(),
                });
            }
            Ok(_) => {}
        }
        result
    }

    // ────────────────────────────────────────────────────────────────────────
    // Stage operations
    // ────────────────────────────────────────────────────────────────────────

    /// Restores the session from the store at startup.
    /// Never fails: any problem leaves the session in `AwaitingPhone`.
    pub async fn resume_session(&self) -> Session {
        let Ok(_guard) = self.begin(Operation::ResumeSession) else {
            debug!("Resume requested while another operation is running");
            return self.session().await;
        };

        let current = self.session().await;
        if current.stage != Stage::AwaitingPhone {
            return current;
        }

        let phone = match self.store.load().await {
            Ok(Some(phone)) => phone,
            Ok(None) => {
                debug!("No stored session to resume");
                return current;
            }
            Err(e) => {
                warn!("Could not read session store: {e:#}");
                return current;
            }
        };
        if validate_phone(&phone).is_err() {
            warn!("Ignoring malformed phone number in session store");
            return current;
        }

        match self.backend.login_status(&phone).await {
            Ok(true) => {
                info!("Stored session is still logged in");
                self.commit(Session {
                    phone: Some(phone),
                    stage: Stage::Authenticated,
                    authenticated_at: Some(Utc::now()),
                })
                .await
            }
            Ok(false) => {
                info!("Stored session is no longer logged in");
                self.commit(Session::with_phone(phone)).await
            }
            Err(e) => {
                warn!("Login status check failed, staying logged out: {e}");
                self.commit(Session::with_phone(phone)).await
            }
        }
    }

    /// Asks the backend to send a verification code to `phone`.
    /// From `AwaitingCode` with the same phone this re-sends the code.
    pub async fn start_login(&self, phone: &str) -> Result<Session, AppError> {
        let result = self.start_login_inner(phone).await;
        self.report(Operation::StartLogin, result)
    }

    async fn start_login_inner(&self, phone: &str) -> Result<Session, AppError> {
        validate_phone(phone)?;
        let _guard = self.begin(Operation::StartLogin)?;

        let current = self.session().await;
        match current.stage {
            Stage::Authenticated => {
                return Err(AppError::Precondition(
                    "Already logged in; log out before starting a new login".into(),
                ))
            }
            Stage::AwaitingCode if current.phone.as_deref() != Some(phone) => {
                return Err(AppError::Precondition(
                    "A code was already requested for another phone number; cancel that login first"
                        .into(),
                ))
            }
            _ => {}
        }

        let reply = self
            .backend
            .init_login(phone)
            .await
            .map_err(|e| backend_failure(e, AppError::LoginInit))?;
        if !reply.success {
            return Err(AppError::LoginInit(reply.message));
        }

        info!("Verification code requested");
        self.code_attempts.store(0, Ordering::Release);
        self.reporter.record(ProgressEvent::CodeSent {
            message: reply.message,
        });

        if current.stage == Stage::AwaitingCode {
            return Ok(current);
        }

        // Persistence only pre-fills the next start; a failed write does not fail the login.
        if let Err(e) = self.store.save(phone).await {
            warn!("Failed to persist session phone: {e:#}");
        }

        Ok(self
            .commit(Session {
                phone: Some(phone.to_string()),
                stage: Stage::AwaitingCode,
                authenticated_at: None,
            })
            .await)
    }

    /// Submits the out-of-band verification code.
    pub async fn submit_code(&self, code: &str) -> Result<Session, AppError> {
        let result = self.submit_code_inner(code).await;
        self.report(Operation::SubmitCode, result)
    }

    async fn submit_code_inner(&self, code: &str) -> Result<Session, AppError> {
        validate_code(code)?;
        let _guard = self.begin(Operation::SubmitCode)?;

        let current = self.session().await;
        if current.stage != Stage::AwaitingCode {
            return Err(AppError::Precondition(
                "No verification code has been requested".into(),
            ));
        }
        let phone = current
            .phone
            .clone()
            .ok_or_else(|| AppError::Precondition("Session has no phone number".into()))?;

        if let Some(max) = self.options.max_code_attempts {
            if self.code_attempts.load(Ordering::Acquire) >= max.get() {
                return Err(AppError::Precondition(format!(
                    "{max} verification attempts used; request a new code"
                )));
            }
        }

        let reply = match self.backend.verify_code(&phone, code).await {
            Ok(reply) if reply.success => reply,
            Ok(reply) => {
                self.code_attempts.fetch_add(1, Ordering::AcqRel);
                return Err(AppError::Verification(reply.message));
            }
            Err(e) => {
                if matches!(e, BackendError::Rejected { .. }) {
                    self.code_attempts.fetch_add(1, Ordering::AcqRel);
                }
                return Err(backend_failure(e, AppError::Verification));
            }
        };

        info!("Verification accepted: {}", reply.message);
        self.code_attempts.store(0, Ordering::Release);

        Ok(self
            .commit(Session {
                phone: Some(phone),
                stage: Stage::Authenticated,
                authenticated_at: Some(Utc::now()),
            })
            .await)
    }

    /// User-initiated restart of the login stage: `AwaitingCode -> AwaitingPhone`.
    pub async fn cancel_login(&self) -> Result<Session, AppError> {
        let result = self.cancel_login_inner().await;
        self.report(Operation::CancelLogin, result)
    }

    async fn cancel_login_inner(&self) -> Result<Session, AppError> {
        let _guard = self.begin(Operation::CancelLogin)?;

        let current = self.session().await;
        if current.stage != Stage::AwaitingCode {
            return Err(AppError::Precondition(
                "Only a pending verification can be cancelled".into(),
            ));
        }

        self.code_attempts.store(0, Ordering::Release);
        Ok(self
            .commit(Session {
                phone: current.phone,
                ..Session::new()
            })
            .await)
    }

    /// Ends the backend session and forgets the stored phone.
    pub async fn logout(&self) -> Result<Session, AppError> {
        let result = self.logout_inner().await;
        self.report(Operation::Logout, result)
    }

    async fn logout_inner(&self) -> Result<Session, AppError> {
        let _guard = self.begin(Operation::Logout)?;

        let current = self.session().await;
        let phone = match (current.stage, current.phone) {
            (Stage::AwaitingPhone, _) | (_, None) => {
                return Err(AppError::Precondition("Not logged in".into()))
            }
            (_, Some(phone)) => phone,
        };

        match self.backend.logout(&phone).await {
            Ok(reply) if reply.success => info!("Backend session closed"),
            Ok(reply) => debug!("Backend had no session to close: {}", reply.message),
            Err(BackendError::Rejected { message, .. }) => {
                warn!("Backend refused logout, dropping local session anyway: {message}")
            }
            Err(BackendError::Unreachable(msg)) => return Err(AppError::BackendUnreachable(msg)),
            Err(BackendError::Protocol(msg)) => return Err(AppError::Protocol(msg)),
        }

        if let Err(e) = self.store.clear().await {
            warn!("Failed to clear session store: {e:#}");
        }
        self.code_attempts.store(0, Ordering::Release);

        Ok(self.commit(Session::new()).await)
    }

    /// Runs one bulk-apply batch with the first listed resume.
    /// Returns either the complete batch result or an error, never a partial result.
    pub async fn run_bulk_apply(
        &self,
        job_keyword: &str,
        city: &str,
        requested_count: u32,
    ) -> Result<ApplyBatchResult, AppError> {
        let result = self
            .run_bulk_apply_inner(job_keyword, city, requested_count)
            .await;
        self.report(Operation::BulkApply, result)
    }

    async fn run_bulk_apply_inner(
        &self,
        job_keyword: &str,
        city: &str,
        requested_count: u32,
    ) -> Result<ApplyBatchResult, AppError> {
        validate_apply_params(job_keyword, city, requested_count)?;
        let _guard = self.begin(Operation::BulkApply)?;

        let session = self.session().await;
        let phone = match (session.stage, session.phone) {
            (Stage::Authenticated, Some(phone)) => phone,
            _ => {
                return Err(AppError::Precondition(
                    "Log in before running bulk apply".into(),
                ))
            }
        };

        let run_id = Uuid::new_v4();
        let resume_text = self.resolve_resume(run_id).await?;

        let request = ApplyRequest {
            phone,
            resume_text,
            job_keyword: job_keyword.trim().to_string(),
            city: city.trim().to_string(),
            requested_count,
        };

        info!(
            %run_id,
            "Bulk apply started: {} @ {} (up to {})",
            request.job_keyword, request.city, requested_count
        );
        self.reporter.record(ProgressEvent::BulkApplyStarted {
            run_id,
            job_keyword: request.job_keyword.clone(),
            city: request.city.clone(),
            requested_count,
        });

        let reply = self
            .backend
            .bulk_apply(&request)
            .await
            .map_err(|e| match e {
                BackendError::Protocol(msg) => AppError::Protocol(msg),
                BackendError::Unreachable(msg) | BackendError::Rejected { message: msg, .. } => {
                    AppError::BulkApply(msg)
                }
            })?;

        let result = batch_result_from_reply(reply, requested_count)?;
        info!(
            %run_id,
            "Bulk apply finished: {} succeeded, {} failed",
            result.success_count, result.failed_count
        );
        self.reporter.record(ProgressEvent::BulkApplyFinished {
            run_id,
            result: result.clone(),
        });

        Ok(result)
    }

    /// Picks the first listed resume and fetches its text.
    async fn resolve_resume(&self, run_id: Uuid) -> Result<String, AppError> {
        let resumes = self
            .backend
            .list_resumes()
            .await
            .map_err(|e| backend_failure(e, AppError::ResumeResolution))?;

        let selected = resumes
            .into_iter()
            .next()
            .ok_or_else(|| AppError::NoResume("Upload a resume before applying".into()))?;
        debug!(%run_id, "Selected resume {}", selected.filename);
        self.reporter.record(ProgressEvent::ResumeSelected {
            run_id,
            filename: selected.filename.clone(),
        });

        let text = self
            .backend
            .resume_text(&selected.filename)
            .await
            .map_err(|e| match e {
                BackendError::Protocol(msg) => AppError::Protocol(msg),
                BackendError::Unreachable(msg) | BackendError::Rejected { message: msg, .. } => {
                    AppError::ResumeResolution(msg)
                }
            })?;

        text.filter(|t| !t.trim().is_empty()).ok_or_else(|| {
            AppError::ResumeResolution(format!(
                "Resume '{}' has no extractable text",
                selected.filename
            ))
        })
    }
}

/// Maps a client failure onto the taxonomy; `business` wraps backend rejections.
fn backend_failure(err: BackendError, business: fn(String) -> AppError) -> AppError {
    match err {
        BackendError::Unreachable(msg) => AppError::BackendUnreachable(msg),
        BackendError::Protocol(msg) => AppError::Protocol(msg),
        BackendError::Rejected { message, .. } => business(message),
    }
}

impl From<ApplyDetail> for ApplyOutcome {
    fn from(detail: ApplyDetail) -> Self {
        let detail_message = detail.message.unwrap_or_else(|| {
            if detail.success {
                "Application sent".to_string()
            } else {
                "Application failed".to_string()
            }
        });
        Self {
            job_title: detail.job_title,
            company_name: detail.company,
            succeeded: detail.success,
            detail_message,
        }
    }
}

fn batch_result_from_reply(
    reply: BulkApplyReply,
    requested_count: u32,
) -> Result<ApplyBatchResult, AppError> {
    if !reply.success {
        return Err(AppError::BulkApply(
            reply
                .message
                .unwrap_or_else(|| "Backend reported a failed run".to_string()),
        ));
    }

    let missing = |field: &str| AppError::Protocol(format!("bulk-apply reply is missing '{field}'"));
    let success_count = reply.success_count.ok_or_else(|| missing("success_count"))?;
    let failed_count = reply.failed_count.ok_or_else(|| missing("failed_count"))?;
    let details = reply.details.ok_or_else(|| missing("details"))?;

    let outcomes = details.into_iter().map(ApplyOutcome::from).collect();
    ApplyBatchResult::from_parts(success_count, failed_count, outcomes, requested_count)
        .map_err(AppError::Protocol)
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use tokio::sync::Notify;

    use super::*;
    use crate::backend_client::{LoginReply, ResumeEntry};

    pub const PHONE: &str = "13800138000";

    /// Canned replies, one per backend operation.
    #[derive(Clone)]
    pub struct Script {
        pub login_status: Result<bool, BackendError>,
        pub init_login: Result<LoginReply, BackendError>,
        pub verify_code: Result<LoginReply, BackendError>,
        pub resumes: Result<Vec<ResumeEntry>, BackendError>,
        pub resume_text: Result<Option<String>, BackendError>,
        pub bulk_apply: Result<BulkApplyReply, BackendError>,
        pub logout: Result<LoginReply, BackendError>,
    }

    pub fn detail(title: &str, company: &str, success: bool) -> ApplyDetail {
        ApplyDetail {
            job_title: title.to_string(),
            company: company.to_string(),
            success,
            message: None,
        }
    }

    pub fn ok(message: &str) -> LoginReply {
        LoginReply {
            success: true,
            message: message.to_string(),
        }
    }

    pub fn failed(message: &str) -> LoginReply {
        LoginReply {
            success: false,
            message: message.to_string(),
        }
    }

    impl Default for Script {
        /// The happy path: code sent, code accepted, one resume, 2 of 3 applications sent.
        fn default() -> Self {
            Self {
                login_status: Ok(false),
                init_login: Ok(ok("sent")),
                verify_code: Ok(ok("ok")),
                resumes: Ok(vec![ResumeEntry {
                    filename: "r1.pdf".to_string(),
                }]),
                resume_text: Ok(Some("John Doe resume...".to_string())),
                bulk_apply: Ok(BulkApplyReply {
                    success: true,
                    message: Some("done".to_string()),
                    success_count: Some(2),
                    failed_count: Some(1),
                    details: Some(vec![
                        detail("Engineer", "Acme", true),
                        detail("Analyst", "Globex", true),
                        detail("Intern", "Initech", false),
                    ]),
                }),
                logout: Ok(ok("logged out")),
            }
        }
    }

    /// Holds bulk-apply open until released, to test overlapping calls.
    #[derive(Default)]
    pub struct Gate {
        pub entered: Notify,
        pub release: Notify,
    }

    #[derive(Default)]
    pub struct FakeBackend {
        pub script: Mutex<Script>,
        pub calls: Mutex<HashMap<&'static str, usize>>,
        pub last_apply: Mutex<Option<ApplyRequest>>,
        pub gate: Option<Arc<Gate>>,
    }

    impl FakeBackend {
        pub fn with_script(script: Script) -> Self {
            Self {
                script: Mutex::new(script),
                ..Self::default()
            }
        }

        pub fn calls(&self, op: &str) -> usize {
            self.calls.lock().unwrap().get(op).copied().unwrap_or(0)
        }

        pub fn total_calls(&self) -> usize {
            self.calls.lock().unwrap().values().sum()
        }

        fn hit(&self, op: &'static str) -> Script {
            *self.calls.lock().unwrap().entry(op).or_default() += 1;
            self.script.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl AutomationBackend for FakeBackend {
        async fn login_status(&self, _phone: &str) -> Result<bool, BackendError> {
            self.hit("login_status").login_status
        }

        async fn init_login(&self, _phone: &str) -> Result<LoginReply, BackendError> {
            self.hit("init_login").init_login
        }

        async fn verify_code(&self, _phone: &str, _code: &str) -> Result<LoginReply, BackendError> {
            self.hit("verify_code").verify_code
        }

        async fn list_resumes(&self) -> Result<Vec<ResumeEntry>, BackendError> {
            self.hit("list_resumes").resumes
        }

        async fn resume_text(&self, _filename: &str) -> Result<Option<String>, BackendError> {
            self.hit("resume_text").resume_text
        }

        async fn bulk_apply(&self, request: &ApplyRequest) -> Result<BulkApplyReply, BackendError> {
            let script = self.hit("bulk_apply");
            *self.last_apply.lock().unwrap() = Some(request.clone());
            if let Some(gate) = &self.gate {
                gate.entered.notify_one();
                gate.release.notified().await;
            }
            script.bulk_apply
        }

        async fn logout(&self, _phone: &str) -> Result<LoginReply, BackendError> {
            self.hit("logout").logout
        }
    }

    #[derive(Default)]
    pub struct MemoryStore {
        pub phone: Mutex<Option<String>>,
        pub saves: Mutex<usize>,
        pub broken: bool,
    }

    impl MemoryStore {
        pub fn with_phone(phone: &str) -> Self {
            Self {
                phone: Mutex::new(Some(phone.to_string())),
                ..Self::default()
            }
        }

        pub fn saves(&self) -> usize {
            *self.saves.lock().unwrap()
        }
    }

    #[async_trait]
    impl SessionStore for MemoryStore {
        async fn load(&self) -> Result<Option<String>> {
            if self.broken {
                return Err(anyhow!("disk on fire"));
            }
            Ok(self.phone.lock().unwrap().clone())
        }

        async fn save(&self, phone: &str) -> Result<()> {
            if self.broken {
                return Err(anyhow!("disk on fire"));
            }
            *self.saves.lock().unwrap() += 1;
            *self.phone.lock().unwrap() = Some(phone.to_string());
            Ok(())
        }

        async fn clear(&self) -> Result<()> {
            *self.phone.lock().unwrap() = None;
            Ok(())
        }
    }

    pub fn orchestrator(
        backend: Arc<FakeBackend>,
        store: Arc<MemoryStore>,
        options: WorkflowOptions,
    ) -> Orchestrator {
        Orchestrator::new(backend, store, ProgressReporter::new(64), options)
    }

    /// Orchestrator already in `Authenticated`.
    pub async fn authenticated(backend: Arc<FakeBackend>) -> Orchestrator {
        let orch = orchestrator(
            backend,
            Arc::new(MemoryStore::default()),
            WorkflowOptions::default(),
        );
        orch.start_login(PHONE).await.unwrap();
        orch.submit_code("123456").await.unwrap();
        orch
    }
}
