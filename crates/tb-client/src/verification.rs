//! OTP-gated sign-in, registration and password reset.
//!
//! `Idle -> AwaitingCode(kind) -> Verified(kind) | Expired(kind)`. Entering
//! `AwaitingCode` arms the single countdown; arming a new one cancels the old.
//! Once a flow expires its session id is refused locally.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tb_api_types::{
    CodeVerifyResponse, LoginRequest, OtpConfirmRequest, PasswordResetInitiateRequest, PasswordResetRequest,
    RegisterRequest, extract_access_token, extract_session_id,
};
use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::api::ApiClient;
use crate::config::ClientConfig;
use crate::error::{ApiError, Payload};
use crate::forms::FormGuards;
use crate::profile::ProfileService;
use crate::session::{FlowKind, SessionStore};
use crate::token::TokenManager;
use crate::transport::Method;
use crate::ui::{Form, Notice, Page, UiSink};
use crate::validation::{
    ValidationError, validate_email, validate_otp, validate_password, validate_person_name, validate_phone,
    validate_tc,
};

pub const EXPIRED_MESSAGE: &str = "Time expired.";
const TOO_MANY_ATTEMPTS: &str = "Too many attempts. Please try again in a few minutes.";
const SESSION_MISSING: &str = "Session information missing. Please start again.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowState {
    Idle,
    AwaitingCode(FlowKind),
    Verified(FlowKind),
    Expired(FlowKind),
}

#[derive(Debug, Clone, Default)]
pub struct RegistrationForm {
    pub name: String,
    pub surname: String,
    pub email: String,
    pub password: String,
    pub phone: String,
    pub tc: String,
}

impl RegistrationForm {
    fn validate(&self) -> Result<RegisterRequest, ValidationError> {
        Ok(RegisterRequest {
            name: validate_person_name("name", "Name", &self.name)?,
            surname: validate_person_name("surname", "Surname", &self.surname)?,
            tc: validate_tc(&self.tc)?,
            password: {
                validate_password("password", &self.password, 8)?;
                self.password.clone()
            },
            email: validate_email(&self.email)?,
            tel: validate_phone(&self.phone)?,
        })
    }
}

struct Countdown {
    state: FlowState,
    deadline: Option<Instant>,
    timer: Option<JoinHandle<()>>,
    generation: u64,
}

pub struct VerificationFlow {
    api: Arc<ApiClient>,
    tokens: Arc<TokenManager>,
    session: Arc<SessionStore>,
    profile: Arc<ProfileService>,
    forms: Arc<FormGuards>,
    ui: Arc<dyn UiSink>,
    config: Arc<ClientConfig>,
    countdown: Mutex<Countdown>,
}

impl VerificationFlow {
    pub fn new(
        api: Arc<ApiClient>,
        tokens: Arc<TokenManager>,
        session: Arc<SessionStore>,
        profile: Arc<ProfileService>,
        forms: Arc<FormGuards>,
        ui: Arc<dyn UiSink>,
        config: Arc<ClientConfig>,
    ) -> Self {
        Self {
            api,
            tokens,
            session,
            profile,
            forms,
            ui,
            config,
            countdown: Mutex::new(Countdown {
                state: FlowState::Idle,
                deadline: None,
                timer: None,
                generation: 0,
            }),
        }
    }

    fn countdown(&self) -> MutexGuard<'_, Countdown> {
        self.countdown.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> FlowState {
        self.countdown().state
    }

    /// Time left on the running countdown, if any.
    pub fn remaining(&self) -> Option<Duration> {
        self.countdown()
            .deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    pub async fn login(self: &Arc<Self>, tc: &str, password: &str) -> Result<(), ApiError> {
        let _guard = self.forms.begin(Form::Login)?;
        if tc.trim().is_empty() || password.is_empty() {
            return Err(self.reject("Missing or invalid information. Please fill in all fields."));
        }

        let request = LoginRequest {
            tc: tc.trim().to_owned(),
            password: password.to_owned(),
        };
        match self.api.call_with("/auth/login", Method::Post, &request, false).await {
            Ok(payload) => self.enter_flow(payload, FlowKind::Login, Page::Verification),
            Err(err) => {
                warn!("login rejected: {err}");
                self.ui.notify(Notice::error(login_failure(&err)));
                Err(err)
            }
        }
    }

    pub async fn register(self: &Arc<Self>, form: &RegistrationForm) -> Result<(), ApiError> {
        let _guard = self.forms.begin(Form::Register)?;
        let request = match form.validate() {
            Ok(request) => request,
            Err(err) => return Err(self.reject(err.message)),
        };

        match self.api.call_with("/auth/register", Method::Post, &request, false).await {
            Ok(payload) => self.enter_flow(payload, FlowKind::Register, Page::Verification),
            Err(err) => {
                warn!("registration rejected: {err}");
                self.ui.notify(Notice::error(register_failure(&err)));
                Err(err)
            }
        }
    }

    pub async fn initiate_password_reset(self: &Arc<Self>, tc: &str, email: &str) -> Result<(), ApiError> {
        let _guard = self.forms.begin(Form::ForgotPassword)?;
        let request = match (validate_tc(tc), validate_email(email)) {
            (Ok(tc), Ok(email)) => PasswordResetInitiateRequest { tc, email },
            (Err(err), _) | (_, Err(err)) => return Err(self.reject(err.message)),
        };

        match self
            .api
            .call_with("/auth/forgot-password/initiate", Method::Post, &request, false)
            .await
        {
            Ok(payload) => self.enter_flow(payload, FlowKind::PasswordReset, Page::ForgotPasswordVerify),
            Err(err) => {
                warn!("password reset initiation rejected: {err}");
                self.ui.notify(Notice::error(reset_initiate_failure(&err)));
                Err(err)
            }
        }
    }

    fn enter_flow(self: &Arc<Self>, payload: Payload, kind: FlowKind, page: Page) -> Result<(), ApiError> {
        let Some(session_id) = payload.as_json().and_then(extract_session_id) else {
            warn!(?kind, "response carried no session id");
            self.ui
                .notify(Notice::error("The operation could not be started. Please try again."));
            return Err(ApiError::Decode("missing session id".to_owned()));
        };
        info!(?kind, "verification code requested");
        self.session.begin_flow(session_id.clone(), kind);
        self.start_countdown(kind, session_id);
        self.ui.navigate(page);
        Ok(())
    }

    /// Confirms the OTP for the pending flow.
    pub async fn submit_code(self: &Arc<Self>, code: &str) -> Result<(), ApiError> {
        let form = match self.session.pending_flow().map(|flow| flow.kind) {
            Some(FlowKind::PasswordReset) => Form::ForgotPasswordVerify,
            _ => Form::Verification,
        };
        let _guard = self.forms.begin(form)?;

        let Some(flow) = self.session.pending_flow() else {
            return Err(self.refuse_missing_flow());
        };
        let code = match validate_otp(code) {
            Ok(code) => code,
            Err(err) => return Err(self.reject(err.message)),
        };
        let request = OtpConfirmRequest {
            session_id: flow.session_id.clone(),
            code: code.clone(),
        };

        match flow.kind {
            FlowKind::Login | FlowKind::Register => {
                let endpoint = if flow.kind == FlowKind::Register {
                    "/auth/register/confirm"
                } else {
                    "/auth/login/confirm"
                };
                let payload = match self.api.call_with(endpoint, Method::Post, &request, false).await {
                    Ok(payload) => payload,
                    Err(err) => {
                        self.ui.notify(Notice::error(code_failure(&err)));
                        return Err(err);
                    }
                };
                let Some(token) = payload.as_json().and_then(extract_access_token) else {
                    self.ui
                        .notify(Notice::error("Code could not be verified. Please try again."));
                    return Err(ApiError::Decode("missing access token".to_owned()));
                };

                self.tokens.set_token(&token);
                self.finish_countdown(FlowState::Verified(flow.kind));
                self.session.clear_flow();
                self.ui.notify(Notice::success("Login successful!"));
                if let Err(err) = self.profile.load_user_profile().await {
                    warn!("profile load after sign-in failed: {err}");
                }
                self.ui.navigate(Page::Dashboard);
                Ok(())
            }
            FlowKind::PasswordReset => {
                let verified = match self
                    .api
                    .call_with("/auth/forgot-password/verify-code", Method::Post, &request, false)
                    .await
                {
                    Ok(payload) => payload.decode::<CodeVerifyResponse>().map(|response| response.verified),
                    Err(err) => Err(err),
                };
                match verified {
                    Ok(true) => {
                        // The reset call needs both the session id and the code.
                        self.session.set_verification_code(code);
                        self.finish_countdown(FlowState::Verified(FlowKind::PasswordReset));
                        self.ui.navigate(Page::ForgotPasswordReset);
                        Ok(())
                    }
                    Ok(false) => {
                        self.ui
                            .notify(Notice::error("Code could not be verified. Please try again."));
                        Err(ApiError::Validation("code not verified".to_owned()))
                    }
                    Err(err) => {
                        self.ui.notify(Notice::error(code_failure(&err)));
                        Err(err)
                    }
                }
            }
        }
    }

    pub async fn reset_password(&self, new_password: &str, confirmation: &str) -> Result<(), ApiError> {
        let _guard = self.forms.begin(Form::ForgotPasswordReset)?;
        let flow = match self.session.pending_flow() {
            Some(flow) if flow.kind == FlowKind::PasswordReset => flow,
            _ => return Err(self.refuse_missing_flow()),
        };
        let Some(code) = self.session.verification_code() else {
            self.ui
                .notify(Notice::error("Code information missing. Please start again."));
            self.ui.navigate(Page::ForgotPassword);
            return Err(ApiError::Validation("verification code missing".to_owned()));
        };
        if let Err(err) = validate_password("newPassword", new_password, 8) {
            return Err(self.reject(err.message));
        }
        if new_password != confirmation {
            return Err(self.reject("Passwords do not match."));
        }

        let request = PasswordResetRequest {
            session_id: flow.session_id,
            code,
            new_password: new_password.to_owned(),
        };
        match self
            .api
            .call_with("/auth/forgot-password/reset", Method::Post, &request, false)
            .await
        {
            Ok(_) => {
                info!("password reset completed");
                self.session.clear_flow();
                self.finish_countdown(FlowState::Idle);
                self.ui.notify(Notice::success(
                    "Your password has been reset. Please sign in with your new password.",
                ));
                self.ui.navigate(Page::Login);
                Ok(())
            }
            Err(err) => {
                self.ui.notify(Notice::error(reset_failure(&err)));
                Err(err)
            }
        }
    }

    /// Abandons the pending flow and stops its countdown.
    pub fn cancel(&self) {
        self.finish_countdown(FlowState::Idle);
        self.session.clear_flow();
    }

    fn start_countdown(self: &Arc<Self>, kind: FlowKind, session_id: String) {
        let window = self.config.verification_window;
        let mut countdown = self.countdown();
        countdown.generation += 1;
        let generation = countdown.generation;
        if let Some(previous) = countdown.timer.take() {
            previous.abort();
        }
        countdown.state = FlowState::AwaitingCode(kind);
        countdown.deadline = Some(Instant::now() + window);

        let flow: Weak<Self> = Arc::downgrade(self);
        countdown.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(window).await;
            if let Some(flow) = flow.upgrade() {
                flow.expire(generation, kind, &session_id);
            }
        }));
    }

    fn finish_countdown(&self, state: FlowState) {
        let mut countdown = self.countdown();
        countdown.generation += 1;
        if let Some(timer) = countdown.timer.take() {
            timer.abort();
        }
        countdown.deadline = None;
        countdown.state = state;
    }

    fn expire(&self, generation: u64, kind: FlowKind, session_id: &str) {
        {
            let mut countdown = self.countdown();
            if countdown.generation != generation {
                debug!("stale countdown fired, ignoring");
                return;
            }
            countdown.state = FlowState::Expired(kind);
            countdown.deadline = None;
            countdown.timer = None;
        }
        if self
            .session
            .pending_flow()
            .is_some_and(|flow| flow.session_id == session_id)
        {
            self.session.clear_flow();
        }
        info!(?kind, "verification window elapsed");
        self.ui.notify(Notice::error(EXPIRED_MESSAGE));
        self.ui.navigate(origin_page(kind));
    }

    fn refuse_missing_flow(&self) -> ApiError {
        let (message, page) = match self.state() {
            FlowState::Expired(kind) => ("Verification time expired. Please start again.", origin_page(kind)),
            _ => (SESSION_MISSING, Page::Login),
        };
        self.ui.notify(Notice::error(message));
        self.ui.navigate(page);
        ApiError::Validation(message.to_owned())
    }

    fn reject(&self, message: impl Into<String>) -> ApiError {
        let message = message.into();
        self.ui.notify(Notice::error(message.clone()));
        ApiError::Validation(message)
    }
}

fn origin_page(kind: FlowKind) -> Page {
    match kind {
        FlowKind::Login => Page::Login,
        FlowKind::Register => Page::Register,
        FlowKind::PasswordReset => Page::ForgotPassword,
    }
}

fn login_failure(err: &ApiError) -> &'static str {
    let text = err.server_text();
    match err.status() {
        Some(401) => "Incorrect ID number or password. Please check your details.",
        Some(404) => "User not found. Please register.",
        Some(400) => "Missing or invalid information. Please fill in all fields.",
        Some(429) => TOO_MANY_ATTEMPTS,
        _ if text.contains("user") || text.contains("not found") => "No user registered with this ID number.",
        _ if text.contains("password") || text.contains("invalid") => {
            "The password you entered is incorrect. Please try again."
        }
        _ => "Login failed. Please check your ID number and password.",
    }
}

fn register_failure(err: &ApiError) -> &'static str {
    let text = err.server_text();
    match err.status() {
        Some(409) => "A user with this ID number already exists. Please sign in.",
        _ if text.contains("already exist") => "A user with this ID number already exists. Please sign in.",
        Some(429) => TOO_MANY_ATTEMPTS,
        _ if text.contains("active process") => TOO_MANY_ATTEMPTS,
        Some(400) => "Missing or invalid information. Please check all fields.",
        _ if text.contains("bad request") => "Missing or invalid information. Please check all fields.",
        Some(500) => "A server error occurred. Please try again later.",
        _ => "Registration failed. Please check your details.",
    }
}

fn reset_initiate_failure(err: &ApiError) -> &'static str {
    let text = err.server_text();
    match err.status() {
        Some(401) => "ID number and email do not match. Please check them.",
        _ if text.contains("do not match") => "ID number and email do not match. Please check them.",
        Some(404) => "No user registered with this ID number.",
        _ if text.contains("not found") => "No user registered with this ID number.",
        Some(429) => TOO_MANY_ATTEMPTS,
        _ if text.contains("active process") => TOO_MANY_ATTEMPTS,
        Some(400) => "Missing or invalid information. Please fill in all fields.",
        _ => "The operation failed. Please try again later.",
    }
}

fn code_failure(err: &ApiError) -> &'static str {
    let text = err.server_text();
    match err.status() {
        Some(429) => TOO_MANY_ATTEMPTS,
        Some(400 | 401) => "The code is incorrect or has expired. Please try again.",
        _ if text.contains("not correct") || text.contains("not found") => {
            "The code is incorrect or has expired. Please try again."
        }
        _ => "Code could not be verified. Please try again.",
    }
}

fn reset_failure(err: &ApiError) -> &'static str {
    let text = err.server_text();
    match err.status() {
        Some(401) => "The code is invalid or has expired. Please start over.",
        _ if text.contains("not correct") || text.contains("not found") || text.contains("expired") => {
            "The code is invalid or has expired. Please start over."
        }
        Some(400) => "Password does not meet the requirements. Please enter at least 8 characters.",
        _ => "Password reset failed. Please try again.",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forms::BUSY_MESSAGE;
    use crate::testkit::{Harness, UiEvent};
    use serde_json::json;

    fn registration() -> RegistrationForm {
        RegistrationForm {
            name: "Ada".to_owned(),
            surname: "Yilmaz".to_owned(),
            email: "ada@example.com".to_owned(),
            password: "password1".to_owned(),
            phone: "555 111 22 33".to_owned(),
            tc: "12345678901".to_owned(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn login_then_code_signs_in() -> anyhow::Result<()> {
        let harness = Harness::new();
        let flow = &harness.ctx.verification;
        harness
            .transport
            .on(Method::Post, "/auth/login", 200, json!({"sessionId": "s-1"}));
        harness
            .transport
            .on(Method::Post, "/auth/login/confirm", 200, json!({"access_token": "t-9"}));
        harness
            .transport
            .on(Method::Get, "/auth/me", 200, json!({"user_id": "u-1", "name": "Ada"}));

        flow.login("12345678901", "pw").await?;
        assert_eq!(flow.state(), FlowState::AwaitingCode(FlowKind::Login));
        assert_eq!(flow.remaining(), Some(Duration::from_secs(180)));

        flow.submit_code("1234").await?;

        assert_eq!(flow.state(), FlowState::Verified(FlowKind::Login));
        assert_eq!(harness.ctx.tokens.token().as_deref(), Some("t-9"));
        assert_eq!(
            harness.transport.last_body(Method::Post, "/auth/login/confirm"),
            Some(json!({"session-id": "s-1", "code": "1234"}))
        );
        assert_eq!(harness.ctx.session.pending_flow(), None);
        assert_eq!(harness.ctx.session.user_id().as_deref(), Some("u-1"));
        assert_eq!(harness.ui.pages().last(), Some(&Page::Dashboard));
        assert_eq!(flow.remaining(), None);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn double_submit_sends_one_request() -> anyhow::Result<()> {
        let harness = Harness::with_delay(Duration::from_millis(200));
        let flow = &harness.ctx.verification;
        harness
            .transport
            .on(Method::Post, "/auth/login", 200, json!({"sessionId": "s-1"}));
        harness
            .transport
            .on(Method::Post, "/auth/login/confirm", 200, json!({"access_token": "t-9"}));
        harness
            .transport
            .on(Method::Get, "/auth/me", 200, json!({"user_id": "u-1"}));

        let (first, second) = tokio::join!(flow.login("12345678901", "pw"), flow.login("12345678901", "pw"));
        assert!(first.is_ok());
        assert!(matches!(second, Err(ApiError::Busy)));
        assert_eq!(harness.transport.count(Method::Post, "/auth/login"), 1);

        let (first, second) = tokio::join!(flow.submit_code("1234"), flow.submit_code("1234"));
        assert!(first.is_ok());
        assert!(matches!(second, Err(ApiError::Busy)));
        assert_eq!(harness.transport.count(Method::Post, "/auth/login/confirm"), 1);
        assert_eq!(flow.state(), FlowState::Verified(FlowKind::Login));
        let busy = Notice::info(BUSY_MESSAGE);
        assert_eq!(harness.ui.notices().iter().filter(|notice| **notice == busy).count(), 2);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn countdown_expiry_refuses_further_codes() -> anyhow::Result<()> {
        let harness = Harness::new();
        let flow = &harness.ctx.verification;
        harness
            .transport
            .on(Method::Post, "/auth/register", 200, json!({"session-id": "s-2"}));

        flow.register(&registration()).await?;
        tokio::time::sleep(Duration::from_secs(181)).await;

        assert_eq!(flow.state(), FlowState::Expired(FlowKind::Register));
        assert!(harness.ui.notices().contains(&Notice::error(EXPIRED_MESSAGE)));
        assert!(harness.ui.events().contains(&UiEvent::Navigate(Page::Register)));

        assert!(flow.submit_code("1234").await.is_err());
        assert_eq!(harness.transport.count(Method::Post, "/auth/register/confirm"), 0);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn new_flow_replaces_previous_countdown() -> anyhow::Result<()> {
        let harness = Harness::new();
        let flow = &harness.ctx.verification;
        harness
            .transport
            .on(Method::Post, "/auth/login", 200, json!({"session-id": "s-1"}));

        flow.login("12345678901", "pw").await?;
        tokio::time::sleep(Duration::from_secs(120)).await;
        flow.login("12345678901", "pw").await?;
        tokio::time::sleep(Duration::from_secs(120)).await;

        assert_eq!(flow.state(), FlowState::AwaitingCode(FlowKind::Login));
        assert!(harness.ui.notices().is_empty());

        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(harness.ui.notices(), vec![Notice::error(EXPIRED_MESSAGE)]);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn password_reset_keeps_session_and_code_until_reset() -> anyhow::Result<()> {
        let harness = Harness::new();
        let flow = &harness.ctx.verification;
        harness
            .transport
            .on(Method::Post, "/auth/forgot-password/initiate", 200, json!({"session_id": "r-1"}));
        harness
            .transport
            .on(Method::Post, "/auth/forgot-password/verify-code", 200, json!({"verified": true}));
        harness
            .transport
            .on(Method::Post, "/auth/forgot-password/reset", 200, json!({}));

        flow.initiate_password_reset("12345678901", "ada@example.com").await?;
        flow.submit_code("4321").await?;
        assert_eq!(harness.ctx.session.verification_code().as_deref(), Some("4321"));
        assert!(harness.ctx.session.pending_flow().is_some());

        flow.reset_password("newpassword", "newpassword").await?;

        assert_eq!(
            harness.transport.last_body(Method::Post, "/auth/forgot-password/reset"),
            Some(json!({"session-id": "r-1", "code": "4321", "new_password": "newpassword"}))
        );
        assert_eq!(harness.ctx.session.pending_flow(), None);
        assert_eq!(harness.ui.pages().last(), Some(&Page::Login));
        Ok(())
    }

    #[tokio::test]
    async fn reset_rejects_mismatched_confirmation_locally() -> anyhow::Result<()> {
        let harness = Harness::new();
        harness.ctx.session.begin_flow("r-1", FlowKind::PasswordReset);
        harness.ctx.session.set_verification_code("4321");

        let result = harness.ctx.verification.reset_password("newpassword", "different1").await;

        assert!(matches!(result, Err(ApiError::Validation(_))));
        assert!(harness.transport.requests().is_empty());
        assert_eq!(harness.ui.notices(), vec![Notice::error("Passwords do not match.")]);
        Ok(())
    }

    #[tokio::test]
    async fn login_failures_map_to_one_message() -> anyhow::Result<()> {
        let harness = Harness::new();
        harness
            .transport
            .on(Method::Post, "/auth/login", 401, json!({"message": "Bad credentials"}));

        assert!(harness.ctx.verification.login("12345678901", "wrong").await.is_err());

        assert_eq!(
            harness.ui.notices(),
            vec![Notice::error("Incorrect ID number or password. Please check your details.")]
        );
        assert_eq!(harness.ctx.verification.state(), FlowState::Idle);
        Ok(())
    }

    #[tokio::test]
    async fn registration_validates_before_calling() -> anyhow::Result<()> {
        let harness = Harness::new();
        let form = RegistrationForm {
            phone: "12".to_owned(),
            ..registration()
        };

        assert!(harness.ctx.verification.register(&form).await.is_err());
        assert!(harness.transport.requests().is_empty());
        assert_eq!(
            harness.ui.notices(),
            vec![Notice::error("Phone number must be 10 digits.")]
        );
        Ok(())
    }

    #[tokio::test]
    async fn duplicate_registration_is_reported() -> anyhow::Result<()> {
        let harness = Harness::new();
        harness
            .transport
            .on(Method::Post, "/auth/register", 409, json!({"message": "exists"}));

        let err = harness.ctx.verification.register(&registration()).await.unwrap_err();

        assert_eq!(err.status(), Some(409));
        assert_eq!(
            harness.ui.notices(),
            vec![Notice::error("A user with this ID number already exists. Please sign in.")]
        );
        Ok(())
    }
}
