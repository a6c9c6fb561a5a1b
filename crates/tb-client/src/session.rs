//! Authenticated identity, customer profile and transient verification-flow state.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tb_api_types::{ClientRecord, StructuredAddress, UserRecord};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserIdentity {
    pub user_id: Option<String>,
    pub name: Option<String>,
    pub surname: Option<String>,
    pub email: Option<String>,
    pub tel: Option<String>,
    pub tc: Option<String>,
}

impl UserIdentity {
    pub fn with_id(user_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            ..Self::default()
        }
    }

    pub fn display_name(&self) -> String {
        let full = format!(
            "{} {}",
            self.name.as_deref().unwrap_or_default(),
            self.surname.as_deref().unwrap_or_default()
        );
        full.trim().to_uppercase()
    }
}

impl From<UserRecord> for UserIdentity {
    fn from(record: UserRecord) -> Self {
        Self {
            user_id: record.user_id,
            name: record.name,
            surname: record.surname,
            email: record.email,
            tel: record.tel,
            tc: record.tc,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CustomerProfile {
    pub client_id: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub tc_number: Option<String>,
    pub address: Option<StructuredAddress>,
}

impl From<ClientRecord> for CustomerProfile {
    fn from(record: ClientRecord) -> Self {
        Self {
            client_id: record.id,
            first_name: record.first_name,
            last_name: record.last_name,
            email: record.email,
            phone: record.gsm,
            tc_number: record.tc_no,
            address: record.address.map(|address| address.to_structured()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlowKind {
    Login,
    Register,
    PasswordReset,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingFlow {
    pub session_id: String,
    pub kind: FlowKind,
}

#[derive(Debug, Default)]
struct SessionState {
    user: Option<UserIdentity>,
    profile: Option<CustomerProfile>,
    pending: Option<PendingFlow>,
    verification_code: Option<String>,
}

#[derive(Debug, Default)]
pub struct SessionStore {
    state: RwLock<SessionState>,
    epoch: AtomicU64,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, SessionState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, SessionState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Bumped on every sign-out; caches tag their contents with it.
    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    pub fn user(&self) -> Option<UserIdentity> {
        self.read().user.clone()
    }

    pub fn user_id(&self) -> Option<String> {
        self.read().user.as_ref().and_then(|user| user.user_id.clone())
    }

    pub fn set_user(&self, user: UserIdentity) {
        self.write().user = Some(user);
    }

    pub fn is_signed_in(&self) -> bool {
        self.user_id().is_some()
    }

    pub fn profile(&self) -> Option<CustomerProfile> {
        self.read().profile.clone()
    }

    pub fn client_id(&self) -> Option<String> {
        self.read()
            .profile
            .as_ref()
            .and_then(|profile| profile.client_id.clone())
            .filter(|id| !id.trim().is_empty())
    }

    pub fn set_profile(&self, profile: CustomerProfile) {
        self.write().profile = Some(profile);
    }

    pub fn begin_flow(&self, session_id: impl Into<String>, kind: FlowKind) {
        let mut state = self.write();
        state.pending = Some(PendingFlow {
            session_id: session_id.into(),
            kind,
        });
        state.verification_code = None;
    }

    pub fn pending_flow(&self) -> Option<PendingFlow> {
        self.read().pending.clone()
    }

    pub fn set_verification_code(&self, code: impl Into<String>) {
        self.write().verification_code = Some(code.into());
    }

    pub fn verification_code(&self) -> Option<String> {
        self.read().verification_code.clone()
    }

    pub fn clear_flow(&self) {
        let mut state = self.write();
        state.pending = None;
        state.verification_code = None;
    }

    /// Drops identity, profile and any pending flow.
    pub fn clear(&self) {
        *self.write() = SessionState::default();
        self.epoch.fetch_add(1, Ordering::SeqCst);
    }
}
