//! Presentation boundary.
//!
//! Rendering lives outside this crate; the core only reports what the user
//! should see through [`UiSink`].

use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NoticeLevel {
    Info,
    Success,
    Error,
}

/// One transient, user-facing notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Info,
            message: message.into(),
        }
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Success,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Page {
    Home,
    Login,
    Register,
    Verification,
    ForgotPassword,
    ForgotPasswordVerify,
    ForgotPasswordReset,
    Dashboard,
    Profile,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Form {
    Login,
    Register,
    Verification,
    ForgotPassword,
    ForgotPasswordVerify,
    ForgotPasswordReset,
    TransferBetweenAccounts,
    ExternalTransfer,
    ProfileUpdate,
    ClientRecord,
    PasswordChange,
    DeleteAccount,
    CardAction,
    AccountAction,
}

pub trait UiSink: Send + Sync {
    fn show_loader(&self) {}
    fn hide_loader(&self) {}
    fn notify(&self, notice: Notice);
    fn navigate(&self, _page: Page) {}
    /// Disables (`true`) or re-enables (`false`) the submit control of `form`.
    fn form_busy(&self, _form: Form, _busy: bool) {}
}

/// Logs every UI effect. Used by headless front ends.
#[derive(Debug, Default)]
pub struct TracingUi;

impl UiSink for TracingUi {
    fn show_loader(&self) {
        debug!("loader shown");
    }

    fn hide_loader(&self) {
        debug!("loader hidden");
    }

    fn notify(&self, notice: Notice) {
        match notice.level {
            NoticeLevel::Error => warn!(message = %notice.message, "notice"),
            _ => info!(level = ?notice.level, message = %notice.message, "notice"),
        }
    }

    fn navigate(&self, page: Page) {
        info!(?page, "navigate");
    }

    fn form_busy(&self, form: Form, busy: bool) {
        debug!(?form, busy, "form state");
    }
}
