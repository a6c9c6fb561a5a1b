//! Session and state-sync core of the TrioBank client.
//!
//! Everything is reached through [`AppContext`]. Front ends supply a
//! [`Transport`], a [`LocalStore`](tb_storage::LocalStore) and a [`UiSink`].

pub mod account_ops;
pub mod accounts;
pub mod api;
pub mod cards;
pub mod config;
pub mod context;
pub mod error;
pub mod forms;
pub mod gate;
pub mod profile;
pub mod session;
pub mod theme;
pub mod token;
pub mod transfer;
pub mod transport;
pub mod ui;
pub mod validation;
pub mod verification;

#[cfg(test)]
mod testkit;

pub use account_ops::{AccountService, EntryType, StatementQuery, TransactionQuery};
pub use accounts::{Account, AccountsCache};
pub use api::ApiClient;
pub use cards::{BlockReason, CardFilter, CardQuery, CardService};
pub use config::ClientConfig;
pub use context::AppContext;
pub use error::{ApiError, ErrorKind, Payload};
pub use profile::{ClientForm, DeleteAccountForm, ProfileService};
pub use session::{CustomerProfile, SessionStore, UserIdentity};
pub use theme::{Theme, ThemePreference};
pub use token::TokenManager;
pub use transfer::{ExternalRecipient, TransferOrchestrator, TransferReceipt};
pub use transport::{Method, ReqwestTransport, Transport};
pub use ui::{Form, Notice, NoticeLevel, Page, TracingUi, UiSink};
pub use verification::{FlowState, RegistrationForm, VerificationFlow};
