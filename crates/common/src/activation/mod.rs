//! Device pairing
//!
//! Pairing runs in two phases over the relay. In the access-code phase the
//! primary (a device already in the account) publishes an ephemeral public
//! key and receives a short access code, which the user types into the
//! secondary (the joining device). The secondary exchanges its own public key
//! for the primary's in one call. In the link-code phase both devices hold a
//! shared channel key and display the same link code; once the user confirms
//! it on the primary, the primary sends the account key to the secondary.
//!
//! An [`Activator`] drives both roles. Session state lives in an
//! [`ActivationData`] which is persisted after every step, so a restarted
//! process picks up where it left off with [`Activator::resume`].

use std::fmt;

use crate::account::AccountError;
use crate::crypto::{AgreementError, CipherError, CryptoError, KeyCodecError};
use crate::relay::RelayError;
use crate::settings::SettingsError;
use crate::transport::TransportError;

mod activator;
mod code;
mod data;
mod primary;
mod secondary;

pub use activator::Activator;
pub use code::{format_code, normalize_code};
pub use data::ActivationData;

/// Every persisted session key starts with this
pub const ACTIVATION_PREFIX: &str = "activation";

/// Which side of the pairing this device plays
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Already registered, adding a peer
    Primary,
    /// Joining an existing account
    Secondary,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Primary => "primary",
            Role::Secondary => "secondary",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "primary" => Some(Role::Primary),
            "secondary" => Some(Role::Secondary),
            _ => None,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Protocol phase of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivationStep {
    AccessCode,
    LinkCode,
}

impl ActivationStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivationStep::AccessCode => "AccessCode",
            ActivationStep::LinkCode => "LinkCode",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "AccessCode" => Some(ActivationStep::AccessCode),
            "LinkCode" => Some(ActivationStep::LinkCode),
            _ => None,
        }
    }
}

/// Where a device stands in the pairing, as shown to the user
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairingState {
    Idle,
    // primary
    AccessCodeIssued,
    LinkCodeReady,
    // secondary
    AccessCodeEntered,
    LinkCodeDisplayed,
    AwaitingAuthorization,
    // terminal
    Completed,
    Cancelled,
}

impl fmt::Display for PairingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PairingState::Idle => "idle",
            PairingState::AccessCodeIssued => "access code issued",
            PairingState::LinkCodeReady => "link code ready",
            PairingState::AccessCodeEntered => "access code entered",
            PairingState::LinkCodeDisplayed => "link code displayed",
            PairingState::AwaitingAuthorization => "awaiting authorization",
            PairingState::Completed => "completed",
            PairingState::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// Outcome of asking the relay for the peer's key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkStatus {
    /// The peer has not exchanged yet
    Pending,
    Linked,
}

#[derive(Debug, thiserror::Error)]
pub enum ActivationError {
    // session state
    #[error("no pairing session in progress")]
    NoSession,
    #[error("a {0} pairing session is already in progress")]
    SessionInProgress(Role),
    #[error("operation requires a {expected} session, this one is {actual}")]
    WrongRole { expected: Role, actual: Role },
    #[error("pairing session was cancelled")]
    Cancelled,
    #[error("peer has not linked yet")]
    PeerNotLinked,
    #[error("pairing session has no shared key yet")]
    MissingSharedKey,
    #[error("pairing session has no peer hash yet")]
    MissingPeerHash,
    #[error("stored pairing session is unreadable: {0}")]
    Corrupt(String),

    // validation
    #[error("access code is empty")]
    EmptyAccessCode,
    #[error("access code is unknown or expired")]
    UnknownAccessCode,
    #[error("link code is empty")]
    EmptyLinkCode,
    #[error("link code does not match")]
    LinkCodeMismatch,

    // transient
    #[error("waiting for the other device to authorize")]
    AuthorizationPending,

    /// Cause is only available through `source()`
    #[error("a cryptographic operation failed, please try again")]
    Crypto(#[source] CryptoError),

    #[error("this device has no account to share")]
    NoAccount,
    #[error("account error: {0}")]
    Account(#[source] AccountError),
    #[error("relay error: {0}")]
    Relay(#[source] RelayError),
    #[error("settings error: {0}")]
    Settings(#[source] SettingsError),
}

impl From<CryptoError> for ActivationError {
    fn from(err: CryptoError) -> Self {
        ActivationError::Crypto(err)
    }
}

impl From<KeyCodecError> for ActivationError {
    fn from(err: KeyCodecError) -> Self {
        ActivationError::Crypto(err.into())
    }
}

impl From<CipherError> for ActivationError {
    fn from(err: CipherError) -> Self {
        ActivationError::Crypto(err.into())
    }
}

impl From<AgreementError> for ActivationError {
    fn from(err: AgreementError) -> Self {
        ActivationError::Crypto(err.into())
    }
}

impl From<RelayError> for ActivationError {
    fn from(err: RelayError) -> Self {
        ActivationError::Relay(err)
    }
}

impl From<SettingsError> for ActivationError {
    fn from(err: SettingsError) -> Self {
        ActivationError::Settings(err)
    }
}

impl From<AccountError> for ActivationError {
    fn from(err: AccountError) -> Self {
        match err {
            AccountError::Relay(err) => ActivationError::Relay(err),
            AccountError::Settings(err) => ActivationError::Settings(err),
            AccountError::Key(err) => err.into(),
            other => ActivationError::Account(other),
        }
    }
}

impl From<TransportError> for ActivationError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::NotYetAvailable => ActivationError::AuthorizationPending,
            TransportError::Relay(err) => ActivationError::Relay(err),
            TransportError::Cipher(err) => err.into(),
            TransportError::Key(err) => err.into(),
        }
    }
}

impl ActivationError {
    /// Whether retrying the same call later can succeed without user input
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ActivationError::AuthorizationPending | ActivationError::PeerNotLinked
        )
    }
}
