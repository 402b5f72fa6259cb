//! Failure kinds and error types for authentication

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use ticket::HandlerResult;

/// Closed set of authentication failure kinds
///
/// [`FailureKind::name`] is the canonical short name used both as a flow
/// outcome and as the suffix of a message catalog key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FailureKind {
    AccountLocked,
    FailedLogin,
    CredentialExpired,
    AccountNotFound,
    AccountDisabled,
    InvalidLoginLocation,
    AccountPasswordMustChange,
    InvalidLoginTime,
    CertificateExpired,
    CertificateNotYetValid,
    RevokedCertificate,
    Prevented,
}

impl FailureKind {
    pub const ALL: [FailureKind; 12] = [
        FailureKind::AccountLocked,
        FailureKind::FailedLogin,
        FailureKind::CredentialExpired,
        FailureKind::AccountNotFound,
        FailureKind::AccountDisabled,
        FailureKind::InvalidLoginLocation,
        FailureKind::AccountPasswordMustChange,
        FailureKind::InvalidLoginTime,
        FailureKind::CertificateExpired,
        FailureKind::CertificateNotYetValid,
        FailureKind::RevokedCertificate,
        FailureKind::Prevented,
    ];

    /// Precedence used when none is configured
    pub const DEFAULT_PRECEDENCE: [FailureKind; 8] = [
        FailureKind::AccountLocked,
        FailureKind::FailedLogin,
        FailureKind::CredentialExpired,
        FailureKind::AccountNotFound,
        FailureKind::AccountDisabled,
        FailureKind::InvalidLoginLocation,
        FailureKind::AccountPasswordMustChange,
        FailureKind::InvalidLoginTime,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            FailureKind::AccountLocked => "AccountLockedException",
            FailureKind::FailedLogin => "FailedLoginException",
            FailureKind::CredentialExpired => "CredentialExpiredException",
            FailureKind::AccountNotFound => "AccountNotFoundException",
            FailureKind::AccountDisabled => "AccountDisabledException",
            FailureKind::InvalidLoginLocation => "InvalidLoginLocationException",
            FailureKind::AccountPasswordMustChange => "AccountPasswordMustChangeException",
            FailureKind::InvalidLoginTime => "InvalidLoginTimeException",
            FailureKind::CertificateExpired => "CertificateExpiredException",
            FailureKind::CertificateNotYetValid => "CertificateNotYetValidException",
            FailureKind::RevokedCertificate => "RevokedCertificateException",
            FailureKind::Prevented => "PreventedException",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for FailureKind {
    type Err = AuthnError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let s = s.trim();
        FailureKind::ALL
            .into_iter()
            .find(|kind| kind.name() == s)
            .ok_or_else(|| AuthnError::InvalidConfiguration(format!("unknown failure kind: {}", s)))
    }
}

/// Failure of one handler on one credential
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind}: {reason}")]
pub struct HandlerError {
    pub kind: FailureKind,
    pub reason: String,
}

impl HandlerError {
    pub fn new(kind: FailureKind, reason: impl Into<String>) -> Self {
        Self {
            kind,
            reason: reason.into(),
        }
    }

    pub fn failed_login(reason: impl Into<String>) -> Self {
        Self::new(FailureKind::FailedLogin, reason)
    }
}

/// Certificate chain validation failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CertificateError {
    #[error("Certificate {subject} expired")]
    Expired { subject: String },

    #[error("Certificate {subject} is not yet valid")]
    NotYetValid { subject: String },

    #[error("Certificate {serial} issued by {issuer} is revoked")]
    Revoked { issuer: String, serial: String },

    #[error("Revocation status unavailable: {0}")]
    RevocationUnavailable(String),

    #[error("Certificate subject does not match pattern {pattern}")]
    UntrustedSubject { subject: String, pattern: String },

    #[error("No certificate in the chain was issued by a trusted issuer")]
    UntrustedIssuer,

    #[error("Certificate keyUsage constraint forbids SSL client authentication.")]
    KeyUsageViolation,

    #[error("Unlimited certificate path length not allowed by configuration.")]
    UnlimitedPathNotAllowed,

    #[error("Certificate path length {path_len} exceeds maximum value {max}.")]
    PathLengthExceeded { path_len: u32, max: u32 },

    #[error("Expected exactly one end-entity certificate, found {0}")]
    EndEntityCount(usize),
}

impl CertificateError {
    pub fn kind(&self) -> FailureKind {
        match self {
            CertificateError::Expired { .. } => FailureKind::CertificateExpired,
            CertificateError::NotYetValid { .. } => FailureKind::CertificateNotYetValid,
            CertificateError::Revoked { .. } => FailureKind::RevokedCertificate,
            CertificateError::RevocationUnavailable(_) => FailureKind::Prevented,
            CertificateError::UntrustedSubject { .. }
            | CertificateError::UntrustedIssuer
            | CertificateError::KeyUsageViolation
            | CertificateError::UnlimitedPathNotAllowed
            | CertificateError::PathLengthExceeded { .. }
            | CertificateError::EndEntityCount(_) => FailureKind::FailedLogin,
        }
    }
}

impl From<CertificateError> for HandlerError {
    fn from(err: CertificateError) -> Self {
        HandlerError::new(err.kind(), err.to_string())
    }
}

/// Raised when the offered credentials do not satisfy the policy
///
/// Carries every handler failure by handler name, plus any successes that
/// were not enough on their own. An exception with no handler errors
/// (nothing offered, or no handler supported the credential) resolves to
/// the unknown outcome.
#[derive(Error, Debug, Clone, Default)]
#[error("{} handler(s) failed to authenticate", .handler_errors.len())]
pub struct AuthenticationException {
    handler_errors: BTreeMap<String, HandlerError>,
    successes: BTreeMap<String, HandlerResult>,
    credential_ids: Vec<String>,
}

impl AuthenticationException {
    pub fn new(
        handler_errors: BTreeMap<String, HandlerError>,
        successes: BTreeMap<String, HandlerResult>,
        credential_ids: Vec<String>,
    ) -> Self {
        Self {
            handler_errors,
            successes,
            credential_ids,
        }
    }

    pub fn handler_errors(&self) -> &BTreeMap<String, HandlerError> {
        &self.handler_errors
    }

    pub fn successes(&self) -> &BTreeMap<String, HandlerResult> {
        &self.successes
    }

    /// Ids of the credentials that were offered
    pub fn credential_ids(&self) -> &[String] {
        &self.credential_ids
    }

    pub fn contains_kind(&self, kind: FailureKind) -> bool {
        self.handler_errors.values().any(|e| e.kind == kind)
    }
}

/// Setup errors for handlers and the outcome mapper
#[derive(Error, Debug)]
pub enum AuthnError {
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error(transparent)]
    Config(#[from] ssoconfig::ConfigError),

    #[error("Invalid pattern: {0}")]
    Pattern(#[from] regex::Error),
}

pub type Result<T> = std::result::Result<T, AuthnError>;
