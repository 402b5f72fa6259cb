//! Certificate revocation checkers

use crate::error::{AuthnError, CertificateError};
use async_trait::async_trait;
use dashmap::DashSet;
use std::fmt::Debug;
use ticket::X509Certificate;
use tracing::debug;

/// Decides whether a certificate has been revoked
///
/// Implementations may do network I/O; the X.509 handler bounds each call
/// with its revocation timeout.
#[async_trait]
pub trait RevocationChecker: Send + Sync + Debug {
    async fn check(&self, certificate: &X509Certificate) -> Result<(), CertificateError>;
}

/// Accepts every certificate
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpRevocationChecker;

#[async_trait]
impl RevocationChecker for NoOpRevocationChecker {
    async fn check(&self, certificate: &X509Certificate) -> Result<(), CertificateError> {
        debug!("Skipping revocation check for {}", certificate.serial());
        Ok(())
    }
}

/// Rejects certificates listed by (issuer DN, serial)
#[derive(Debug, Default)]
pub struct SerialRevocationChecker {
    revoked: DashSet<(String, String)>,
}

impl SerialRevocationChecker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a revocation list
    ///
    /// Each entry is a hex serial, whitespace, then the issuer DN. Blank
    /// lines and `#` comments are skipped.
    pub fn from_list(content: &str) -> Result<Self, AuthnError> {
        let checker = Self::new();
        for (lineno, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let entry = line
                .split_once(char::is_whitespace)
                .map(|(serial, issuer)| (serial, issuer.trim()))
                .filter(|(serial, issuer)| {
                    !issuer.is_empty() && serial.chars().all(|c| c.is_ascii_hexdigit())
                });
            let Some((serial, issuer)) = entry else {
                return Err(AuthnError::InvalidConfiguration(format!(
                    "revocation list line {}: expected <serial> <issuer DN>",
                    lineno + 1
                )));
            };
            checker.revoke(issuer, serial);
        }
        Ok(checker)
    }

    /// Serials are compared as lowercase hex
    pub fn revoke(&self, issuer_dn: impl Into<String>, serial: impl AsRef<str>) {
        self.revoked
            .insert((issuer_dn.into(), serial.as_ref().to_lowercase()));
    }

    pub fn reinstate(&self, issuer_dn: &str, serial: &str) -> bool {
        self.revoked
            .remove(&(issuer_dn.to_string(), serial.to_lowercase()))
            .is_some()
    }

    pub fn is_revoked(&self, certificate: &X509Certificate) -> bool {
        self.revoked.contains(&(
            certificate.issuer_dn().to_string(),
            certificate.serial().to_string(),
        ))
    }

    pub fn len(&self) -> usize {
        self.revoked.len()
    }

    pub fn is_empty(&self) -> bool {
        self.revoked.is_empty()
    }
}

#[async_trait]
impl RevocationChecker for SerialRevocationChecker {
    async fn check(&self, certificate: &X509Certificate) -> Result<(), CertificateError> {
        if self.is_revoked(certificate) {
            return Err(CertificateError::Revoked {
                issuer: certificate.issuer_dn().to_string(),
                serial: certificate.serial().to_string(),
            });
        }
        Ok(())
    }
}
