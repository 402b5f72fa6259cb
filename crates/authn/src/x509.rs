//! X.509 certificate chain authentication
//!
//! The chain is walked from its last element to its first. Every
//! certificate must be inside its validity window and pass the revocation
//! checker. End-entity certificates must match the subject pattern (and the
//! keyUsage rules when enabled); CA certificates must respect the configured
//! path length. Somewhere in the chain an issuer DN must match the trusted
//! issuer pattern, and exactly one end-entity certificate must be present.

use crate::error::{AuthnError, CertificateError, HandlerError, Result};
use crate::handler::AuthenticationHandler;
use crate::revocation::{NoOpRevocationChecker, RevocationChecker};
use async_trait::async_trait;
use regex::Regex;
use ssoconfig::{define_options, Count, Duration};
use std::sync::Arc;
use std::time::{Duration as StdDuration, SystemTime};
use ticket::{
    BasicConstraints, CertificateValidity, Credential, HandlerResult, KeyUsage, Principal,
    X509Certificate, X509CertificateCredential, KEY_USAGE_OID,
};
use tracing::{debug, warn};

define_options! {
    /// Chain validation settings from the `[x509]` section
    pub struct X509Options {
        /// End-entity subject DNs must fully match this pattern
        subject_dn_pattern: String = ".*".to_string(),
        /// Required; some issuer DN in the chain must fully match it
        trusted_issuer_dn_pattern: String = String::new(),
        /// Largest pathLenConstraint accepted on a CA certificate
        max_path_length: Count = Count(1),
        /// Accept CA certificates without a pathLenConstraint
        max_path_length_allow_unspecified: bool = false,
        check_key_usage: bool = false,
        require_key_usage: bool = false,
        revocation_timeout: Duration = Duration(StdDuration::from_secs(5)),
        /// File of revoked certificates, one `<serial> <issuer DN>` per line;
        /// empty leaves revocation unchecked
        revocation_list: String = String::new(),
    }
}

const DEFAULT_NAME: &str = "X509CredentialsAuthenticationHandler";

/// Compile `pattern` so that it must match the whole input
fn full_match(pattern: &str) -> Result<Regex> {
    Ok(Regex::new(&format!("^(?:{})$", pattern))?)
}

#[derive(Debug)]
pub struct X509CredentialsAuthenticationHandler {
    name: String,
    subject_dn_pattern: Regex,
    subject_dn_source: String,
    trusted_issuer_dn_pattern: Regex,
    max_path_length: u32,
    max_path_length_allow_unspecified: bool,
    check_key_usage: bool,
    require_key_usage: bool,
    revocation_checker: Arc<dyn RevocationChecker>,
    revocation_timeout: StdDuration,
}

impl X509CredentialsAuthenticationHandler {
    /// Build from options; fails when a pattern is missing or invalid
    pub fn new(options: &X509Options) -> Result<Self> {
        if options.subject_dn_pattern.trim().is_empty() {
            return Err(AuthnError::InvalidConfiguration(
                "Subject DN pattern is not configured".to_string(),
            ));
        }
        if options.trusted_issuer_dn_pattern.trim().is_empty() {
            return Err(AuthnError::InvalidConfiguration(
                "Trusted issuer DN pattern is not configured".to_string(),
            ));
        }

        Ok(Self {
            name: DEFAULT_NAME.to_string(),
            subject_dn_pattern: full_match(&options.subject_dn_pattern)?,
            subject_dn_source: options.subject_dn_pattern.clone(),
            trusted_issuer_dn_pattern: full_match(&options.trusted_issuer_dn_pattern)?,
            max_path_length: u32::try_from(options.max_path_length.0).unwrap_or(u32::MAX),
            max_path_length_allow_unspecified: options.max_path_length_allow_unspecified,
            check_key_usage: options.check_key_usage,
            require_key_usage: options.require_key_usage,
            revocation_checker: Arc::new(NoOpRevocationChecker),
            revocation_timeout: options.revocation_timeout.0,
        })
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_revocation_checker(mut self, checker: Arc<dyn RevocationChecker>) -> Self {
        self.revocation_checker = checker;
        self
    }

    /// Validate `credential` as of `now`
    ///
    /// On success the handler result carries the credential with its
    /// end-entity certificate resolved; the principal id is that
    /// certificate's subject DN.
    pub async fn authenticate_chain(
        &self,
        credential: &X509CertificateCredential,
        now: SystemTime,
    ) -> std::result::Result<HandlerResult, HandlerError> {
        let mut end_entities: Vec<&X509Certificate> = Vec::new();
        let mut has_trusted_issuer = false;

        for certificate in credential.certificates().iter().rev() {
            debug!("Evaluating {}", certificate);
            self.validate(certificate, now).await?;
            if !has_trusted_issuer {
                has_trusted_issuer = self.is_from_trusted_issuer(certificate);
            }
            match certificate.basic_constraints() {
                BasicConstraints::EndEntity => {
                    debug!("Found valid client certificate");
                    end_entities.push(certificate);
                }
                BasicConstraints::Ca { .. } => debug!("Found valid CA certificate"),
            }
        }

        match (has_trusted_issuer, end_entities.as_slice()) {
            (true, [leaf]) => {
                let resolved = credential.resolved((*leaf).clone());
                let principal = Principal::new(resolved.id());
                Ok(HandlerResult::new(
                    self.name.clone(),
                    &Credential::X509(resolved),
                    principal,
                ))
            }
            (false, _) => {
                warn!("Either client certificate could not be determined, or a trusted issuer could not be located");
                Err(CertificateError::UntrustedIssuer.into())
            }
            (true, found) => {
                warn!("Either client certificate could not be determined, or a trusted issuer could not be located");
                Err(CertificateError::EndEntityCount(found.len()).into())
            }
        }
    }

    async fn validate(&self, certificate: &X509Certificate, now: SystemTime) -> std::result::Result<(), CertificateError> {
        match certificate.validity_at(now) {
            CertificateValidity::Valid => {}
            CertificateValidity::Expired => {
                return Err(CertificateError::Expired {
                    subject: certificate.subject_dn().to_string(),
                })
            }
            CertificateValidity::NotYetValid => {
                return Err(CertificateError::NotYetValid {
                    subject: certificate.subject_dn().to_string(),
                })
            }
        }

        match tokio::time::timeout(
            self.revocation_timeout,
            self.revocation_checker.check(certificate),
        )
        .await
        {
            Ok(result) => result?,
            Err(_) => {
                return Err(CertificateError::RevocationUnavailable(format!(
                    "revocation check for {} timed out after {:?}",
                    certificate.serial(),
                    self.revocation_timeout
                )))
            }
        }

        match certificate.basic_constraints() {
            BasicConstraints::EndEntity => {
                if !self.is_certificate_allowed(certificate) {
                    return Err(CertificateError::UntrustedSubject {
                        subject: certificate.subject_dn().to_string(),
                        pattern: self.subject_dn_source.clone(),
                    });
                }
                if self.check_key_usage && !self.is_valid_key_usage(certificate) {
                    return Err(CertificateError::KeyUsageViolation);
                }
            }
            BasicConstraints::Ca { path_len: None } => {
                if !self.max_path_length_allow_unspecified {
                    return Err(CertificateError::UnlimitedPathNotAllowed);
                }
            }
            BasicConstraints::Ca {
                path_len: Some(path_len),
            } => {
                if path_len > self.max_path_length {
                    return Err(CertificateError::PathLengthExceeded {
                        path_len,
                        max: self.max_path_length,
                    });
                }
            }
        }
        Ok(())
    }

    fn is_valid_key_usage(&self, certificate: &X509Certificate) -> bool {
        debug!("Checking certificate keyUsage extension");
        let Some(key_usage) = certificate.key_usage() else {
            warn!("Configuration specifies checkKeyUsage but keyUsage extension not found in certificate.");
            return !self.require_key_usage;
        };

        if certificate.is_critical(KEY_USAGE_OID) || self.require_key_usage {
            debug!("KeyUsage extension is marked critical or required by configuration.");
            key_usage.contains(KeyUsage::DIGITAL_SIGNATURE)
        } else {
            debug!(
                "KeyUsage digitalSignature={}, returning true since keyUsage validation not required by configuration.",
                key_usage.contains(KeyUsage::DIGITAL_SIGNATURE)
            );
            true
        }
    }

    fn is_certificate_allowed(&self, certificate: &X509Certificate) -> bool {
        does_name_match(certificate.subject_dn(), &self.subject_dn_pattern)
    }

    fn is_from_trusted_issuer(&self, certificate: &X509Certificate) -> bool {
        does_name_match(certificate.issuer_dn(), &self.trusted_issuer_dn_pattern)
    }
}

fn does_name_match(name: &str, pattern: &Regex) -> bool {
    let result = pattern.is_match(name);
    debug!("{} matches {} == {}", pattern.as_str(), name, result);
    result
}

#[async_trait]
impl AuthenticationHandler for X509CredentialsAuthenticationHandler {
    fn name(&self) -> &str {
        &self.name
    }

    fn supports(&self, credential: &Credential) -> bool {
        matches!(credential, Credential::X509(_))
    }

    async fn authenticate(&self, credential: &Credential) -> std::result::Result<HandlerResult, HandlerError> {
        match credential {
            Credential::X509(chain) => self.authenticate_chain(chain, SystemTime::now()).await,
            other => Err(HandlerError::failed_login(format!(
                "{} does not support {}",
                self.name,
                other.type_name()
            ))),
        }
    }
}
