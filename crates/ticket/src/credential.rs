//! Offered credentials and the X.509 certificate model
//!
//! Transport layers hand the server fully decoded credentials. Certificates
//! can be built from DER via [`X509Certificate::from_der`] or assembled
//! field by field with [`X509CertificateBuilder`].

use crate::error::{Result, TicketError};
use crate::service::Service;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// OID of the keyUsage extension
pub const KEY_USAGE_OID: &str = "2.5.29.15";

bitflags::bitflags! {
    /// keyUsage bits in RFC 5280 order
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct KeyUsage: u16 {
        const DIGITAL_SIGNATURE = 1 << 0;
        const NON_REPUDIATION = 1 << 1;
        const KEY_ENCIPHERMENT = 1 << 2;
        const DATA_ENCIPHERMENT = 1 << 3;
        const KEY_AGREEMENT = 1 << 4;
        const KEY_CERT_SIGN = 1 << 5;
        const CRL_SIGN = 1 << 6;
        const ENCIPHER_ONLY = 1 << 7;
        const DECIPHER_ONLY = 1 << 8;
    }
}

/// basicConstraints as seen by chain validation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BasicConstraints {
    /// Not a CA (extension absent or `cA = false`)
    EndEntity,
    /// CA certificate; `None` means no pathLenConstraint (unlimited)
    Ca { path_len: Option<u32> },
}

impl BasicConstraints {
    pub fn is_ca(&self) -> bool {
        matches!(self, BasicConstraints::Ca { .. })
    }
}

/// Outcome of a temporal validity check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CertificateValidity {
    Valid,
    Expired,
    NotYetValid,
}

/// Decoded X.509 certificate fields used by authentication
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct X509Certificate {
    subject_dn: String,
    issuer_dn: String,
    serial: String,
    not_before: SystemTime,
    not_after: SystemTime,
    basic_constraints: BasicConstraints,
    key_usage: Option<KeyUsage>,
    critical_extensions: BTreeSet<String>,
    fingerprint: String,
}

impl X509Certificate {
    pub fn builder(subject_dn: impl Into<String>, issuer_dn: impl Into<String>) -> X509CertificateBuilder {
        X509CertificateBuilder::new(subject_dn, issuer_dn)
    }

    /// Decode a DER-encoded certificate
    pub fn from_der(der: &[u8]) -> Result<Self> {
        let (_, cert) = x509_parser::parse_x509_certificate(der)
            .map_err(|e| TicketError::InvalidCertificate(format!("DER decode failed: {}", e)))?;

        let basic_constraints = match cert.basic_constraints() {
            Ok(Some(ext)) if ext.value.ca => BasicConstraints::Ca {
                path_len: ext.value.path_len_constraint,
            },
            Ok(_) => BasicConstraints::EndEntity,
            Err(e) => {
                return Err(TicketError::InvalidCertificate(format!(
                    "bad basicConstraints: {}",
                    e
                )))
            }
        };

        let key_usage = cert
            .key_usage()
            .map_err(|e| TicketError::InvalidCertificate(format!("bad keyUsage: {}", e)))?
            .map(|ext| KeyUsage::from_bits_truncate(ext.value.flags));

        let critical_extensions = cert
            .extensions()
            .iter()
            .filter(|ext| ext.critical)
            .map(|ext| ext.oid.to_id_string())
            .collect();

        let validity = cert.validity();
        Ok(Self {
            subject_dn: cert.subject().to_string(),
            issuer_dn: cert.issuer().to_string(),
            serial: hex::encode(cert.raw_serial()),
            not_before: system_time_from_unix(validity.not_before.timestamp()),
            not_after: system_time_from_unix(validity.not_after.timestamp()),
            basic_constraints,
            key_usage,
            critical_extensions,
            fingerprint: hex::encode(Sha256::digest(der)),
        })
    }

    pub fn subject_dn(&self) -> &str {
        &self.subject_dn
    }

    pub fn issuer_dn(&self) -> &str {
        &self.issuer_dn
    }

    /// Serial number, lowercase hex
    pub fn serial(&self) -> &str {
        &self.serial
    }

    pub fn not_before(&self) -> SystemTime {
        self.not_before
    }

    pub fn not_after(&self) -> SystemTime {
        self.not_after
    }

    pub fn basic_constraints(&self) -> BasicConstraints {
        self.basic_constraints
    }

    /// keyUsage bits, `None` when the extension is absent
    pub fn key_usage(&self) -> Option<KeyUsage> {
        self.key_usage
    }

    pub fn is_critical(&self, oid: &str) -> bool {
        self.critical_extensions.contains(oid)
    }

    /// Hex SHA-256 over the DER encoding
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn validity_at(&self, now: SystemTime) -> CertificateValidity {
        if now < self.not_before {
            CertificateValidity::NotYetValid
        } else if now > self.not_after {
            CertificateValidity::Expired
        } else {
            CertificateValidity::Valid
        }
    }
}

impl fmt::Display for X509Certificate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SubjectDN: {}, IssuerDN: {}, SerialNumber: {}",
            self.subject_dn, self.issuer_dn, self.serial
        )
    }
}

fn system_time_from_unix(secs: i64) -> SystemTime {
    if secs >= 0 {
        UNIX_EPOCH + Duration::from_secs(secs.unsigned_abs())
    } else {
        UNIX_EPOCH - Duration::from_secs(secs.unsigned_abs())
    }
}

/// Assembles an [`X509Certificate`] without a DER encoding
#[derive(Debug, Clone)]
pub struct X509CertificateBuilder {
    subject_dn: String,
    issuer_dn: String,
    serial: String,
    not_before: SystemTime,
    not_after: SystemTime,
    basic_constraints: BasicConstraints,
    key_usage: Option<KeyUsage>,
    critical_extensions: BTreeSet<String>,
}

impl X509CertificateBuilder {
    pub fn new(subject_dn: impl Into<String>, issuer_dn: impl Into<String>) -> Self {
        let now = SystemTime::now();
        Self {
            subject_dn: subject_dn.into(),
            issuer_dn: issuer_dn.into(),
            serial: "01".to_string(),
            not_before: now - Duration::from_secs(3600),
            not_after: now + Duration::from_secs(365 * 86400),
            basic_constraints: BasicConstraints::EndEntity,
            key_usage: None,
            critical_extensions: BTreeSet::new(),
        }
    }

    pub fn serial(mut self, serial: impl Into<String>) -> Self {
        self.serial = serial.into().to_lowercase();
        self
    }

    pub fn validity(mut self, not_before: SystemTime, not_after: SystemTime) -> Self {
        self.not_before = not_before;
        self.not_after = not_after;
        self
    }

    pub fn ca(mut self, path_len: Option<u32>) -> Self {
        self.basic_constraints = BasicConstraints::Ca { path_len };
        self
    }

    pub fn key_usage(mut self, usage: KeyUsage, critical: bool) -> Self {
        self.key_usage = Some(usage);
        if critical {
            self.critical_extensions.insert(KEY_USAGE_OID.to_string());
        } else {
            self.critical_extensions.remove(KEY_USAGE_OID);
        }
        self
    }

    pub fn critical_extension(mut self, oid: impl Into<String>) -> Self {
        self.critical_extensions.insert(oid.into());
        self
    }

    pub fn build(self) -> X509Certificate {
        let mut hasher = Sha256::new();
        hasher.update(self.subject_dn.as_bytes());
        hasher.update([0u8]);
        hasher.update(self.issuer_dn.as_bytes());
        hasher.update([0u8]);
        hasher.update(self.serial.as_bytes());

        X509Certificate {
            subject_dn: self.subject_dn,
            issuer_dn: self.issuer_dn,
            serial: self.serial,
            not_before: self.not_before,
            not_after: self.not_after,
            basic_constraints: self.basic_constraints,
            key_usage: self.key_usage,
            critical_extensions: self.critical_extensions,
            fingerprint: hex::encode(hasher.finalize()),
        }
    }
}

/// A certificate chain offered for authentication
///
/// The chain may be ordered leaf-to-root or root-to-leaf. After successful
/// validation the end-entity certificate is recorded as the resolved leaf.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct X509CertificateCredential {
    certificates: Vec<X509Certificate>,
    certificate: Option<X509Certificate>,
}

impl X509CertificateCredential {
    pub fn new(certificates: Vec<X509Certificate>) -> Self {
        Self {
            certificates,
            certificate: None,
        }
    }

    /// Decode every DER blob of a chain
    pub fn from_der_chain<B: AsRef<[u8]>>(chain: &[B]) -> Result<Self> {
        let certificates = chain
            .iter()
            .map(|der| X509Certificate::from_der(der.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(certificates))
    }

    pub fn certificates(&self) -> &[X509Certificate] {
        &self.certificates
    }

    /// The resolved end-entity certificate, once validated
    pub fn certificate(&self) -> Option<&X509Certificate> {
        self.certificate.as_ref()
    }

    /// Copy of this credential with `leaf` recorded as the resolved certificate
    pub fn resolved(&self, leaf: X509Certificate) -> Self {
        Self {
            certificates: self.certificates.clone(),
            certificate: Some(leaf),
        }
    }

    pub fn id(&self) -> String {
        match &self.certificate {
            Some(cert) => cert.subject_dn().to_string(),
            None => "unknown".to_string(),
        }
    }
}

/// Callback endpoint offered by a service that wants to act as a proxy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpBasedServiceCredential {
    callback_url: String,
    service: Service,
}

impl HttpBasedServiceCredential {
    pub fn new(callback_url: impl Into<String>, service: Service) -> Self {
        Self {
            callback_url: callback_url.into(),
            service,
        }
    }

    pub fn callback_url(&self) -> &str {
        &self.callback_url
    }

    pub fn service(&self) -> &Service {
        &self.service
    }

    pub fn id(&self) -> String {
        self.callback_url.clone()
    }
}

/// A credential offered to the authentication manager
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credential {
    X509(X509CertificateCredential),
    Http(HttpBasedServiceCredential),
}

impl Credential {
    pub fn id(&self) -> String {
        match self {
            Credential::X509(c) => c.id(),
            Credential::Http(c) => c.id(),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Credential::X509(_) => "X509CertificateCredential",
            Credential::Http(_) => "HttpBasedServiceCredential",
        }
    }
}

impl From<X509CertificateCredential> for Credential {
    fn from(c: X509CertificateCredential) -> Self {
        Credential::X509(c)
    }
}

impl From<HttpBasedServiceCredential> for Credential {
    fn from(c: HttpBasedServiceCredential) -> Self {
        Credential::Http(c)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validity_window() {
        let now = SystemTime::now();
        let cert = X509Certificate::builder("CN=alice", "CN=Root")
            .validity(now - Duration::from_secs(10), now + Duration::from_secs(10))
            .build();

        assert_eq!(cert.validity_at(now), CertificateValidity::Valid);
        assert_eq!(
            cert.validity_at(now + Duration::from_secs(60)),
            CertificateValidity::Expired
        );
        assert_eq!(
            cert.validity_at(now - Duration::from_secs(60)),
            CertificateValidity::NotYetValid
        );
    }

    #[test]
    fn test_key_usage_criticality() {
        let cert = X509Certificate::builder("CN=alice", "CN=Root")
            .key_usage(KeyUsage::DIGITAL_SIGNATURE | KeyUsage::KEY_ENCIPHERMENT, true)
            .build();

        assert!(cert.is_critical(KEY_USAGE_OID));
        assert!(cert.key_usage().unwrap().contains(KeyUsage::DIGITAL_SIGNATURE));

        let relaxed = X509Certificate::builder("CN=alice", "CN=Root")
            .key_usage(KeyUsage::KEY_ENCIPHERMENT, false)
            .build();
        assert!(!relaxed.is_critical(KEY_USAGE_OID));
    }

    #[test]
    fn test_credential_id_follows_resolved_leaf() {
        let leaf = X509Certificate::builder("CN=alice,O=Acme", "CN=Root").build();
        let credential = X509CertificateCredential::new(vec![leaf.clone()]);
        assert_eq!(credential.id(), "unknown");

        let resolved = credential.resolved(leaf);
        assert_eq!(resolved.id(), "CN=alice,O=Acme");
        assert_eq!(Credential::from(resolved).type_name(), "X509CertificateCredential");
    }

    #[test]
    fn test_garbage_der_rejected() {
        assert!(matches!(
            X509Certificate::from_der(&[0x30, 0x03, 0x02, 0x01]),
            Err(TicketError::InvalidCertificate(_))
        ));
    }

    const ALICE_DER: &[u8] = include_bytes!("../tests/fixtures/alice.der");
    const ROOT_CA_DER: &[u8] = include_bytes!("../tests/fixtures/acme-root-ca.der");

    #[test]
    fn test_from_der_end_entity() {
        let cert = X509Certificate::from_der(ALICE_DER).unwrap();

        for rdn in ["O=Acme", "OU=Staff", "CN=alice"] {
            assert!(cert.subject_dn().contains(rdn), "{}", cert.subject_dn());
        }
        assert!(cert.issuer_dn().contains("CN=Acme Root CA"), "{}", cert.issuer_dn());
        assert_eq!(cert.serial(), "2a2b");
        assert_eq!(cert.not_before(), UNIX_EPOCH + Duration::from_secs(1_704_067_200));
        assert_eq!(cert.not_after(), UNIX_EPOCH + Duration::from_secs(2_524_607_999));
        assert_eq!(cert.basic_constraints(), BasicConstraints::EndEntity);
        assert_eq!(
            cert.key_usage(),
            Some(KeyUsage::DIGITAL_SIGNATURE | KeyUsage::KEY_ENCIPHERMENT)
        );
        assert!(cert.is_critical(KEY_USAGE_OID));
        assert_eq!(
            cert.fingerprint(),
            "519d360d581408773f4e39d8c394527f466c1a7ea8d095aeda512e439af79ef1"
        );
    }

    #[test]
    fn test_from_der_ca() {
        let cert = X509Certificate::from_der(ROOT_CA_DER).unwrap();

        assert_eq!(cert.subject_dn(), cert.issuer_dn());
        assert_eq!(cert.serial(), "1001");
        assert_eq!(cert.basic_constraints(), BasicConstraints::Ca { path_len: Some(1) });
        assert_eq!(cert.key_usage(), Some(KeyUsage::KEY_CERT_SIGN | KeyUsage::CRL_SIGN));
        assert_eq!(
            cert.validity_at(UNIX_EPOCH + Duration::from_secs(1_800_000_000)),
            CertificateValidity::Valid
        );
    }

    #[test]
    fn test_fingerprint_distinguishes_serials() {
        let a = X509Certificate::builder("CN=a", "CN=Root").serial("0A").build();
        let b = X509Certificate::builder("CN=a", "CN=Root").serial("0B").build();
        assert_eq!(a.serial(), "0a");
        assert_ne!(a.fingerprint(), b.fingerprint());
    }
}
