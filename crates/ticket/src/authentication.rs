//! Authentication results attached to granting tickets

use crate::credential::Credential;
use crate::principal::Principal;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::SystemTime;

/// Metadata about a credential that took part in an authentication
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialMetaData {
    pub id: String,
    pub credential_type: &'static str,
}

impl From<&Credential> for CredentialMetaData {
    fn from(credential: &Credential) -> Self {
        Self {
            id: credential.id(),
            credential_type: credential.type_name(),
        }
    }
}

/// Successful outcome of a single handler
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerResult {
    pub handler_name: String,
    pub credential: CredentialMetaData,
    pub principal: Principal,
}

impl HandlerResult {
    pub fn new(handler_name: impl Into<String>, credential: &Credential, principal: Principal) -> Self {
        Self {
            handler_name: handler_name.into(),
            credential: CredentialMetaData::from(credential),
            principal,
        }
    }
}

/// The resolved principal plus per-handler results of one login
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Authentication {
    principal: Arc<Principal>,
    authentication_date: SystemTime,
    credentials: Vec<CredentialMetaData>,
    successes: BTreeMap<String, HandlerResult>,
    /// handler name -> canonical failure kind name
    failures: BTreeMap<String, String>,
}

impl Authentication {
    pub fn new(principal: Principal) -> Self {
        Self {
            principal: Arc::new(principal),
            authentication_date: SystemTime::now(),
            credentials: Vec::new(),
            successes: BTreeMap::new(),
            failures: BTreeMap::new(),
        }
    }

    pub fn with_credential(mut self, credential: CredentialMetaData) -> Self {
        self.credentials.push(credential);
        self
    }

    pub fn with_success(mut self, result: HandlerResult) -> Self {
        self.successes.insert(result.handler_name.clone(), result);
        self
    }

    pub fn with_failure(mut self, handler_name: impl Into<String>, kind: impl Into<String>) -> Self {
        self.failures.insert(handler_name.into(), kind.into());
        self
    }

    pub fn principal(&self) -> &Arc<Principal> {
        &self.principal
    }

    pub fn authentication_date(&self) -> SystemTime {
        self.authentication_date
    }

    pub fn credentials(&self) -> &[CredentialMetaData] {
        &self.credentials
    }

    pub fn successes(&self) -> &BTreeMap<String, HandlerResult> {
        &self.successes
    }

    pub fn failures(&self) -> &BTreeMap<String, String> {
        &self.failures
    }
}
