//! Authentication manager
//!
//! Runs every supporting handler, in order, over each offered credential
//! and assembles the result. Successes are keyed by handler name; each
//! failure is recorded as handler name -> error.

use crate::error::{AuthenticationException, HandlerError};
use crate::handler::AuthenticationHandler;
use std::collections::BTreeMap;
use std::sync::Arc;
use ticket::{Authentication, Credential, CredentialMetaData, HandlerResult};
use tracing::{debug, info, warn};

/// When a set of handler results counts as an authentication
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthenticationPolicy {
    /// At least one credential was authenticated
    #[default]
    Any,
    /// Every offered credential was authenticated
    All,
}

impl AuthenticationPolicy {
    fn is_satisfied(&self, successes: usize, credentials: usize) -> bool {
        match self {
            AuthenticationPolicy::Any => successes > 0,
            AuthenticationPolicy::All => successes >= credentials,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AuthenticationManager {
    handlers: Vec<Arc<dyn AuthenticationHandler>>,
    policy: AuthenticationPolicy,
}

impl AuthenticationManager {
    pub fn new(handlers: Vec<Arc<dyn AuthenticationHandler>>) -> Self {
        Self {
            handlers,
            policy: AuthenticationPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: AuthenticationPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn handlers(&self) -> &[Arc<dyn AuthenticationHandler>] {
        &self.handlers
    }

    /// Authenticate `credentials`
    ///
    /// Stops as soon as the policy is satisfied. The principal of the
    /// result is the one produced by the first successful handler.
    pub async fn authenticate(
        &self,
        credentials: &[Credential],
    ) -> Result<Authentication, AuthenticationException> {
        let credential_ids: Vec<String> = credentials.iter().map(Credential::id).collect();
        if credentials.is_empty() {
            warn!("No credentials were offered for authentication");
            return Err(AuthenticationException::new(
                BTreeMap::new(),
                BTreeMap::new(),
                credential_ids,
            ));
        }

        let mut successes: Vec<HandlerResult> = Vec::new();
        let mut failures: BTreeMap<String, HandlerError> = BTreeMap::new();
        let mut authenticated_credentials = 0;

        'credentials: for credential in credentials {
            let mut found = false;
            for handler in &self.handlers {
                if !handler.supports(credential) {
                    continue;
                }
                found = true;

                match handler.authenticate(credential).await {
                    Ok(result) => {
                        info!(
                            "{} successfully authenticated {}",
                            handler.name(),
                            result.credential.id
                        );
                        successes.push(result);
                        authenticated_credentials += 1;
                        if self.policy.is_satisfied(authenticated_credentials, credentials.len()) {
                            break 'credentials;
                        }
                        continue 'credentials;
                    }
                    Err(e) => {
                        info!("{} failed authenticating {}: {}", handler.name(), credential.id(), e);
                        failures.insert(handler.name().to_string(), e);
                    }
                }
            }
            if !found {
                warn!(
                    "Cannot find authentication handler that supports [{}] of type [{}]",
                    credential.id(),
                    credential.type_name()
                );
            }
        }

        if !self.policy.is_satisfied(authenticated_credentials, credentials.len()) {
            let successes = successes
                .into_iter()
                .map(|r| (r.handler_name.clone(), r))
                .collect();
            return Err(AuthenticationException::new(failures, successes, credential_ids));
        }

        // satisfied policy implies at least one success
        let Some(first) = successes.first() else {
            return Err(AuthenticationException::new(failures, BTreeMap::new(), credential_ids));
        };
        let mut authentication = Authentication::new(first.principal.clone());
        for result in &successes {
            authentication = authentication.with_credential(result.credential.clone());
        }
        for result in successes {
            authentication = authentication.with_success(result);
        }
        for (name, error) in &failures {
            authentication = authentication.with_failure(name.clone(), error.kind.name());
        }
        debug!(
            "Authenticated {} with credentials {:?}",
            authentication.principal(),
            authentication
                .credentials()
                .iter()
                .map(|c: &CredentialMetaData| c.id.as_str())
                .collect::<Vec<_>>()
        );
        Ok(authentication)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FailureKind;
    use async_trait::async_trait;
    use ticket::{HttpBasedServiceCredential, Principal, Service};

    /// Accepts callback URLs containing `accept`, fails the rest with `kind`
    #[derive(Debug)]
    struct StubHandler {
        name: &'static str,
        kind: FailureKind,
    }

    #[async_trait]
    impl AuthenticationHandler for StubHandler {
        fn name(&self) -> &str {
            self.name
        }

        fn supports(&self, credential: &Credential) -> bool {
            matches!(credential, Credential::Http(_))
        }

        async fn authenticate(&self, credential: &Credential) -> Result<HandlerResult, HandlerError> {
            if credential.id().contains("accept") {
                Ok(HandlerResult::new(self.name, credential, Principal::new(credential.id())))
            } else {
                Err(HandlerError::new(self.kind, "stub"))
            }
        }
    }

    fn http(url: &str) -> Credential {
        Credential::Http(HttpBasedServiceCredential::new(url, Service::new("https://svc/")))
    }

    fn manager(policy: AuthenticationPolicy) -> AuthenticationManager {
        AuthenticationManager::new(vec![
            Arc::new(StubHandler {
                name: "first",
                kind: FailureKind::CredentialExpired,
            }),
            Arc::new(StubHandler {
                name: "second",
                kind: FailureKind::FailedLogin,
            }),
        ])
        .with_policy(policy)
    }

    #[tokio::test]
    async fn test_no_credentials() {
        let err = manager(AuthenticationPolicy::Any).authenticate(&[]).await.unwrap_err();
        assert!(err.handler_errors().is_empty());
    }

    #[tokio::test]
    async fn test_all_handlers_fail() {
        let err = manager(AuthenticationPolicy::Any)
            .authenticate(&[http("https://reject/")])
            .await
            .unwrap_err();

        assert_eq!(err.handler_errors().len(), 2);
        assert!(err.contains_kind(FailureKind::CredentialExpired));
        assert!(err.contains_kind(FailureKind::FailedLogin));
        assert_eq!(err.credential_ids(), ["https://reject/".to_string()]);
    }

    #[tokio::test]
    async fn test_any_policy_stops_at_first_success() {
        let auth = manager(AuthenticationPolicy::Any)
            .authenticate(&[http("https://accept/a"), http("https://accept/b")])
            .await
            .unwrap();

        assert_eq!(auth.principal().id(), "https://accept/a");
        assert_eq!(auth.successes().len(), 1);
        assert!(auth.successes().contains_key("first"));
    }

    #[tokio::test]
    async fn test_all_policy() {
        let err = manager(AuthenticationPolicy::All)
            .authenticate(&[http("https://accept/a"), http("https://reject/b")])
            .await
            .unwrap_err();
        assert_eq!(err.successes().len(), 1);
        assert_eq!(err.handler_errors().len(), 2);

        let auth = manager(AuthenticationPolicy::All)
            .authenticate(&[http("https://accept/a"), http("https://accept/b")])
            .await
            .unwrap();
        assert_eq!(auth.principal().id(), "https://accept/a");
        assert_eq!(auth.credentials().len(), 2);
    }

    #[tokio::test]
    async fn test_unsupported_credential() {
        let err = manager(AuthenticationPolicy::Any)
            .authenticate(&[Credential::X509(ticket::X509CertificateCredential::new(vec![]))])
            .await
            .unwrap_err();
        assert!(err.handler_errors().is_empty());
    }
}
