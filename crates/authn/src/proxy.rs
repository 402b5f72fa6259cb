//! Proxy callback credentials

use crate::error::HandlerError;
use crate::handler::AuthenticationHandler;
use async_trait::async_trait;
use ticket::{Credential, HandlerResult, Principal};
use tracing::debug;
use url::Url;

const DEFAULT_NAME: &str = "HttpBasedServiceCredentialsHandler";

/// Accepts a proxy callback URL as a credential
///
/// The URL must parse and, unless relaxed, use `https`. Contacting the
/// callback is the transport layer's job.
#[derive(Debug, Clone)]
pub struct HttpBasedServiceCredentialsHandler {
    name: String,
    require_secure: bool,
}

impl Default for HttpBasedServiceCredentialsHandler {
    fn default() -> Self {
        Self {
            name: DEFAULT_NAME.to_string(),
            require_secure: true,
        }
    }
}

impl HttpBasedServiceCredentialsHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_require_secure(mut self, require_secure: bool) -> Self {
        self.require_secure = require_secure;
        self
    }
}

#[async_trait]
impl AuthenticationHandler for HttpBasedServiceCredentialsHandler {
    fn name(&self) -> &str {
        &self.name
    }

    fn supports(&self, credential: &Credential) -> bool {
        matches!(credential, Credential::Http(_))
    }

    async fn authenticate(&self, credential: &Credential) -> Result<HandlerResult, HandlerError> {
        let Credential::Http(http) = credential else {
            return Err(HandlerError::failed_login(format!(
                "{} does not support {}",
                self.name,
                credential.type_name()
            )));
        };

        let callback = Url::parse(http.callback_url()).map_err(|e| {
            HandlerError::failed_login(format!("invalid callback url {}: {}", http.callback_url(), e))
        })?;
        if self.require_secure && callback.scheme() != "https" {
            debug!("Authentication failed because url was not secure.");
            return Err(HandlerError::failed_login(format!(
                "callback url {} is not secure",
                http.callback_url()
            )));
        }

        debug!("Attempting to authenticate {}", http.callback_url());
        Ok(HandlerResult::new(
            self.name.clone(),
            credential,
            Principal::new(http.callback_url()),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FailureKind;
    use ticket::{HttpBasedServiceCredential, Service};

    fn credential(url: &str) -> Credential {
        Credential::Http(HttpBasedServiceCredential::new(url, Service::new("https://proxy/")))
    }

    #[tokio::test]
    async fn test_secure_callback() {
        let result = HttpBasedServiceCredentialsHandler::new()
            .authenticate(&credential("https://proxy/cb"))
            .await
            .unwrap();
        assert_eq!(result.principal.id(), "https://proxy/cb");
    }

    #[tokio::test]
    async fn test_insecure_callback() {
        let handler = HttpBasedServiceCredentialsHandler::new();
        let err = handler.authenticate(&credential("http://proxy/cb")).await.unwrap_err();
        assert_eq!(err.kind, FailureKind::FailedLogin);

        let relaxed = handler.with_require_secure(false);
        assert!(relaxed.authenticate(&credential("http://proxy/cb")).await.is_ok());
        assert!(relaxed.authenticate(&credential("not a url")).await.is_err());
    }
}
