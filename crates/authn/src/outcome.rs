//! Mapping authentication failures to flow outcomes
//!
//! The handler owns an ordered list of failure kinds. For a raised
//! [`AuthenticationException`] it returns the first list entry present
//! among the handler errors, so the list alone decides precedence when
//! several handlers fail differently. Nothing matching yields
//! [`UNKNOWN`]. Every resolution publishes one audit event; publishing
//! failures are logged and swallowed.

use crate::audit::{AuditEvent, EventPublisher};
use crate::error::{AuthenticationException, FailureKind, Result};
use ssoconfig::define_options;
use std::sync::Arc;
use tracing::{info, trace, warn};

/// Outcome when no known failure kind was raised
pub const UNKNOWN: &str = "UNKNOWN";

pub const DEFAULT_MESSAGE_BUNDLE_PREFIX: &str = "authenticationFailure.";

define_options! {
    /// Outcome mapping settings from the `[authentication]` section
    pub struct OutcomeOptions {
        /// Prefix of every message catalog key
        message_bundle_prefix: String = DEFAULT_MESSAGE_BUNDLE_PREFIX.to_string(),
        /// Comma separated failure kind names; empty keeps the default order
        failure_precedence: String = String::new(),
        /// Tenant reported when the request carries none
        default_tenant: String = "self".to_string(),
    }
}

impl OutcomeOptions {
    pub fn precedence(&self) -> Result<Vec<FailureKind>> {
        if self.failure_precedence.trim().is_empty() {
            return Ok(FailureKind::DEFAULT_PRECEDENCE.to_vec());
        }
        self.failure_precedence
            .split(',')
            .filter(|s| !s.trim().is_empty())
            .map(str::parse::<FailureKind>)
            .collect()
    }
}

/// Per-request data reported with the audit event
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestContext {
    pub tenant_id: Option<String>,
    pub credential_id: Option<String>,
}

/// Resolved outcome of a failed authentication
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticationOutcome {
    /// Flow outcome: a failure kind name or [`UNKNOWN`]
    pub state: String,
    /// `<prefix><state>`
    pub message_code: String,
    pub failure_kind: Option<FailureKind>,
}

#[derive(Debug, Clone)]
pub struct AuthenticationExceptionHandler {
    errors: Vec<FailureKind>,
    message_bundle_prefix: String,
    default_tenant: String,
    publisher: Arc<dyn EventPublisher>,
}

impl AuthenticationExceptionHandler {
    pub fn new(publisher: Arc<dyn EventPublisher>) -> Self {
        Self {
            errors: FailureKind::DEFAULT_PRECEDENCE.to_vec(),
            message_bundle_prefix: DEFAULT_MESSAGE_BUNDLE_PREFIX.to_string(),
            default_tenant: "self".to_string(),
            publisher,
        }
    }

    pub fn from_options(options: &OutcomeOptions, publisher: Arc<dyn EventPublisher>) -> Result<Self> {
        Ok(Self {
            errors: options.precedence()?,
            message_bundle_prefix: options.message_bundle_prefix.clone(),
            default_tenant: options.default_tenant.clone(),
            publisher,
        })
    }

    pub fn with_errors(mut self, errors: Vec<FailureKind>) -> Self {
        self.errors = errors;
        self
    }

    pub fn with_message_bundle_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.message_bundle_prefix = prefix.into();
        self
    }

    /// Known failure kinds in precedence order
    pub fn errors(&self) -> &[FailureKind] {
        &self.errors
    }

    /// First known kind, in list order, raised by any handler
    pub fn resolve(&self, exception: Option<&AuthenticationException>) -> Option<FailureKind> {
        let exception = exception?;
        self.errors
            .iter()
            .copied()
            .find(|kind| exception.contains_kind(*kind))
    }

    /// Resolve the outcome and publish the audit event
    pub async fn handle(
        &self,
        context: &RequestContext,
        exception: Option<&AuthenticationException>,
    ) -> AuthenticationOutcome {
        let credential_id = context
            .credential_id
            .clone()
            .or_else(|| exception.and_then(|e| e.credential_ids().first().cloned()))
            .unwrap_or_else(|| "unknown".to_string());

        match self.resolve(exception) {
            Some(kind) => {
                let message_code = format!("{}{}", self.message_bundle_prefix, kind.name());
                let message = format!("handler error: {}, message code: {}", kind.name(), message_code);
                self.publish(context, Some(kind), &message_code, &credential_id, &message)
                    .await;
                AuthenticationOutcome {
                    state: kind.name().to_string(),
                    message_code,
                    failure_kind: Some(kind),
                }
            }
            None => {
                let message_code = format!("{}{}", self.message_bundle_prefix, UNKNOWN);
                trace!(
                    "Unable to translate handler errors of the authentication exception {:?}. Returning {} by default...",
                    exception,
                    message_code
                );
                self.publish(context, None, &message_code, &credential_id, &message_code)
                    .await;
                AuthenticationOutcome {
                    state: UNKNOWN.to_string(),
                    message_code,
                    failure_kind: None,
                }
            }
        }
    }

    async fn publish(
        &self,
        context: &RequestContext,
        kind: Option<FailureKind>,
        message_code: &str,
        credential_id: &str,
        message: &str,
    ) {
        let tenant_id = context
            .tenant_id
            .clone()
            .unwrap_or_else(|| self.default_tenant.clone());
        let detail = format!("Credential: {}, message: {}", credential_id, message);
        let event = AuditEvent::authentication_failure(
            tenant_id,
            kind.map(|k| k.name().to_string()),
            message_code,
            credential_id,
            detail,
        );

        match self.publisher.publish(&event).await {
            Ok(()) => info!("Successfully published login event for a user {}", credential_id),
            Err(e) => warn!("Could not publish login event for a user {}: {}", credential_id, e),
        }
    }
}
