//! Audit events for authentication outcomes

use async_trait::async_trait;
use serde::Serialize;
use std::fmt::Debug;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EventType {
    #[serde(rename = "EVENT_TYPE_SSO_AUTHENTICATION")]
    SsoAuthentication,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventResult {
    Success,
    Failure,
}

/// One audit record
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditEvent {
    pub event_type: EventType,
    pub tenant_id: String,
    pub result: EventResult,
    /// Canonical failure kind name, absent for unknown failures
    pub failure_kind: Option<String>,
    pub message_code: String,
    pub credential_id: String,
    pub detail: String,
    /// Milliseconds since the Unix epoch
    pub timestamp: u64,
}

impl AuditEvent {
    pub fn authentication_failure(
        tenant_id: impl Into<String>,
        failure_kind: Option<String>,
        message_code: impl Into<String>,
        credential_id: impl Into<String>,
        detail: impl Into<String>,
    ) -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
            .unwrap_or(0);
        Self {
            event_type: EventType::SsoAuthentication,
            tenant_id: tenant_id.into(),
            result: EventResult::Failure,
            failure_kind,
            message_code: message_code.into(),
            credential_id: credential_id.into(),
            detail: detail.into(),
            timestamp,
        }
    }
}

#[derive(Error, Debug)]
pub enum PublishError {
    #[error("Failed to serialize event: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Event sink unavailable: {0}")]
    Unavailable(String),
}

/// Fire-and-forget audit sink
#[async_trait]
pub trait EventPublisher: Send + Sync + Debug {
    async fn publish(&self, event: &AuditEvent) -> Result<(), PublishError>;
}

/// Writes each event as one JSON line to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingEventPublisher;

#[async_trait]
impl EventPublisher for LoggingEventPublisher {
    async fn publish(&self, event: &AuditEvent) -> Result<(), PublishError> {
        let json = serde_json::to_string(event)?;
        info!(target: "audit", "{}", json);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_json_shape() {
        let event = AuditEvent::authentication_failure(
            "acme",
            Some("FailedLoginException".to_string()),
            "authenticationFailure.FailedLoginException",
            "CN=alice",
            "Credential: CN=alice, message: handler error: FailedLoginException, message code: authenticationFailure.FailedLoginException",
        );
        let value = serde_json::to_value(&event).unwrap();

        assert_eq!(value["event_type"], "EVENT_TYPE_SSO_AUTHENTICATION");
        assert_eq!(value["result"], "FAILURE");
        assert_eq!(value["tenant_id"], "acme");
        assert_eq!(value["failure_kind"], "FailedLoginException");
    }

    #[tokio::test]
    async fn test_logging_publisher() {
        let event = AuditEvent::authentication_failure("self", None, "authenticationFailure.UNKNOWN", "unknown", "x");
        assert!(LoggingEventPublisher.publish(&event).await.is_ok());
    }
}
