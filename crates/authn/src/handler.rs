//! Authentication handler capability

use crate::error::HandlerError;
use async_trait::async_trait;
use std::fmt::Debug;
use ticket::{Credential, HandlerResult};

/// Validates one kind of credential
///
/// The manager only calls [`authenticate`](Self::authenticate) for
/// credentials this handler [`supports`](Self::supports).
#[async_trait]
pub trait AuthenticationHandler: Send + Sync + Debug {
    /// Unique name; failures and successes are keyed by it
    fn name(&self) -> &str;

    fn supports(&self, credential: &Credential) -> bool;

    async fn authenticate(&self, credential: &Credential) -> Result<HandlerResult, HandlerError>;
}
