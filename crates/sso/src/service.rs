//! Central ticket service
//!
//! Ties the authentication manager, the registry and the single-logout
//! collaborator together. Every ticket it mints is registered before it is
//! returned; every granting ticket it destroys is first marked expired,
//! then logged out, then removed together with its descendants.

use crate::assertion::{Assertion, LoginOutcome};
use crate::error::{Result, SsoError};
use authn::{AuthenticationExceptionHandler, AuthenticationManager, RequestContext};
use registry::{LogoutManager, LogoutRequest, RegistryOptions, TicketRegistry};
use ssoconfig::SsoConfig;
use std::sync::Arc;
use std::time::Duration;
use ticket::{
    Credential, ExpirationOptions, ExpirationPolicy, GrantingTicket, Service, ServiceTicket,
    Ticket, TicketError, TicketKind, UniqueTicketIdGenerator,
};
use tracing::{debug, info, warn};

/// Ticket lifetimes and the single-logout bound
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub expiration: ExpirationOptions,
    /// Upper bound on one single-logout call when a session is destroyed
    pub logout_timeout: Duration,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            expiration: ExpirationOptions::default(),
            logout_timeout: Duration::from_secs(10),
        }
    }
}

impl ServiceConfig {
    /// `[ticket]` lifetimes and the `[registry]` logout timeout
    pub fn from_config(config: &SsoConfig) -> Self {
        let registry = RegistryOptions::from_config(config, &["registry", "global"]);
        Self {
            expiration: ExpirationOptions::from_config(config, &["ticket", "global"]),
            logout_timeout: registry.cleaner_logout_timeout.0,
        }
    }
}

#[derive(Debug)]
pub struct CentralAuthenticationService {
    config: ServiceConfig,
    registry: Arc<dyn TicketRegistry>,
    authentication_manager: AuthenticationManager,
    exception_handler: AuthenticationExceptionHandler,
    logout_manager: Arc<dyn LogoutManager>,
    id_generator: UniqueTicketIdGenerator,
}

impl CentralAuthenticationService {
    pub fn new(
        config: ServiceConfig,
        registry: Arc<dyn TicketRegistry>,
        authentication_manager: AuthenticationManager,
        exception_handler: AuthenticationExceptionHandler,
        logout_manager: Arc<dyn LogoutManager>,
    ) -> Self {
        let id_generator = UniqueTicketIdGenerator::new(config.expiration.ticket_id_suffix());
        Self {
            config,
            registry,
            authentication_manager,
            exception_handler,
            logout_manager,
            id_generator,
        }
    }

    pub fn registry(&self) -> &Arc<dyn TicketRegistry> {
        &self.registry
    }

    /// Authenticate and open a session
    ///
    /// A failed authentication is not an error here: it is mapped to a flow
    /// outcome (and audited) by the exception handler.
    pub async fn login(
        &self,
        context: &RequestContext,
        credentials: &[Credential],
    ) -> Result<LoginOutcome> {
        match self.create_ticket_granting_ticket(credentials).await {
            Ok(tgt) => Ok(LoginOutcome::Authenticated(tgt)),
            Err(SsoError::UnsatisfiedAuthentication(exception)) => {
                let outcome = self.exception_handler.handle(context, Some(&exception)).await;
                info!(
                    "Login failed with outcome {} ({})",
                    outcome.state, outcome.message_code
                );
                Ok(LoginOutcome::Failed(outcome))
            }
            Err(e) => Err(e),
        }
    }

    pub async fn create_ticket_granting_ticket(
        &self,
        credentials: &[Credential],
    ) -> Result<Arc<GrantingTicket>> {
        let authentication = self.authentication_manager.authenticate(credentials).await?;
        let tgt = GrantingTicket::new(
            self.id_generator.new_ticket_id(TicketKind::TicketGranting),
            authentication,
            self.config.expiration.ticket_granting_policy(),
        );
        self.registry.add_ticket(Arc::clone(&tgt).into())?;
        info!(
            "Granted ticket [{}] for user [{}]",
            tgt.id(),
            tgt.authentication().principal()
        );
        Ok(tgt)
    }

    /// Issue a service ticket from a ticket-granting ticket
    pub async fn grant_service_ticket(
        &self,
        tgt_id: &str,
        service: Service,
        credentials_provided: bool,
    ) -> Result<Arc<ServiceTicket>> {
        let tgt = self.live_granting_ticket(tgt_id, TicketKind::TicketGranting)?;
        self.issue(
            &tgt,
            service,
            self.config.expiration.service_ticket_policy(),
            credentials_provided,
        )
    }

    /// Issue a proxy ticket from a proxy-granting ticket
    pub async fn grant_proxy_ticket(
        &self,
        pgt_id: &str,
        service: Service,
    ) -> Result<Arc<ServiceTicket>> {
        let pgt = self.live_granting_ticket(pgt_id, TicketKind::ProxyGranting)?;
        self.issue(&pgt, service, self.config.expiration.proxy_ticket_policy(), false)
    }

    fn issue(
        &self,
        granting: &Arc<GrantingTicket>,
        service: Service,
        policy: ExpirationPolicy,
        credentials_provided: bool,
    ) -> Result<Arc<ServiceTicket>> {
        let id = self.id_generator.new_ticket_id(granting.issued_kind());
        let issued = granting.grant_service_ticket(id, service, policy, credentials_provided);
        self.register_child(granting, Arc::clone(&issued).into())?;

        info!(
            "Granted ticket [{}] for service [{}] for user [{}]",
            issued.id(),
            issued.service(),
            granting.authentication().principal()
        );
        Ok(issued)
    }

    /// Register a ticket issued by `granting`
    ///
    /// A concurrent destroy may sweep the parent between issue and add; the
    /// child is then removed again so it never outlives its parent.
    fn register_child(&self, granting: &GrantingTicket, child: Ticket) -> Result<()> {
        self.registry.add_ticket(child.clone())?;
        if self.registry.get_ticket(granting.id()).is_none() {
            self.registry.delete_ticket(child.id());
            warn!(
                "Granting ticket [{}] was destroyed while issuing [{}]",
                granting.id(),
                child.id()
            );
            return Err(SsoError::InvalidTicket(granting.id().to_string()));
        }
        Ok(())
    }

    /// Validate a service or proxy ticket presented by `service`
    ///
    /// Every validation counts as a use. The ticket is removed once it is
    /// expired after that use, or as soon as it is presented by the wrong
    /// service.
    pub async fn validate_service_ticket(
        &self,
        ticket_id: &str,
        service: &Service,
    ) -> Result<Assertion> {
        let ticket = self.service_ticket(ticket_id)?;
        let result = self.validate(&ticket, service);
        if ticket.is_expired() && self.registry.delete_ticket(ticket.id()) {
            debug!("Removed consumed ticket [{}]", ticket.id());
        }
        result
    }

    fn validate(&self, ticket: &Arc<ServiceTicket>, service: &Service) -> Result<Assertion> {
        let matched = match ticket.consume_for(service) {
            Ok(matched) => matched,
            Err(TicketError::Expired(id)) => {
                info!("Service ticket [{}] has expired.", id);
                return Err(SsoError::TicketExpired(id));
            }
            Err(e) => return Err(e.into()),
        };

        if !matched {
            warn!(
                "Service ticket [{}] with service [{}] does not match supplied service [{}]",
                ticket.id(),
                ticket.service(),
                service
            );
            self.registry.delete_ticket(ticket.id());
            return Err(SsoError::UnrecognizedService {
                ticket_id: ticket.id().to_string(),
                presented: service.id().to_string(),
            });
        }

        let chain = ticket
            .granting_ticket()
            .and_then(|granting| granting.chain())
            .ok_or_else(|| SsoError::InvalidTicket(ticket.id().to_string()))?;
        let authentications = chain
            .iter()
            .map(|granting| Arc::clone(granting.authentication()))
            .collect();

        let assertion = Assertion::new(ticket.service().clone(), ticket.is_from_new_login(), authentications)
            .ok_or_else(|| SsoError::InvalidTicket(ticket.id().to_string()))?;
        info!(
            "Validated ticket [{}] for service [{}] of user [{}]",
            ticket.id(),
            service,
            assertion.principal()
        );
        Ok(assertion)
    }

    /// Delegate a proxy-granting ticket to the service of `st_id`
    ///
    /// `credential` is the proxy callback offered by that service; it must
    /// authenticate before the PGT is minted.
    pub async fn delegate_ticket_granting_ticket(
        &self,
        st_id: &str,
        credential: Credential,
    ) -> Result<Arc<GrantingTicket>> {
        let ticket = self.service_ticket(st_id)?;
        if ticket.is_expired() {
            self.registry.delete_ticket(ticket.id());
            info!("Service ticket [{}] has expired.", ticket.id());
            return Err(SsoError::TicketExpired(ticket.id().to_string()));
        }

        let authentication = self
            .authentication_manager
            .authenticate(std::slice::from_ref(&credential))
            .await?;
        let pgt = ticket.grant_proxy_granting_ticket(
            self.id_generator.new_ticket_id(TicketKind::ProxyGranting),
            authentication,
            self.config.expiration.ticket_granting_policy(),
        )?;
        let parent = pgt
            .parent()
            .ok_or_else(|| SsoError::InvalidTicket(ticket.id().to_string()))?;
        self.register_child(&parent, Arc::clone(&pgt).into())?;
        info!(
            "Granted proxy-granting ticket [{}] to [{}] through [{}]",
            pgt.id(),
            credential.id(),
            ticket.id()
        );
        Ok(pgt)
    }

    /// End a session
    ///
    /// Unknown ids are not an error and yield no logout requests.
    pub async fn destroy_ticket_granting_ticket(&self, tgt_id: &str) -> Result<Vec<LogoutRequest>> {
        let Some(ticket) = self.registry.get_ticket(tgt_id) else {
            debug!("Ticket [{}] not found, nothing to destroy", tgt_id);
            return Ok(Vec::new());
        };
        let granting = ticket
            .as_granting()
            .ok_or_else(|| SsoError::InvalidTicket(tgt_id.to_string()))?;
        Ok(self.destroy(granting).await)
    }

    async fn destroy(&self, granting: &Arc<GrantingTicket>) -> Vec<LogoutRequest> {
        debug!("Removing ticket [{}] from registry...", granting.id());
        granting.mark_expired();

        let requests = match tokio::time::timeout(
            self.config.logout_timeout,
            self.logout_manager.perform_logout(granting),
        )
        .await
        {
            Ok(Ok(requests)) => requests,
            Ok(Err(e)) => {
                warn!("Single logout for [{}] failed: {}", granting.id(), e);
                Vec::new()
            }
            Err(_) => {
                warn!(
                    "Single logout for [{}] timed out after {:?}",
                    granting.id(),
                    self.config.logout_timeout
                );
                Vec::new()
            }
        };

        self.registry.delete_ticket(granting.id());
        requests
    }

    /// Destroy every live session of a principal
    ///
    /// Principal ids are compared case-insensitively. Proxy-granting
    /// tickets go with their TGT. Returns the number of sessions destroyed.
    pub async fn destroy_sessions_for_principal(&self, principal_id: &str) -> usize {
        let wanted = principal_id.to_lowercase();
        let sessions: Vec<Arc<GrantingTicket>> = self
            .get_tickets(|ticket| ticket.kind() == TicketKind::TicketGranting && !ticket.is_expired())
            .into_iter()
            .filter_map(|ticket| ticket.as_granting().cloned())
            .filter(|tgt| tgt.authentication().principal().id().to_lowercase() == wanted)
            .collect();

        for tgt in &sessions {
            self.destroy(tgt).await;
        }
        info!("Destroyed {} session(s) of [{}]", sessions.len(), principal_id);
        sessions.len()
    }

    /// Snapshot of the registered tickets accepted by `predicate`
    pub fn get_tickets<F>(&self, predicate: F) -> Vec<Ticket>
    where
        F: Fn(&Ticket) -> bool,
    {
        self.registry
            .tickets()
            .into_iter()
            .filter(|ticket| predicate(ticket))
            .collect()
    }

    fn service_ticket(&self, ticket_id: &str) -> Result<Arc<ServiceTicket>> {
        self.registry
            .get_ticket(ticket_id)
            .and_then(|ticket| ticket.as_service().cloned())
            .ok_or_else(|| {
                debug!("Service ticket [{}] does not exist.", ticket_id);
                SsoError::InvalidTicket(ticket_id.to_string())
            })
    }

    /// Look up a granting ticket of `kind`, removing it if it has expired
    fn live_granting_ticket(&self, ticket_id: &str, kind: TicketKind) -> Result<Arc<GrantingTicket>> {
        let granting = self
            .registry
            .get_ticket(ticket_id)
            .filter(|ticket| ticket.kind() == kind)
            .and_then(|ticket| ticket.as_granting().cloned())
            .ok_or_else(|| {
                debug!("Ticket [{}] of kind {} does not exist.", ticket_id, kind);
                SsoError::InvalidTicket(ticket_id.to_string())
            })?;

        if granting.is_expired() {
            self.registry.delete_ticket(ticket_id);
            info!("Ticket [{}] has expired.", ticket_id);
            return Err(SsoError::TicketExpired(ticket_id.to_string()));
        }
        Ok(granting)
    }
}
