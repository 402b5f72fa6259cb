//! SSO ticket server daemon
//!
//! Loads sso.conf, decrypts `ENC(..)` secrets with the configured key, and
//! wires the registry, authentication handlers and cleaner together.

use anyhow::{anyhow, Context, Result};
use authn::{
    AuthenticationExceptionHandler, AuthenticationManager, HttpBasedServiceCredentialsHandler,
    LoggingEventPublisher, OutcomeOptions, SerialRevocationChecker,
    X509CredentialsAuthenticationHandler, X509Options,
};
use clap::{Parser, Subcommand};
use registry::{
    CleanerConfig, DefaultTicketRegistry, LoggingLogoutManager, RegistryOptions, StaticEligibility,
    TicketRegistry, TicketRegistryCleaner,
};
use sso::{CentralAuthenticationService, ServiceConfig};
use ssoconfig::{AesKeyManager, KeyManager, SsoConfig};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use ticket::ExpirationOptions;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

const REGISTRY_SECTIONS: &[&str] = &["registry", "global"];
const TICKET_SECTIONS: &[&str] = &["ticket", "global"];
const X509_SECTIONS: &[&str] = &["x509", "global"];
const AUTHENTICATION_SECTIONS: &[&str] = &["authentication", "global"];

#[derive(Parser)]
#[command(name = "ssod")]
#[command(about = "SSO ticket server", long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short = 'c', long, env = "SSO_CONF", default_value = "/etc/sso/sso.conf")]
    conf: PathBuf,

    /// File holding the base64 configuration key
    #[arg(long)]
    key_file: Option<PathBuf>,

    /// Base64 configuration key (used when no key file is given)
    #[arg(long, env = "SSO_KEY", hide_env_values = true)]
    key: Option<String>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run until interrupted
    Run,
    /// Load and validate the configuration, then print a summary
    CheckConfig,
    /// Print the ENC(..) form of a value for sso.conf
    Encrypt {
        /// Plaintext value
        value: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.debug { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let key_manager = load_key_manager(cli.key_file.as_deref(), cli.key.as_deref())?;

    match cli.command {
        Commands::Encrypt { value } => {
            let key_manager =
                key_manager.ok_or_else(|| anyhow!("No key given. Use --key-file or SSO_KEY"))?;
            let sealed = key_manager
                .encrypt(&value)
                .context("Failed to encrypt value")?;
            println!("ENC({})", sealed);
        }
        Commands::CheckConfig => {
            let config = load_config(&cli.conf, key_manager.as_ref())?;
            for line in check_config(&config)? {
                println!("{}", line);
            }
        }
        Commands::Run => {
            let config = load_config(&cli.conf, key_manager.as_ref())?;
            run(&config).await?;
        }
    }

    Ok(())
}

/// Key file wins over the inline key; neither is fine until a secret is needed
fn load_key_manager(key_file: Option<&Path>, key: Option<&str>) -> Result<Option<AesKeyManager>> {
    let encoded = match (key_file, key) {
        (Some(path), _) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read key file: {}", path.display()))?,
        (None, Some(key)) => key.to_string(),
        (None, None) => return Ok(None),
    };
    let key_manager = AesKeyManager::from_base64(&encoded).context("Invalid configuration key")?;
    Ok(Some(key_manager))
}

fn load_config(path: &Path, key_manager: Option<&AesKeyManager>) -> Result<SsoConfig> {
    debug!("Loading configuration from: {}", path.display());
    let mut config = SsoConfig::from_file(path)
        .with_context(|| format!("Failed to load {}", path.display()))?;

    if config.has_encrypted_values() {
        let key_manager = key_manager.ok_or_else(|| {
            anyhow!("Configuration holds encrypted values but no key was given")
        })?;
        let count = config
            .decrypt_with(key_manager)
            .context("Failed to decrypt configuration")?;
        debug!("Decrypted {} configuration value(s)", count);
    }
    Ok(config)
}

fn build_authentication(config: &SsoConfig) -> Result<(AuthenticationManager, AuthenticationExceptionHandler)> {
    let x509_options = X509Options::try_from_config(config, X509_SECTIONS)?;
    let mut x509 = X509CredentialsAuthenticationHandler::new(&x509_options)
        .context("Invalid [x509] configuration")?;
    if let Some(checker) = load_revocation_list(&x509_options)? {
        x509 = x509.with_revocation_checker(Arc::new(checker));
    }
    let manager = AuthenticationManager::new(vec![
        Arc::new(x509),
        Arc::new(HttpBasedServiceCredentialsHandler::new()),
    ]);

    let outcome_options = OutcomeOptions::try_from_config(config, AUTHENTICATION_SECTIONS)?;
    let exception_handler =
        AuthenticationExceptionHandler::from_options(&outcome_options, Arc::new(LoggingEventPublisher))
            .context("Invalid [authentication] configuration")?;
    Ok((manager, exception_handler))
}

fn load_revocation_list(options: &X509Options) -> Result<Option<SerialRevocationChecker>> {
    if options.revocation_list.is_empty() {
        return Ok(None);
    }
    let path = Path::new(&options.revocation_list);
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read revocation list: {}", path.display()))?;
    let checker = SerialRevocationChecker::from_list(&content)
        .with_context(|| format!("Invalid revocation list: {}", path.display()))?;
    info!("Loaded {} revoked certificate(s) from {}", checker.len(), path.display());
    Ok(Some(checker))
}

/// Validate every option section and describe the result
fn check_config(config: &SsoConfig) -> Result<Vec<String>> {
    let registry = RegistryOptions::try_from_config(config, REGISTRY_SECTIONS)?;
    let expiration = ExpirationOptions::try_from_config(config, TICKET_SECTIONS)?;
    let (_, exception_handler) = build_authentication(config)?;
    let x509 = X509Options::try_from_config(config, X509_SECTIONS)?;

    Ok(vec![
        format!(
            "registry: capacity {}, {} shards",
            registry.capacity(),
            registry.shard_amount()
        ),
        format!(
            "cleaner: {} (start delay {:?}, every {:?})",
            if registry.cleaner_enabled { "enabled" } else { "disabled" },
            registry.cleaner_start_delay.0,
            registry.cleaner_repeat_interval.0
        ),
        format!("tgt: {:?}", expiration.ticket_granting_policy()),
        format!("st: {:?}", expiration.service_ticket_policy()),
        format!("x509: trusted issuer {}", x509.trusted_issuer_dn_pattern),
        format!(
            "revocation: {}",
            if x509.revocation_list.is_empty() { "none" } else { x509.revocation_list.as_str() }
        ),
        format!(
            "authentication: {} known failure kind(s)",
            exception_handler.errors().len()
        ),
    ])
}

async fn run(config: &SsoConfig) -> Result<()> {
    let registry_options = RegistryOptions::try_from_config(config, REGISTRY_SECTIONS)?;
    let registry: Arc<dyn TicketRegistry> =
        Arc::new(DefaultTicketRegistry::with_options(&registry_options));
    let logout_manager = Arc::new(LoggingLogoutManager);

    let (manager, exception_handler) = build_authentication(config)?;
    let cas = CentralAuthenticationService::new(
        ServiceConfig::from_config(config),
        Arc::clone(&registry),
        manager,
        exception_handler,
        logout_manager.clone(),
    );

    let cleaner = Arc::new(TicketRegistryCleaner::new(
        Arc::clone(&registry),
        logout_manager,
        Arc::new(StaticEligibility(registry_options.cleaner_enabled)),
        CleanerConfig::from(&registry_options),
    ));
    let cleaner_handle = match cleaner.schedule() {
        Ok(handle) => handle,
        Err(e) => {
            warn!("Ticket registry cleaner not started: {}", e);
            None
        }
    };

    info!("ssod ready");
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;

    if let Some(handle) = cleaner_handle {
        handle.shutdown();
    }
    info!(
        "Shutting down with {} session(s) in the registry",
        cas.registry().session_count()
    );
    Ok(())
}
