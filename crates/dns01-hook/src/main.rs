// # dns01-hook - DNS-01 Challenge Hook
//
// Thin host adapter around `dns01-core`:
//
// 1. Read the hook environment and the zone configuration file
// 2. Authenticate against Azure Resource Manager
// 3. Run `perform` or `cleanup` for one domain
// 4. Map the outcome to an exit code
//
// No record or propagation logic lives here.
//
// ## Configuration
//
// ### Hook
// - `DNS01_CONFIG`: Path of the zone and credential configuration file (required)
// - `CERTBOT_DOMAIN`: Domain being validated (required)
// - `CERTBOT_VALIDATION`: Challenge value (required)
//
// ### Runtime
// - `DNS01_STATE_PATH`: Pending-record file shared by perform and cleanup
//   (default `/var/lib/dns01/pending.json`)
// - `DNS01_LOG_LEVEL`: trace, debug, info, warn or error (default info)
// - `DNS01_MODE`: `dry-run` writes to an in-memory zone and skips propagation
//
// ## Example
//
// ```bash
// export DNS01_CONFIG=/etc/letsencrypt/azure.ini
// certbot certonly --manual --preferred-challenges dns \
//     --manual-auth-hook 'dns01-hook perform' \
//     --manual-cleanup-hook 'dns01-hook cleanup' \
//     -d example.com -d '*.example.com'
// ```

use anyhow::{Context, Result};
use dns01_core::{
    ChallengeEvent, ChallengeOrchestrator, ChallengeRequest, Dns01Config, Error,
    FilePendingStore, MemoryPendingStore, MemoryRecordApi, PendingStore, RecordSetApi,
};
use dns01_provider_azure::authenticate;
use dns01_resolver_hickory::HickoryTxtResolver;
use std::env;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{Level, debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

/// Default location of the pending-record file
const DEFAULT_STATE_PATH: &str = "/var/lib/dns01/pending.json";

/// Exit codes reported to the ACME client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HookExitCode {
    /// Challenge published and visible, or cleanup finished
    Success = 0,
    /// Bad environment or configuration file
    ConfigError = 1,
    /// Perform failed at run time
    RuntimeError = 2,
}

impl From<HookExitCode> for ExitCode {
    fn from(code: HookExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// Hook action
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    Perform,
    Cleanup,
}

impl Action {
    fn parse(arg: Option<&str>) -> Result<Self> {
        match arg {
            Some("perform") | Some("auth") => Ok(Action::Perform),
            Some("cleanup") => Ok(Action::Cleanup),
            Some(other) => anyhow::bail!(
                "Unknown action '{}'. Usage: dns01-hook perform|cleanup",
                other
            ),
            None => anyhow::bail!("Missing action. Usage: dns01-hook perform|cleanup"),
        }
    }
}

/// Hook environment
#[derive(Debug)]
struct HookEnv {
    config_path: PathBuf,
    domain: String,
    validation: String,
    state_path: PathBuf,
    log_level: String,
    dry_run: bool,
}

impl HookEnv {
    /// Load the hook environment
    fn from_env() -> Result<Self> {
        Ok(Self {
            config_path: required("DNS01_CONFIG")?.into(),
            domain: required("CERTBOT_DOMAIN")?,
            validation: required("CERTBOT_VALIDATION")?,
            state_path: env::var("DNS01_STATE_PATH")
                .ok()
                .filter(|p| !p.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_STATE_PATH.to_string())
                .into(),
            log_level: env::var("DNS01_LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            dry_run: match env::var("DNS01_MODE") {
                Ok(mode) if mode.eq_ignore_ascii_case("dry-run") => true,
                Ok(mode) if mode.trim().is_empty() || mode.eq_ignore_ascii_case("live") => false,
                Ok(mode) => anyhow::bail!(
                    "DNS01_MODE '{}' is not valid. Valid modes: live, dry-run",
                    mode
                ),
                Err(_) => false,
            },
        })
    }

    fn log_level(&self) -> Result<Level> {
        match self.log_level.to_lowercase().as_str() {
            "trace" => Ok(Level::TRACE),
            "debug" => Ok(Level::DEBUG),
            "info" => Ok(Level::INFO),
            "warn" => Ok(Level::WARN),
            "error" => Ok(Level::ERROR),
            _ => anyhow::bail!(
                "DNS01_LOG_LEVEL '{}' is not valid. \
                Valid levels: trace, debug, info, warn, error",
                self.log_level
            ),
        }
    }
}

fn required(name: &str) -> Result<String> {
    env::var(name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .with_context(|| format!("{} is required", name))
}

/// Warn when the configuration file is readable by group or others
#[cfg(unix)]
fn check_config_permissions(path: &std::path::Path) {
    use std::os::unix::fs::PermissionsExt;

    if let Ok(metadata) = std::fs::metadata(path) {
        let mode = metadata.permissions().mode();
        if mode & 0o077 != 0 {
            warn!(
                path = %path.display(),
                mode = %format!("{:o}", mode & 0o777),
                "Configuration file holds credentials and is accessible to other users; chmod 600 recommended"
            );
        }
    }
}

#[cfg(not(unix))]
fn check_config_permissions(_path: &std::path::Path) {}

fn main() -> ExitCode {
    let action = match Action::parse(env::args().nth(1).as_deref()) {
        Ok(action) => action,
        Err(e) => {
            eprintln!("{}", e);
            return HookExitCode::ConfigError.into();
        }
    };

    let hook_env = match HookEnv::from_env() {
        Ok(hook_env) => hook_env,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return HookExitCode::ConfigError.into();
        }
    };

    let log_level = match hook_env.log_level() {
        Ok(level) => level,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return HookExitCode::ConfigError.into();
        }
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return HookExitCode::ConfigError.into();
    }

    check_config_permissions(&hook_env.config_path);
    let config = match Dns01Config::from_file(&hook_env.config_path) {
        Ok(config) => config,
        Err(e) => {
            error!(path = %hook_env.config_path.display(), "{}", e);
            return HookExitCode::ConfigError.into();
        }
    };

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return HookExitCode::RuntimeError.into();
        }
    };

    rt.block_on(run(action, hook_env, config)).into()
}

/// Run one hook invocation
async fn run(action: Action, hook_env: HookEnv, config: Dns01Config) -> HookExitCode {
    let cancel = CancellationToken::new();
    tokio::spawn(cancel_on_signal(cancel.clone()));

    let request = ChallengeRequest::new(&hook_env.domain, &hook_env.validation);
    info!(
        domain = %request.domain,
        action = ?action,
        dry_run = hook_env.dry_run,
        zones = config.zones.len(),
        "dns01-hook starting"
    );

    let orchestrator = match build_orchestrator(&hook_env, &config).await {
        Ok(orchestrator) => orchestrator,
        Err(e) => return startup_failure(action, e),
    };

    match action {
        Action::Perform => perform(&orchestrator, request, &cancel).await,
        Action::Cleanup => cleanup(&orchestrator, request).await,
    }
}

/// Map a failure before any record was touched to an exit code
fn startup_failure(action: Action, e: anyhow::Error) -> HookExitCode {
    let is_config = matches!(e.downcast_ref::<Error>(), Some(Error::Config(_)));
    match (action, is_config) {
        (_, true) => {
            error!("Configuration error: {:#}", e);
            HookExitCode::ConfigError
        }
        (Action::Perform, false) => {
            error!("Startup failed: {:#}", e);
            HookExitCode::RuntimeError
        }
        (Action::Cleanup, false) => {
            // The certificate run must not fail because of leftover records
            error!("Cleanup skipped: {:#}", e);
            HookExitCode::Success
        }
    }
}

/// Open the pending store; a dry run never touches the state file
async fn open_store(hook_env: &HookEnv) -> Result<Arc<dyn PendingStore>> {
    if hook_env.dry_run {
        return Ok(Arc::new(MemoryPendingStore::new()));
    }
    let store = FilePendingStore::new(&hook_env.state_path)
        .await
        .with_context(|| format!("Opening pending store {}", hook_env.state_path.display()))?;
    Ok(Arc::new(store))
}

/// Wire configuration, credentials and stores into an orchestrator
async fn build_orchestrator(hook_env: &HookEnv, config: &Dns01Config) -> Result<ChallengeOrchestrator> {
    let store = open_store(hook_env).await?;

    let resolver = Arc::new(HickoryTxtResolver::new(&config.propagation.nameservers));

    let (orchestrator, events) = if hook_env.dry_run {
        warn!("Dry run: records are written to an in-memory zone only");
        let api: Arc<dyn RecordSetApi> = Arc::new(MemoryRecordApi::new());
        let (orchestrator, events) = ChallengeOrchestrator::new(config, api, resolver, store)?;
        (orchestrator.without_propagation(), events)
    } else {
        let client = authenticate(&config.credential, config.environment).await?;
        let api: Arc<dyn RecordSetApi> = Arc::new(client);
        ChallengeOrchestrator::new(config, api, resolver, store)?
    };

    tokio::spawn(log_events(events, hook_env.dry_run));
    Ok(orchestrator)
}

async fn perform(
    orchestrator: &ChallengeOrchestrator,
    request: ChallengeRequest,
    cancel: &CancellationToken,
) -> HookExitCode {
    let report = match orchestrator.perform(&[request], cancel).await {
        Ok(report) => report,
        Err(e) => {
            error!("Perform aborted: {}", e);
            return match e {
                Error::Config(_) => HookExitCode::ConfigError,
                _ => HookExitCode::RuntimeError,
            };
        }
    };

    if report.is_success() {
        info!("Challenge published");
        return HookExitCode::Success;
    }

    for outcome in report.failures() {
        if let Some(e) = &outcome.error {
            error!(domain = %outcome.request.domain, "Challenge failed: {}", e);
        }
    }
    match report.fatal_error() {
        Some(Error::Config(_)) => HookExitCode::ConfigError,
        _ => HookExitCode::RuntimeError,
    }
}

async fn cleanup(orchestrator: &ChallengeOrchestrator, request: ChallengeRequest) -> HookExitCode {
    let report = orchestrator.cleanup(&[request]).await;
    for failure in &report.failures {
        error!(domain = %failure.domain, "Cleanup failed, record left in place: {}", failure.error);
    }
    if report.is_clean() {
        info!("Challenge cleaned up");
    }
    HookExitCode::Success
}

/// Log orchestrator events until the orchestrator is dropped
async fn log_events(mut events: mpsc::Receiver<ChallengeEvent>, dry_run: bool) {
    while let Some(event) = events.recv().await {
        match event {
            ChallengeEvent::RecordWritten {
                domain,
                record_name,
                created_new,
            } if dry_run => info!(
                domain = %domain,
                record = %record_name,
                created_new,
                "Dry run: would write TXT value"
            ),
            event => debug!(?event, "Challenge event"),
        }
    }
}

/// Cancel `token` on SIGTERM or SIGINT
#[cfg(unix)]
async fn cancel_on_signal(token: CancellationToken) {
    let (mut sigterm, mut sigint) = match (
        signal(SignalKind::terminate()),
        signal(SignalKind::interrupt()),
    ) {
        (Ok(sigterm), Ok(sigint)) => (sigterm, sigint),
        (Err(e), _) | (_, Err(e)) => {
            warn!("Failed to install signal handlers: {}", e);
            return;
        }
    };

    let name = tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    };
    warn!("Received {}, cancelling", name);
    token.cancel();
}

/// Cancel `token` on CTRL-C
#[cfg(not(unix))]
async fn cancel_on_signal(token: CancellationToken) {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            warn!("Received CTRL-C, cancelling");
            token.cancel();
        }
        Err(e) => warn!("Failed to wait for CTRL-C: {}", e),
    }
}
