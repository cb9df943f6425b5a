//! Main execution logic
//!
//! Parses the selected mode, resolves the forward specs, connects the
//! cluster collaborators, and runs the supervisor until shutdown.

use std::sync::Arc;

use clap::CommandFactory;
use tracing::error;

use crate::cli::{self, Args};
use crate::config::{Config, ForwardSpec};
use crate::errors::Result;
use crate::kube::{kubeconfig, ApiDirectory, WsTunnelTransport};
use crate::output;
use crate::signals;
use crate::status::ExitStatus;
use crate::supervisor::ForwardSupervisor;

/// Entry point called from `main` with parsed arguments.
pub async fn run(args: Args) -> ExitStatus {
    init_tracing(args.verbose);
    output::print_banner(env!("CARGO_PKG_VERSION"));

    match execute(args).await {
        Ok(status) => status,
        Err(e) => {
            error!("{}", e);
            ExitStatus::Error
        }
    }
}

async fn execute(args: Args) -> Result<ExitStatus> {
    // An explicitly passed config file must exist; the default path is
    // allowed to be absent (the -f mode needs no config at all).
    let config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::load_or_default(&Config::default_path())?,
    };

    if args.list {
        output::print_list(&config);
        return Ok(ExitStatus::Success);
    }

    if !args.wants_forwarding() {
        Args::command().print_help().ok();
        return Ok(ExitStatus::Success);
    }

    let specs = resolve_specs(&args, &config)?;

    let kubeconfig_path = args
        .kubeconfig
        .clone()
        .unwrap_or_else(kubeconfig::default_path);
    let auth = kubeconfig::load(&kubeconfig_path)?;
    let directory = Arc::new(ApiDirectory::new(&auth)?);
    let transport = Arc::new(WsTunnelTransport::new(auth));

    output::print_forwards(&specs);

    let cancel = signals::shutdown_token();
    let supervisor = ForwardSupervisor::start(specs, directory, transport, cancel.clone());

    // Runs until Ctrl+C cancels the token; every supervisor task observes
    // the same token and releases its session before exiting.
    cancel.cancelled().await;
    supervisor.wait().await;

    println!("\nBye");
    Ok(ExitStatus::Interrupted)
}

fn resolve_specs(args: &Args, config: &Config) -> Result<Vec<ForwardSpec>> {
    let namespace = args.namespace.as_deref();

    if let Some(profile) = args.selected_profile() {
        config.resolve_profile(profile, namespace)
    } else if !args.services.is_empty() {
        let selections = cli::parse_port_overrides(&args.services)?;
        config.resolve_services(&selections, namespace)
    } else {
        let selections = cli::parse_port_overrides(&args.forwards)?;
        Config::resolve_forwards(&selections, namespace)
    }
}

fn init_tracing(verbose: u8) {
    let default_filter = if verbose > 0 { "kpulse=debug" } else { "kpulse=info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .ok();
}
