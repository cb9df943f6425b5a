//! CLI argument definitions using clap

use clap::{ArgAction, Parser};
use std::path::PathBuf;

/// Forward Kubernetes services to local ports.
#[derive(Parser, Debug, Default)]
#[command(
    name = "kpulse",
    version,
    about = "Forward Kubernetes services to local ports",
    after_help = "Run with a profile name, -s aliases, or -f raw forwards; \
                  Ctrl+C stops all forwards."
)]
pub struct Args {
    /// Forward all services of the selected profile
    #[arg(value_name = "PROFILE")]
    pub profile_arg: Option<String>,

    /// Forward all services of the selected profile (same as the positional)
    #[arg(short = 'p', long = "profile", value_name = "PROFILE")]
    pub profile: Option<String>,

    /// Forward services from the config list; ports override the defaults
    #[arg(short = 's', long = "service", value_name = "ALIAS[:LPORT][:RPORT]")]
    pub services: Vec<String>,

    /// Forward arbitrary cluster services without a config entry
    #[arg(short = 'f', long = "forward", value_name = "NAME:LPORT[:RPORT]")]
    pub forwards: Vec<String>,

    /// List all profiles and services from the config
    #[arg(short = 'l', long)]
    pub list: bool,

    /// Kubernetes namespace; wins over the profile's own
    #[arg(short = 'n', long, value_name = "NAMESPACE")]
    pub namespace: Option<String>,

    /// Config file (default: ~/.config/kpulse.yaml)
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Kubeconfig file (default: ~/.kube/config)
    #[arg(long, value_name = "FILE", env = "KUBECONFIG")]
    pub kubeconfig: Option<PathBuf>,

    /// Increase log verbosity
    #[arg(short = 'v', long, action = ArgAction::Count)]
    pub verbose: u8,
}

impl Args {
    /// The profile selected via flag or positional, flag winning.
    pub fn selected_profile(&self) -> Option<&str> {
        self.profile.as_deref().or(self.profile_arg.as_deref())
    }

    /// Whether any forwarding mode was requested.
    pub fn wants_forwarding(&self) -> bool {
        self.selected_profile().is_some() || !self.services.is_empty() || !self.forwards.is_empty()
    }
}
