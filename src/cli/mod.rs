//! CLI argument parsing and processing

pub mod args;

pub use args::Args;

use crate::config::PortOverride;
use crate::errors::{KpulseError, Result};

/// Parse one `name[:lport][:rport]` selection from the command line.
pub fn parse_port_override(arg: &str) -> Result<PortOverride> {
    let mut parts = arg.split(':');

    let name = parts.next().unwrap_or_default();
    let valid_name = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if !valid_name {
        return Err(KpulseError::Argument(format!(
            "invalid service format: '{}'",
            arg
        )));
    }

    let local_port = parts.next().map(|p| parse_port(arg, p)).transpose()?;
    let remote_port = parts.next().map(|p| parse_port(arg, p)).transpose()?;
    if parts.next().is_some() {
        return Err(KpulseError::Argument(format!(
            "invalid service format: '{}'",
            arg
        )));
    }

    Ok(PortOverride {
        name: name.to_string(),
        local_port,
        remote_port,
    })
}

/// Parse every selection, failing on the first bad one.
pub fn parse_port_overrides(args: &[String]) -> Result<Vec<PortOverride>> {
    args.iter().map(|arg| parse_port_override(arg)).collect()
}

fn parse_port(arg: &str, part: &str) -> Result<u16> {
    part.parse::<u16>()
        .ok()
        .filter(|&p| p != 0)
        .ok_or_else(|| KpulseError::Argument(format!("invalid port in '{}'", arg)))
}
