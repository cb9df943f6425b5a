//! Terminal output: startup banner, config listing, forward table

use console::style;

use crate::config::{Config, ForwardMode, ForwardSpec};

/// Startup banner.
pub fn print_banner(version: &str) {
    println!(
        "{} {}",
        style("kpulse").green().bold(),
        style(version).dim()
    );
    println!();
}

/// Output for `--list`: every profile and service the config declares.
pub fn print_list(config: &Config) {
    println!("Profiles:");
    for profile in &config.profiles {
        println!("  - {}", profile.name);
    }
    println!("Services:");
    for service in &config.services {
        println!(
            "  - {} ({}:{})",
            service.alias(),
            service.lport,
            service.remote_port()
        );
    }
}

/// One line per forward about to be supervised.
pub fn print_forwards(specs: &[ForwardSpec]) {
    for spec in specs {
        let mode = match spec.mode {
            ForwardMode::Http => "http",
            ForwardMode::Raw => "raw",
        };
        println!(
            "  {} {} 127.0.0.1:{} -> {}/{}:{} [{}]",
            style(&spec.alias).cyan().bold(),
            style("forwarding").dim(),
            spec.local_port,
            spec.namespace,
            spec.service,
            spec.remote_port,
            mode
        );
    }
    println!();
}
