//! Config file handling
//!
//! The config declares known services and named profiles of service
//! overlays. Resolution applies the alias/default-port rules and produces
//! the uniform [`ForwardSpec`] sequence the supervisor consumes, regardless
//! of which CLI mode selected the forwards.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::errors::{KpulseError, Result};

/// Namespace used when neither the CLI nor the profile names one.
pub const DEFAULT_NAMESPACE: &str = "dev";

/// How a forward carries traffic: the HTTP bridge exchange, or a raw
/// byte relay with one tunnel stream per local connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ForwardMode {
    #[default]
    Http,
    Raw,
}

/// One fully resolved forward. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardSpec {
    /// Display name; defaults to the service name.
    pub alias: String,
    /// Kubernetes service name.
    pub service: String,
    pub namespace: String,
    pub local_port: u16,
    pub remote_port: u16,
    pub mode: ForwardMode,
}

/// A `name[:lport][:rport]` selection from the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortOverride {
    pub name: String,
    pub local_port: Option<u16>,
    pub remote_port: Option<u16>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub profiles: Vec<Profile>,
    #[serde(default)]
    pub services: Vec<ServiceEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Profile {
    pub name: String,
    #[serde(default)]
    pub namespace: Option<String>,
    pub services: Vec<ServiceOverlay>,
}

/// Reference to a service entry, optionally overriding its ports.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceOverlay {
    #[serde(rename = "ref")]
    pub service_ref: String,
    #[serde(default)]
    pub lport: Option<u16>,
    #[serde(default)]
    pub rport: Option<u16>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceEntry {
    pub name: String,
    #[serde(default)]
    pub alias: Option<String>,
    pub lport: u16,
    #[serde(default)]
    pub rport: Option<u16>,
    #[serde(default)]
    pub mode: ForwardMode,
}

impl ServiceEntry {
    /// Alias defaults to the service name.
    pub fn alias(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }

    /// Remote port defaults to the local port.
    pub fn remote_port(&self) -> u16 {
        self.rport.unwrap_or(self.lport)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            profiles: Vec::new(),
            services: Vec::new(),
        }
    }
}

impl Config {
    /// Default config location: `~/.config/kpulse.yaml`.
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".config")
            .join("kpulse.yaml")
    }

    /// Load and validate a config file.
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)
            .map_err(|e| KpulseError::Config(format!("cannot read {}: {}", path.display(), e)))?;
        Self::parse(&data)
    }

    /// Load a config file, falling back to an empty config when absent.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load(path)
    }

    pub fn parse(data: &str) -> Result<Self> {
        let config: Config =
            serde_yaml::from_str(data).map_err(|e| KpulseError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        for service in &self.services {
            if service.lport == 0 || service.remote_port() == 0 {
                return Err(KpulseError::Config(format!(
                    "service '{}': ports must be in 1..65535",
                    service.alias()
                )));
            }
        }

        let known = self.service_map();
        for profile in &self.profiles {
            for overlay in &profile.services {
                if !known.contains_key(overlay.service_ref.as_str()) {
                    return Err(KpulseError::Config(format!(
                        "profile '{}': service '{}' not found",
                        profile.name, overlay.service_ref
                    )));
                }
            }
        }

        Ok(())
    }

    fn service_map(&self) -> HashMap<&str, &ServiceEntry> {
        self.services.iter().map(|s| (s.alias(), s)).collect()
    }

    pub fn profile(&self, name: &str) -> Option<&Profile> {
        self.profiles.iter().find(|p| p.name == name)
    }

    /// Resolve every service of a profile into forward specs.
    ///
    /// A namespace passed on the command line wins over the profile's own.
    pub fn resolve_profile(&self, name: &str, namespace: Option<&str>) -> Result<Vec<ForwardSpec>> {
        let profile = self
            .profile(name)
            .ok_or_else(|| KpulseError::Config(format!("unknown profile '{}'", name)))?;

        let namespace = namespace
            .or(profile.namespace.as_deref())
            .unwrap_or(DEFAULT_NAMESPACE);

        let known = self.service_map();
        profile
            .services
            .iter()
            .map(|overlay| {
                let service = known
                    .get(overlay.service_ref.as_str())
                    .ok_or_else(|| {
                        KpulseError::Config(format!(
                            "profile '{}': service '{}' not found",
                            profile.name, overlay.service_ref
                        ))
                    })?;
                build_spec(
                    service,
                    namespace,
                    overlay.lport,
                    overlay.rport,
                )
            })
            .collect()
    }

    /// Resolve `-s alias[:lport][:rport]` selections against the service list.
    pub fn resolve_services(
        &self,
        selections: &[PortOverride],
        namespace: Option<&str>,
    ) -> Result<Vec<ForwardSpec>> {
        let namespace = namespace.unwrap_or(DEFAULT_NAMESPACE);
        let known = self.service_map();

        selections
            .iter()
            .map(|sel| {
                let service = known.get(sel.name.as_str()).ok_or_else(|| {
                    KpulseError::Config(format!("unknown service alias '{}'", sel.name))
                })?;
                build_spec(service, namespace, sel.local_port, sel.remote_port)
            })
            .collect()
    }

    /// Resolve `-f name:lport[:rport]` raw forwards; no config lookup.
    pub fn resolve_forwards(
        selections: &[PortOverride],
        namespace: Option<&str>,
    ) -> Result<Vec<ForwardSpec>> {
        let namespace = namespace.unwrap_or(DEFAULT_NAMESPACE);

        selections
            .iter()
            .map(|sel| {
                let local_port = sel.local_port.ok_or_else(|| {
                    KpulseError::Argument(format!(
                        "forward '{}' must name a local port",
                        sel.name
                    ))
                })?;
                if local_port == 0 {
                    return Err(KpulseError::Argument(format!(
                        "forward '{}': ports must be in 1..65535",
                        sel.name
                    )));
                }
                Ok(ForwardSpec {
                    alias: sel.name.clone(),
                    service: sel.name.clone(),
                    namespace: namespace.to_string(),
                    local_port,
                    remote_port: sel.remote_port.unwrap_or(local_port),
                    mode: ForwardMode::default(),
                })
            })
            .collect()
    }
}

fn build_spec(
    service: &ServiceEntry,
    namespace: &str,
    local_port: Option<u16>,
    remote_port: Option<u16>,
) -> Result<ForwardSpec> {
    let local_port = local_port.unwrap_or(service.lport);
    let remote_port = remote_port.unwrap_or_else(|| service.remote_port());
    if local_port == 0 || remote_port == 0 {
        return Err(KpulseError::Config(format!(
            "service '{}': ports must be in 1..65535",
            service.alias()
        )));
    }

    Ok(ForwardSpec {
        alias: service.alias().to_string(),
        service: service.name.clone(),
        namespace: namespace.to_string(),
        local_port,
        remote_port,
        mode: service.mode,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
profiles:
  - name: backend
    namespace: staging
    services:
      - ref: api
      - ref: billing
        lport: 9100
services:
  - name: api-service
    alias: api
    lport: 8080
    rport: 80
  - name: billing-service
    alias: billing
    lport: 9000
  - name: legacy-db
    lport: 5432
    mode: raw
"#;

    #[test]
    fn test_parse_and_defaults() {
        let config = Config::parse(SAMPLE).unwrap();
        assert_eq!(config.services.len(), 3);

        let billing = &config.services[1];
        assert_eq!(billing.alias(), "billing");
        // Remote port defaults to the local port
        assert_eq!(billing.remote_port(), 9000);

        let db = &config.services[2];
        // Alias defaults to the service name
        assert_eq!(db.alias(), "legacy-db");
        assert_eq!(db.mode, ForwardMode::Raw);
    }

    #[test]
    fn test_resolve_profile() {
        let config = Config::parse(SAMPLE).unwrap();
        let specs = config.resolve_profile("backend", None).unwrap();

        assert_eq!(specs.len(), 2);
        assert_eq!(specs[0].alias, "api");
        assert_eq!(specs[0].service, "api-service");
        assert_eq!(specs[0].namespace, "staging");
        assert_eq!(specs[0].local_port, 8080);
        assert_eq!(specs[0].remote_port, 80);

        // Overlay overrides the local port only
        assert_eq!(specs[1].local_port, 9100);
        assert_eq!(specs[1].remote_port, 9000);
    }

    #[test]
    fn test_cli_namespace_wins_over_profile() {
        let config = Config::parse(SAMPLE).unwrap();
        let specs = config.resolve_profile("backend", Some("prod")).unwrap();
        assert!(specs.iter().all(|s| s.namespace == "prod"));
    }

    #[test]
    fn test_unknown_profile() {
        let config = Config::parse(SAMPLE).unwrap();
        assert!(matches!(
            config.resolve_profile("nope", None),
            Err(KpulseError::Config(_))
        ));
    }

    #[test]
    fn test_resolve_services_with_overrides() {
        let config = Config::parse(SAMPLE).unwrap();
        let specs = config
            .resolve_services(
                &[PortOverride {
                    name: "api".to_string(),
                    local_port: Some(18080),
                    remote_port: None,
                }],
                None,
            )
            .unwrap();

        assert_eq!(specs[0].local_port, 18080);
        assert_eq!(specs[0].remote_port, 80);
        assert_eq!(specs[0].namespace, DEFAULT_NAMESPACE);
    }

    #[test]
    fn test_unknown_service_alias() {
        let config = Config::parse(SAMPLE).unwrap();
        let result = config.resolve_services(
            &[PortOverride {
                name: "ghost".to_string(),
                local_port: None,
                remote_port: None,
            }],
            None,
        );
        assert!(matches!(result, Err(KpulseError::Config(_))));
    }

    #[test]
    fn test_resolve_raw_forwards() {
        let specs = Config::resolve_forwards(
            &[PortOverride {
                name: "metrics".to_string(),
                local_port: Some(9090),
                remote_port: None,
            }],
            Some("monitoring"),
        )
        .unwrap();

        assert_eq!(specs[0].alias, "metrics");
        assert_eq!(specs[0].remote_port, 9090);
        assert_eq!(specs[0].namespace, "monitoring");
    }

    #[test]
    fn test_forward_requires_local_port() {
        let result = Config::resolve_forwards(
            &[PortOverride {
                name: "metrics".to_string(),
                local_port: None,
                remote_port: None,
            }],
            None,
        );
        assert!(matches!(result, Err(KpulseError::Argument(_))));
    }

    #[test]
    fn test_unresolvable_overlay_ref_fails_validation() {
        let bad = r#"
profiles:
  - name: p
    services:
      - ref: ghost
services:
  - name: api
    lport: 8080
"#;
        assert!(matches!(Config::parse(bad), Err(KpulseError::Config(_))));
    }

    #[test]
    fn test_zero_port_rejected() {
        let bad = r#"
profiles: []
services:
  - name: api
    lport: 0
"#;
        assert!(matches!(Config::parse(bad), Err(KpulseError::Config(_))));
    }
}
