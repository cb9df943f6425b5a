//! Kubeconfig loading
//!
//! Extracts the credentials for the active context: apiserver URL, bearer
//! token, CA bundle, and the insecure-skip-verify flag. Client-certificate
//! authentication is not supported; see DESIGN.md.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::errors::{KpulseError, Result};

/// Credentials and endpoint for one cluster, resolved from the kubeconfig.
#[derive(Debug, Clone)]
pub struct ClusterAuth {
    /// Apiserver base URL, e.g. `https://10.0.0.1:6443`.
    pub server: String,
    /// Bearer token, if the active user carries one.
    pub token: Option<String>,
    /// CA bundle in PEM form, if the cluster pins one.
    pub ca_pem: Option<Vec<u8>>,
    /// Skip server certificate verification.
    pub insecure_skip_tls_verify: bool,
}

#[derive(Debug, Deserialize)]
struct Kubeconfig {
    #[serde(rename = "current-context")]
    current_context: Option<String>,
    #[serde(default)]
    clusters: Vec<NamedCluster>,
    #[serde(default)]
    contexts: Vec<NamedContext>,
    #[serde(default)]
    users: Vec<NamedUser>,
}

#[derive(Debug, Deserialize)]
struct NamedCluster {
    name: String,
    cluster: Cluster,
}

#[derive(Debug, Deserialize)]
struct Cluster {
    server: String,
    #[serde(rename = "certificate-authority-data")]
    certificate_authority_data: Option<String>,
    #[serde(rename = "certificate-authority")]
    certificate_authority: Option<PathBuf>,
    #[serde(rename = "insecure-skip-tls-verify", default)]
    insecure_skip_tls_verify: bool,
}

#[derive(Debug, Deserialize)]
struct NamedContext {
    name: String,
    context: Context,
}

#[derive(Debug, Deserialize)]
struct Context {
    cluster: String,
    user: String,
}

#[derive(Debug, Deserialize)]
struct NamedUser {
    name: String,
    #[serde(default)]
    user: User,
}

#[derive(Debug, Deserialize, Default)]
struct User {
    token: Option<String>,
    #[serde(rename = "tokenFile")]
    token_file: Option<PathBuf>,
}

/// Kubeconfig location: `$KUBECONFIG` if set, otherwise `~/.kube/config`.
pub fn default_path() -> PathBuf {
    if let Ok(path) = std::env::var("KUBECONFIG") {
        if !path.is_empty() {
            return PathBuf::from(path);
        }
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".kube")
        .join("config")
}

/// Load and resolve the active context from a kubeconfig file.
pub fn load(path: &Path) -> Result<ClusterAuth> {
    let data = std::fs::read_to_string(path)
        .map_err(|e| KpulseError::Kubeconfig(format!("cannot read {}: {}", path.display(), e)))?;
    parse(&data)
}

fn parse(data: &str) -> Result<ClusterAuth> {
    let config: Kubeconfig =
        serde_yaml::from_str(data).map_err(|e| KpulseError::Kubeconfig(e.to_string()))?;

    let context_name = config
        .current_context
        .ok_or_else(|| KpulseError::Kubeconfig("no current-context set".to_string()))?;

    let context = config
        .contexts
        .iter()
        .find(|c| c.name == context_name)
        .map(|c| &c.context)
        .ok_or_else(|| {
            KpulseError::Kubeconfig(format!("context '{}' not found", context_name))
        })?;

    let cluster = config
        .clusters
        .iter()
        .find(|c| c.name == context.cluster)
        .map(|c| &c.cluster)
        .ok_or_else(|| {
            KpulseError::Kubeconfig(format!("cluster '{}' not found", context.cluster))
        })?;

    let user = config
        .users
        .iter()
        .find(|u| u.name == context.user)
        .map(|u| &u.user);

    let ca_pem = match (&cluster.certificate_authority_data, &cluster.certificate_authority) {
        (Some(data), _) => Some(decode_ca_data(data)?),
        (None, Some(path)) => Some(std::fs::read(path).map_err(|e| {
            KpulseError::Kubeconfig(format!("cannot read CA file {}: {}", path.display(), e))
        })?),
        (None, None) => None,
    };

    let token = match user {
        Some(User {
            token: Some(token), ..
        }) => Some(token.clone()),
        Some(User {
            token_file: Some(path),
            ..
        }) => Some(
            std::fs::read_to_string(path)
                .map_err(|e| {
                    KpulseError::Kubeconfig(format!(
                        "cannot read token file {}: {}",
                        path.display(),
                        e
                    ))
                })?
                .trim()
                .to_string(),
        ),
        _ => None,
    };

    Ok(ClusterAuth {
        server: cluster.server.trim_end_matches('/').to_string(),
        token,
        ca_pem,
        insecure_skip_tls_verify: cluster.insecure_skip_tls_verify,
    })
}

fn decode_ca_data(data: &str) -> Result<Vec<u8>> {
    base64::Engine::decode(&base64::engine::general_purpose::STANDARD, data.trim())
        .map_err(|e| KpulseError::Kubeconfig(format!("invalid certificate-authority-data: {}", e)))
}
