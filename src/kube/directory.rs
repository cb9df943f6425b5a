//! Cluster directory: service and pod lookups against the Kubernetes API
//!
//! The directory is consulted once per forwarding attempt to turn a service
//! name into a concrete running pod. It is expressed as a trait so the
//! supervisor can be driven by an in-process fake in tests.

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;

use reqwest::{Client, StatusCode};
use serde::Deserialize;

use super::kubeconfig::ClusterAuth;
use crate::errors::{KpulseError, Result};

/// Label selector taken from a service manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceSelector {
    pub match_labels: BTreeMap<String, String>,
}

impl ServiceSelector {
    /// Render as the `labelSelector` query format (`k1=v1,k2=v2`).
    pub fn to_label_selector(&self) -> String {
        self.match_labels
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Pod lifecycle phase as reported by the apiserver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PodPhase {
    Pending,
    Running,
    Succeeded,
    Failed,
    Unknown,
}

impl From<&str> for PodPhase {
    fn from(phase: &str) -> Self {
        match phase {
            "Pending" => PodPhase::Pending,
            "Running" => PodPhase::Running,
            "Succeeded" => PodPhase::Succeeded,
            "Failed" => PodPhase::Failed,
            _ => PodPhase::Unknown,
        }
    }
}

impl fmt::Display for PodPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PodPhase::Pending => "Pending",
            PodPhase::Running => "Running",
            PodPhase::Succeeded => "Succeeded",
            PodPhase::Failed => "Failed",
            PodPhase::Unknown => "Unknown",
        };
        write!(f, "{}", s)
    }
}

/// One backing pod a forward may be bound to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PodTarget {
    pub namespace: String,
    pub name: String,
    pub phase: PodPhase,
}

impl PodTarget {
    /// Only Running pods may be used to open a session.
    pub fn is_running(&self) -> bool {
        self.phase == PodPhase::Running
    }
}

/// Service/pod discovery against the cluster control plane.
pub trait ClusterDirectory: Send + Sync {
    /// Resolve a service to its label selector. Fails with `NotFound` when
    /// the service does not exist in the namespace.
    fn resolve_service(
        &self,
        namespace: &str,
        name: &str,
    ) -> impl Future<Output = Result<ServiceSelector>> + Send;

    /// List the pods backing a selector, with their lifecycle phase.
    fn list_pods(
        &self,
        namespace: &str,
        selector: &ServiceSelector,
    ) -> impl Future<Output = Result<Vec<PodTarget>>> + Send;
}

// Minimal views of the apiserver manifests; everything else is ignored.

#[derive(Debug, Deserialize)]
struct ServiceManifest {
    #[serde(default)]
    spec: ServiceSpec,
}

#[derive(Debug, Deserialize, Default)]
struct ServiceSpec {
    #[serde(default)]
    selector: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct PodList {
    #[serde(default)]
    items: Vec<PodManifest>,
}

#[derive(Debug, Deserialize)]
struct PodManifest {
    metadata: ObjectMeta,
    #[serde(default)]
    status: PodStatus,
}

#[derive(Debug, Deserialize)]
struct ObjectMeta {
    name: String,
    #[serde(default)]
    namespace: String,
}

#[derive(Debug, Deserialize, Default)]
struct PodStatus {
    #[serde(default)]
    phase: String,
}

/// `ClusterDirectory` implementation speaking the Kubernetes REST API.
#[derive(Debug, Clone)]
pub struct ApiDirectory {
    client: Client,
    server: String,
}

impl ApiDirectory {
    pub fn new(auth: &ClusterAuth) -> Result<Self> {
        let mut builder = Client::builder();

        if auth.insecure_skip_tls_verify {
            builder = builder.danger_accept_invalid_certs(true);
        }
        if let Some(ca_pem) = &auth.ca_pem {
            builder = builder.add_root_certificate(reqwest::Certificate::from_pem(ca_pem)?);
        }
        if let Some(token) = &auth.token {
            let mut headers = reqwest::header::HeaderMap::new();
            let mut value =
                reqwest::header::HeaderValue::from_str(&format!("Bearer {}", token))
                    .map_err(|_| {
                        KpulseError::Auth("bearer token contains invalid characters".to_string())
                    })?;
            value.set_sensitive(true);
            headers.insert(reqwest::header::AUTHORIZATION, value);
            builder = builder.default_headers(headers);
        }

        Ok(Self {
            client: builder.build()?,
            server: auth.server.trim_end_matches('/').to_string(),
        })
    }

    /// For tests that point at a local mock apiserver.
    pub fn with_server(server: &str) -> Self {
        Self {
            client: Client::new(),
            server: server.trim_end_matches('/').to_string(),
        }
    }
}

impl ClusterDirectory for ApiDirectory {
    async fn resolve_service(&self, namespace: &str, name: &str) -> Result<ServiceSelector> {
        let url = format!(
            "{}/api/v1/namespaces/{}/services/{}",
            self.server, namespace, name
        );
        let response = self.client.get(&url).send().await?;

        match response.status() {
            StatusCode::NOT_FOUND => Err(KpulseError::NotFound {
                name: name.to_string(),
                namespace: namespace.to_string(),
            }),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(KpulseError::Auth(format!(
                "apiserver returned {} for service '{}'",
                response.status(),
                name
            ))),
            status if !status.is_success() => Err(KpulseError::TransportRead(format!(
                "apiserver returned {} for service '{}'",
                status, name
            ))),
            _ => {
                let manifest: ServiceManifest = response.json().await?;
                Ok(ServiceSelector {
                    match_labels: manifest.spec.selector,
                })
            }
        }
    }

    async fn list_pods(
        &self,
        namespace: &str,
        selector: &ServiceSelector,
    ) -> Result<Vec<PodTarget>> {
        let url = format!("{}/api/v1/namespaces/{}/pods", self.server, namespace);
        let response = self
            .client
            .get(&url)
            .query(&[("labelSelector", selector.to_label_selector())])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(KpulseError::TransportRead(format!(
                "apiserver returned {} listing pods in '{}'",
                response.status(),
                namespace
            )));
        }

        let list: PodList = response.json().await?;
        Ok(list
            .items
            .into_iter()
            .map(|pod| PodTarget {
                namespace: if pod.metadata.namespace.is_empty() {
                    namespace.to_string()
                } else {
                    pod.metadata.namespace
                },
                name: pod.metadata.name,
                phase: PodPhase::from(pod.status.phase.as_str()),
            })
            .collect())
    }
}
