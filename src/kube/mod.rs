//! Kubernetes integration module
//!
//! Talks to the cluster control plane two ways: the REST API for service and
//! pod discovery, and the WebSocket port-forward endpoint for tunnel streams.
//! Both authenticate with the credentials loaded from the kubeconfig.

pub mod directory;
pub mod kubeconfig;
pub mod transport;

pub use directory::{ApiDirectory, ClusterDirectory, PodPhase, PodTarget, ServiceSelector};
pub use kubeconfig::ClusterAuth;
pub use transport::{TunnelTransport, WsTunnelTransport};
