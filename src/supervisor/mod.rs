//! Multi-service forwarding supervisor
//!
//! One independent task per configured forward. Each task resolves the
//! backing pod, opens a session, serves it until it ends, and loops straight
//! back into another attempt on any failure. The only state shared between
//! tasks is the cancellation token; a failure in one forward never affects
//! another.

use std::fmt;
use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::bridge::{BridgeListener, RawRelay};
use crate::config::{ForwardMode, ForwardSpec};
use crate::errors::{KpulseError, Result};
use crate::kube::directory::{ClusterDirectory, PodTarget};
use crate::kube::transport::TunnelTransport;
use crate::tunnel::TunnelSession;

/// Lifecycle of one supervised forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForwardState {
    Starting,
    Active,
    Retrying,
    Stopped,
}

impl fmt::Display for ForwardState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ForwardState::Starting => "starting",
            ForwardState::Active => "active",
            ForwardState::Retrying => "retrying",
            ForwardState::Stopped => "stopped",
        };
        write!(f, "{}", s)
    }
}

/// Last observed status of one forward, published on every transition.
#[derive(Debug, Clone)]
pub struct ForwardStatus {
    pub alias: String,
    pub state: ForwardState,
    pub last_error: Option<String>,
}

/// Handle onto one supervised forward's task and status feed.
pub struct ForwardHandle {
    pub alias: String,
    status: watch::Receiver<ForwardStatus>,
    task: JoinHandle<()>,
}

impl ForwardHandle {
    pub fn status(&self) -> ForwardStatus {
        self.status.borrow().clone()
    }

    /// Subscribe to status transitions (for callers that want to wait on a
    /// particular state).
    pub fn watch(&self) -> watch::Receiver<ForwardStatus> {
        self.status.clone()
    }
}

/// Supervises all configured forwards until shutdown.
pub struct ForwardSupervisor {
    handles: Vec<ForwardHandle>,
}

impl ForwardSupervisor {
    /// Spawn one supervising task per forward spec.
    pub fn start<D, T>(
        specs: Vec<ForwardSpec>,
        directory: Arc<D>,
        transport: Arc<T>,
        cancel: CancellationToken,
    ) -> Self
    where
        D: ClusterDirectory + 'static,
        T: TunnelTransport + 'static,
    {
        let handles = specs
            .into_iter()
            .map(|spec| {
                let (tx, rx) = watch::channel(ForwardStatus {
                    alias: spec.alias.clone(),
                    state: ForwardState::Starting,
                    last_error: None,
                });
                let alias = spec.alias.clone();
                let task = tokio::spawn(run_forward(
                    spec,
                    Arc::clone(&directory),
                    Arc::clone(&transport),
                    cancel.clone(),
                    tx,
                ));
                ForwardHandle {
                    alias,
                    status: rx,
                    task,
                }
            })
            .collect();

        Self { handles }
    }

    pub fn handles(&self) -> &[ForwardHandle] {
        &self.handles
    }

    /// Block until every supervising task has exited.
    pub async fn wait(self) {
        for handle in self.handles {
            let _ = handle.task.await;
        }
    }
}

/// The per-service state machine: Starting -> Active -> Retrying -> Starting
/// until the cancellation token moves it to Stopped.
async fn run_forward<D, T>(
    spec: ForwardSpec,
    directory: Arc<D>,
    transport: Arc<T>,
    cancel: CancellationToken,
    status: watch::Sender<ForwardStatus>,
) where
    D: ClusterDirectory + 'static,
    T: TunnelTransport + 'static,
{
    info!(
        alias = %spec.alias,
        namespace = %spec.namespace,
        lport = spec.local_port,
        rport = spec.remote_port,
        "forwarding service"
    );

    loop {
        if cancel.is_cancelled() {
            break;
        }
        publish(&status, ForwardState::Starting, None);

        let outcome = tokio::select! {
            _ = cancel.cancelled() => break,
            outcome = forward_attempt(&spec, directory.as_ref(), &transport, &cancel, &status) => outcome,
        };

        match outcome {
            Ok(()) => debug!(alias = %spec.alias, "forward session ended"),
            Err(e) => {
                warn!(alias = %spec.alias, error = %e, "forward attempt failed, retrying");
                publish(&status, ForwardState::Retrying, Some(e.to_string()));
            }
        }
    }

    publish(&status, ForwardState::Stopped, None);
    info!(alias = %spec.alias, lport = spec.local_port, "forward stopped");
}

/// One attempt: resolve the backend, open the session, serve until it ends.
async fn forward_attempt<D, T>(
    spec: &ForwardSpec,
    directory: &D,
    transport: &Arc<T>,
    cancel: &CancellationToken,
    status: &watch::Sender<ForwardStatus>,
) -> Result<()>
where
    D: ClusterDirectory + 'static,
    T: TunnelTransport + 'static,
{
    let target = resolve_backend(directory, spec).await?;
    debug!(alias = %spec.alias, pod = %target.name, "selected backend pod");

    match spec.mode {
        ForwardMode::Http => {
            let stream = transport.dial(&target, spec.remote_port).await?;
            let session = TunnelSession::start(stream);
            let listener = BridgeListener::bind(&spec.alias, spec.local_port).await?;
            publish(status, ForwardState::Active, None);
            info!(
                alias = %spec.alias,
                lport = spec.local_port,
                pod = %target.name,
                "forward active"
            );
            listener.serve(session, cancel.child_token()).await
        }
        ForwardMode::Raw => {
            let relay = RawRelay::bind(&spec.alias, spec.local_port).await?;
            publish(status, ForwardState::Active, None);
            info!(
                alias = %spec.alias,
                lport = spec.local_port,
                pod = %target.name,
                "forward active"
            );
            relay
                .serve(Arc::clone(transport), target, spec.remote_port, cancel.child_token())
                .await
        }
    }
}

/// Select the first Running pod backing the service.
async fn resolve_backend<D: ClusterDirectory>(directory: &D, spec: &ForwardSpec) -> Result<PodTarget> {
    let selector = directory
        .resolve_service(&spec.namespace, &spec.service)
        .await?;
    let pods = directory.list_pods(&spec.namespace, &selector).await?;
    debug!(alias = %spec.alias, candidates = pods.len(), "listed backend pods");

    pods.into_iter()
        .find(PodTarget::is_running)
        .ok_or_else(|| KpulseError::NoBackend(spec.service.clone()))
}

fn publish(status: &watch::Sender<ForwardStatus>, state: ForwardState, error: Option<String>) {
    status.send_modify(|s| {
        s.state = state;
        if error.is_some() {
            s.last_error = error;
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_display() {
        assert_eq!(ForwardState::Starting.to_string(), "starting");
        assert_eq!(ForwardState::Active.to_string(), "active");
        assert_eq!(ForwardState::Retrying.to_string(), "retrying");
        assert_eq!(ForwardState::Stopped.to_string(), "stopped");
    }
}
