//! Common test utilities for kpulse integration tests
//!
//! This module provides shared test infrastructure including:
//! - In-process fakes for the cluster directory and tunnel transport
//! - Scripted tunnel streams the tests drive by hand
//! - Forward spec fixtures

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;

use kpulse::config::{ForwardMode, ForwardSpec};
use kpulse::errors::{KpulseError, Result};
use kpulse::kube::directory::{ClusterDirectory, PodPhase, PodTarget, ServiceSelector};
use kpulse::kube::transport::TunnelTransport;
use kpulse::supervisor::{ForwardHandle, ForwardState};
use kpulse::tunnel::{FrameStream, StreamEvent};

pub const WAIT: Duration = Duration::from_secs(5);

/// A forward spec bound to an ephemeral local port.
pub fn spec(alias: &str) -> ForwardSpec {
    ForwardSpec {
        alias: alias.to_string(),
        service: format!("{}-service", alias),
        namespace: "dev".to_string(),
        local_port: 0,
        remote_port: 80,
        mode: ForwardMode::Http,
    }
}

pub fn running_pod(name: &str) -> PodTarget {
    PodTarget {
        namespace: "dev".to_string(),
        name: name.to_string(),
        phase: PodPhase::Running,
    }
}

pub fn pending_pod(name: &str) -> PodTarget {
    PodTarget {
        namespace: "dev".to_string(),
        name: name.to_string(),
        phase: PodPhase::Pending,
    }
}

/// Directory fake returning a fixed pod list; counts resolutions.
pub struct FakeDirectory {
    pods: Mutex<Vec<PodTarget>>,
    known_services: Option<Vec<String>>,
    pub resolve_calls: AtomicUsize,
}

impl FakeDirectory {
    pub fn with_pods(pods: Vec<PodTarget>) -> Arc<Self> {
        Arc::new(Self {
            pods: Mutex::new(pods),
            known_services: None,
            resolve_calls: AtomicUsize::new(0),
        })
    }

    /// Only the named services resolve; everything else is NotFound.
    pub fn with_pods_for(services: &[&str], pods: Vec<PodTarget>) -> Arc<Self> {
        Arc::new(Self {
            pods: Mutex::new(pods),
            known_services: Some(services.iter().map(|s| s.to_string()).collect()),
            resolve_calls: AtomicUsize::new(0),
        })
    }

    pub fn no_backends() -> Arc<Self> {
        Self::with_pods(Vec::new())
    }

    pub fn resolutions(&self) -> usize {
        self.resolve_calls.load(Ordering::SeqCst)
    }
}

impl ClusterDirectory for FakeDirectory {
    async fn resolve_service(&self, namespace: &str, name: &str) -> Result<ServiceSelector> {
        self.resolve_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(known) = &self.known_services {
            if !known.iter().any(|s| s == name) {
                return Err(KpulseError::NotFound {
                    name: name.to_string(),
                    namespace: namespace.to_string(),
                });
            }
        }
        Ok(ServiceSelector::default())
    }

    async fn list_pods(
        &self,
        _namespace: &str,
        _selector: &ServiceSelector,
    ) -> Result<Vec<PodTarget>> {
        Ok(self.pods.lock().unwrap().clone())
    }
}

/// Test-side controls for one scripted tunnel stream.
pub struct StreamHandle {
    /// Push inbound events (wire messages, closure, errors) into the stream.
    pub events: mpsc::UnboundedSender<Result<StreamEvent>>,
    /// Wire messages the session wrote to the stream.
    pub sent: mpsc::UnboundedReceiver<Vec<u8>>,
    released: Arc<AtomicBool>,
}

impl StreamHandle {
    pub fn released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }
}

/// A tunnel stream driven entirely by its [`StreamHandle`].
pub struct ScriptedStream {
    events: mpsc::UnboundedReceiver<Result<StreamEvent>>,
    sent: mpsc::UnboundedSender<Vec<u8>>,
    released: Arc<AtomicBool>,
}

impl ScriptedStream {
    pub fn new() -> (Self, StreamHandle) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (sent_tx, sent_rx) = mpsc::unbounded_channel();
        let released = Arc::new(AtomicBool::new(false));
        let stream = Self {
            events: event_rx,
            sent: sent_tx,
            released: released.clone(),
        };
        let handle = StreamHandle {
            events: event_tx,
            sent: sent_rx,
            released,
        };
        (stream, handle)
    }
}

impl FrameStream for ScriptedStream {
    async fn send(&mut self, msg: Vec<u8>) -> Result<()> {
        self.sent
            .send(msg)
            .map_err(|_| KpulseError::TransportWrite("peer gone".to_string()))
    }

    async fn recv(&mut self) -> Result<StreamEvent> {
        match self.events.recv().await {
            Some(event) => event,
            None => Ok(StreamEvent::Closed),
        }
    }

    async fn shutdown(&mut self) {
        self.released.store(true, Ordering::SeqCst);
    }
}

/// Transport fake handing out pre-scripted streams in order.
pub struct FakeTransport {
    streams: Mutex<VecDeque<ScriptedStream>>,
    pub dials: AtomicUsize,
}

impl FakeTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            streams: Mutex::new(VecDeque::new()),
            dials: AtomicUsize::new(0),
        })
    }

    /// Queue one more stream for the next dial; drive it via the handle.
    pub fn push_stream(&self) -> StreamHandle {
        let (stream, handle) = ScriptedStream::new();
        self.streams.lock().unwrap().push_back(stream);
        handle
    }

    pub fn dial_count(&self) -> usize {
        self.dials.load(Ordering::SeqCst)
    }
}

impl TunnelTransport for FakeTransport {
    type Stream = ScriptedStream;

    async fn dial(&self, _target: &PodTarget, _remote_port: u16) -> Result<ScriptedStream> {
        self.dials.fetch_add(1, Ordering::SeqCst);
        self.streams
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| KpulseError::Dial("no scripted stream available".to_string()))
    }
}

/// Wait until a forward reaches the given state, or panic after `WAIT`.
pub async fn wait_for_state(handle: &ForwardHandle, state: ForwardState) {
    let mut watch = handle.watch();
    tokio::time::timeout(WAIT, watch.wait_for(|s| s.state == state))
        .await
        .unwrap_or_else(|_| panic!("forward '{}' never reached {}", handle.alias, state))
        .expect("status channel closed");
}
