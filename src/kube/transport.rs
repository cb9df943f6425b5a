//! WebSocket tunnel transport to the apiserver port-forward endpoint
//!
//! Dials `wss://<apiserver>/api/v1/namespaces/{ns}/pods/{pod}/portforward`
//! with the `v4.channel.k8s.io` subprotocol and bearer-token auth, and wraps
//! the connection as a [`FrameStream`] for the tunnel session.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use rustls::ClientConfig;
use tokio::net::TcpStream;
use tokio_tungstenite::{
    connect_async_tls_with_config, Connector, MaybeTlsStream, WebSocketStream,
};
use tracing::debug;
use tungstenite::{
    client::IntoClientRequest,
    http::{HeaderValue, StatusCode},
    protocol::{frame::coding::CloseCode, Message},
    Error as WsError,
};
use url::Url;

use super::directory::PodTarget;
use super::kubeconfig::ClusterAuth;
use crate::errors::{KpulseError, Result};
use crate::tunnel::{FrameStream, StreamEvent};

/// Subprotocol spoken on the port-forward endpoint.
const PORTFORWARD_SUBPROTOCOL: &str = "v4.channel.k8s.io";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Establishes duplex streams to pods. Never retries internally; all retry
/// policy lives in the supervisor.
pub trait TunnelTransport: Send + Sync {
    type Stream: FrameStream + 'static;

    /// Open one authenticated duplex stream to a pod/port pair.
    fn dial(
        &self,
        target: &PodTarget,
        remote_port: u16,
    ) -> impl Future<Output = Result<Self::Stream>> + Send;
}

/// `TunnelTransport` over a WebSocket connection to the apiserver.
#[derive(Debug, Clone)]
pub struct WsTunnelTransport {
    auth: ClusterAuth,
}

impl WsTunnelTransport {
    pub fn new(auth: ClusterAuth) -> Self {
        Self { auth }
    }

    fn portforward_url(&self, target: &PodTarget, remote_port: u16) -> Result<Url> {
        let mut url = Url::parse(&self.auth.server).map_err(|e| {
            KpulseError::Dial(format!("invalid apiserver url '{}': {}", self.auth.server, e))
        })?;

        let scheme = match url.scheme() {
            "https" | "wss" => "wss",
            _ => "ws",
        };
        url.set_scheme(scheme)
            .map_err(|_| KpulseError::Dial(format!("cannot derive ws scheme for '{}'", url)))?;
        url.set_path(&format!(
            "/api/v1/namespaces/{}/pods/{}/portforward",
            target.namespace, target.name
        ));
        url.query_pairs_mut()
            .clear()
            .append_pair("ports", &remote_port.to_string());

        Ok(url)
    }

    fn tls_connector(&self) -> Result<Option<Connector>> {
        if !self.auth.server.starts_with("https://") && !self.auth.server.starts_with("wss://") {
            return Ok(None);
        }

        let config = if self.auth.insecure_skip_tls_verify {
            // Dangerous: skip certificate verification
            ClientConfig::builder()
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(NoVerifier))
                .with_no_client_auth()
        } else {
            let mut root_store = rustls::RootCertStore::empty();

            if let Some(ca_pem) = &self.auth.ca_pem {
                let mut reader = std::io::Cursor::new(ca_pem.as_slice());
                for cert in rustls_pemfile::certs(&mut reader) {
                    let cert = cert.map_err(|e| {
                        KpulseError::Kubeconfig(format!("invalid CA certificate: {}", e))
                    })?;
                    root_store.add(cert).map_err(|e| {
                        KpulseError::Kubeconfig(format!("unusable CA certificate: {}", e))
                    })?;
                }
            } else {
                // No pinned CA: use system roots (matching the REST client's
                // rustls-native-certs behavior), ignoring individual bad certs
                let cert_result = rustls_native_certs::load_native_certs();
                for cert in cert_result.certs {
                    root_store.add(cert).ok();
                }
            }

            // If no certs loaded, fall back to webpki-roots
            if root_store.is_empty() {
                root_store = rustls::RootCertStore::from_iter(
                    webpki_roots::TLS_SERVER_ROOTS.iter().cloned(),
                );
            }

            ClientConfig::builder()
                .with_root_certificates(root_store)
                .with_no_client_auth()
        };

        Ok(Some(Connector::Rustls(Arc::new(config))))
    }
}

impl TunnelTransport for WsTunnelTransport {
    type Stream = WsFrameStream;

    async fn dial(&self, target: &PodTarget, remote_port: u16) -> Result<WsFrameStream> {
        let url = self.portforward_url(target, remote_port)?;

        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(|e| KpulseError::Dial(format!("invalid port-forward url: {}", e)))?;

        let headers = request.headers_mut();
        if let Some(token) = &self.auth.token {
            let value = HeaderValue::from_str(&format!("Bearer {}", token)).map_err(|_| {
                KpulseError::Auth("bearer token contains invalid header characters".to_string())
            })?;
            headers.insert("Authorization", value);
        }
        headers.insert(
            "Sec-WebSocket-Protocol",
            HeaderValue::from_static(PORTFORWARD_SUBPROTOCOL),
        );

        let connector = self.tls_connector()?;

        debug!(url = %url, pod = %target.name, "dialing port-forward endpoint");
        let connect = connect_async_tls_with_config(request, None, false, connector);
        let (stream, response) = tokio::time::timeout(CONNECT_TIMEOUT, connect)
            .await
            .map_err(|_| KpulseError::Dial(format!("connection to {} timed out", url)))?
            .map_err(classify_dial_error)?;

        if let Some(protocol) = response.headers().get("Sec-WebSocket-Protocol") {
            debug!(protocol = ?protocol, "negotiated subprotocol");
        }

        Ok(WsFrameStream { inner: stream })
    }
}

fn classify_dial_error(err: WsError) -> KpulseError {
    match err {
        WsError::Http(response) => {
            let status = response.status();
            if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
                KpulseError::Auth(format!("apiserver rejected port-forward: {}", status))
            } else {
                KpulseError::Dial(format!("apiserver rejected port-forward: {}", status))
            }
        }
        other => KpulseError::Dial(format!("WebSocket dial failed: {}", other)),
    }
}

/// A port-forward WebSocket connection as a tunnel frame stream.
pub struct WsFrameStream {
    inner: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl FrameStream for WsFrameStream {
    async fn send(&mut self, msg: Vec<u8>) -> Result<()> {
        self.inner
            .send(Message::Binary(msg.into()))
            .await
            .map_err(|e| KpulseError::TransportWrite(format!("{}", e)))
    }

    async fn recv(&mut self) -> Result<StreamEvent> {
        loop {
            match self.inner.next().await {
                Some(Ok(Message::Binary(data))) => {
                    return Ok(StreamEvent::Message(data.to_vec()))
                }
                Some(Ok(Message::Text(text))) => {
                    return Ok(StreamEvent::Message(text.to_string().into_bytes()))
                }
                // Control frames are not part of the tunnel protocol
                Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => continue,
                Some(Ok(Message::Close(frame))) => {
                    let normal = frame
                        .as_ref()
                        .map(|f| f.code == CloseCode::Normal)
                        .unwrap_or(true);
                    if normal {
                        return Ok(StreamEvent::Closed);
                    }
                    return Err(KpulseError::TransportRead(format!(
                        "stream closed abnormally: {:?}",
                        frame
                    )));
                }
                Some(Err(WsError::ConnectionClosed)) | None => return Ok(StreamEvent::Closed),
                Some(Err(e)) => return Err(KpulseError::TransportRead(format!("{}", e))),
            }
        }
    }

    async fn shutdown(&mut self) {
        let _ = self.inner.close(None).await;
    }
}

/// Certificate verifier that accepts all certificates (insecure)
#[derive(Debug)]
struct NoVerifier;

impl rustls::client::danger::ServerCertVerifier for NoVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &rustls::pki_types::CertificateDer<'_>,
        _intermediates: &[rustls::pki_types::CertificateDer<'_>],
        _server_name: &rustls::pki_types::ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls::pki_types::UnixTime,
    ) -> std::result::Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> std::result::Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> std::result::Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        vec![
            rustls::SignatureScheme::RSA_PKCS1_SHA256,
            rustls::SignatureScheme::RSA_PKCS1_SHA384,
            rustls::SignatureScheme::RSA_PKCS1_SHA512,
            rustls::SignatureScheme::ECDSA_NISTP256_SHA256,
            rustls::SignatureScheme::ECDSA_NISTP384_SHA384,
            rustls::SignatureScheme::ECDSA_NISTP521_SHA512,
            rustls::SignatureScheme::RSA_PSS_SHA256,
            rustls::SignatureScheme::RSA_PSS_SHA384,
            rustls::SignatureScheme::RSA_PSS_SHA512,
            rustls::SignatureScheme::ED25519,
        ]
    }
}
