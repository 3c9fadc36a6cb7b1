//! Capabilities the host environment supplies.
//!
//! The realtime layer never opens sockets or media devices itself. It is
//! handed a peer transport factory, a signaling exchange, an audio capture
//! source, an audio sink for the remote voice, and media elements for the
//! clips. `HttpSignaling` is the one concrete capability shipped here.

use crate::error::{PlaybackError, TransportError};
use async_trait::async_trait;
use induction_realtime_types::SessionDescriptor;
#[cfg(test)]
use mockall::automock;
use secrecy::ExposeSecret;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Label of the data channel that carries protocol events.
pub const CONTROL_CHANNEL_LABEL: &str = "oai-events";

/// Something the peer transport reports, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerEvent {
    /// The control channel finished opening.
    ChannelOpen,
    /// The transport itself reports connected.
    Connected,
    /// A text frame arrived on the control channel.
    Frame(String),
    /// The remote side started sending its voice.
    RemoteAudio(RemoteAudio),
    /// The control channel closed.
    ChannelClosed,
    /// The transport failed; carries the reason.
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteAudio {
    pub track_id: String,
}

/// A captured local media track.
pub trait LocalTrack: Send + Sync {
    fn id(&self) -> &str;
    fn stop(&self);
}

#[async_trait]
pub trait AudioCapture: Send + Sync {
    /// Acquires the microphone. Errors map to `TransportError::Capture`.
    async fn acquire(&self) -> Result<Arc<dyn LocalTrack>, TransportError>;
}

/// Where the remote voice is played.
#[async_trait]
pub trait AudioSink: Send + Sync {
    fn attach(&self, audio: RemoteAudio);
    async fn play(&self) -> Result<(), PlaybackError>;
    fn detach(&self);
}

/// A live peer connection with a control channel alongside the media.
#[async_trait]
pub trait PeerTransport: Send + Sync {
    async fn add_local_audio(&self, track: Arc<dyn LocalTrack>) -> Result<(), TransportError>;
    async fn open_control_channel(&self, label: &str) -> Result<(), TransportError>;
    async fn create_offer(&self) -> Result<String, TransportError>;
    async fn apply_answer(&self, answer: &str) -> Result<(), TransportError>;
    /// Sends one text frame on the control channel.
    async fn send(&self, frame: String) -> Result<(), TransportError>;
    fn close(&self);
}

#[async_trait]
pub trait PeerFactory: Send + Sync {
    /// Creates a fresh transport and the stream of events it reports.
    async fn create(
        &self,
    ) -> Result<(Arc<dyn PeerTransport>, mpsc::Receiver<PeerEvent>), TransportError>;
}

/// Trades a local offer for the remote answer, authorised by the session credential.
#[async_trait]
pub trait Signaling: Send + Sync {
    async fn exchange(
        &self,
        offer: &str,
        descriptor: &SessionDescriptor,
    ) -> Result<String, TransportError>;
}

/// A video or audio element the controller drives.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait MediaElement: Send + Sync {
    fn load(&self, src: &str);
    /// Sets the playback position back to zero.
    fn rewind(&self);
    fn pause(&self);
    async fn play(&self) -> Result<(), PlaybackError>;
}

/// Everything a realtime connection needs from its host.
#[derive(Clone)]
pub struct RealtimeHost {
    pub peers: Arc<dyn PeerFactory>,
    pub signaling: Arc<dyn Signaling>,
    pub capture: Arc<dyn AudioCapture>,
    pub sink: Arc<dyn AudioSink>,
}

/// SDP exchange over HTTP against the realtime endpoint.
pub struct HttpSignaling {
    client: reqwest::Client,
    base_url: String,
}

impl HttpSignaling {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl Signaling for HttpSignaling {
    async fn exchange(
        &self,
        offer: &str,
        descriptor: &SessionDescriptor,
    ) -> Result<String, TransportError> {
        if !descriptor.has_credential() {
            return Err(TransportError::Signaling("session has no credential".to_string()));
        }

        let resp = self
            .client
            .post(format!("{}/realtime", self.base_url))
            .query(&[("model", descriptor.model_id())])
            .bearer_auth(descriptor.credential().expose_secret())
            .header(reqwest::header::CONTENT_TYPE, "application/sdp")
            .body(offer.to_string())
            .send()
            .await
            .map_err(|e| TransportError::Signaling(e.to_string()))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| TransportError::Signaling(e.to_string()))?;
        if !status.is_success() {
            return Err(TransportError::SignalingRejected {
                status: status.as_u16(),
                detail: body.trim().to_string(),
            });
        }
        Ok(body)
    }
}
