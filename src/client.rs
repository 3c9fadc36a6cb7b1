use crate::error::{PlaybackError, TransportError};
use crate::host::{LocalTrack, PeerEvent, PeerTransport, RealtimeHost, CONTROL_CHANNEL_LABEL};
use crate::reassembler::UtteranceReassembler;
use induction_realtime_types::events::client::ResponseCreateEvent;
use induction_realtime_types::{ClientEvent, Modality, SessionDescriptor};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{broadcast, mpsc, watch};

pub type EventRx = broadcast::Receiver<ConnectionEvent>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Idle,
    Connecting,
    Connected,
    Closed,
}

/// What a connection publishes to its subscribers.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    /// A narrated utterance, reassembled, with the frame that completed it.
    Text {
        text: String,
        envelope: serde_json::Value,
    },
    StateChanged(ConnectionState),
    /// The remote voice could not start on its own; a user gesture can resume it.
    PlaybackBlocked(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
struct Lifecycle {
    state: ConnectionState,
    signaled: bool,
    ready: bool,
}

#[derive(Default)]
struct Resources {
    peer: Option<Arc<dyn PeerTransport>>,
    local: Option<Arc<dyn LocalTrack>>,
    pump: Option<tokio::task::JoinHandle<()>>,
    sink_attached: bool,
    failure: Option<String>,
}

struct Shared {
    host: RealtimeHost,
    lifecycle: watch::Sender<Lifecycle>,
    events: broadcast::Sender<ConnectionEvent>,
    resources: Mutex<Resources>,
}

impl Shared {
    fn state(&self) -> ConnectionState {
        self.lifecycle.borrow().state
    }

    fn resources(&self) -> MutexGuard<'_, Resources> {
        self.resources.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, event: ConnectionEvent) {
        if self.events.send(event).is_err() {
            tracing::debug!("no subscribers for connection event");
        }
    }

    /// Applies `f` to the lifecycle and announces any state change.
    fn update(&self, f: impl FnOnce(&mut Lifecycle)) -> Option<ConnectionState> {
        let mut changed = None;
        self.lifecycle.send_if_modified(|lc| {
            let before = *lc;
            f(lc);
            if lc.state != before.state {
                changed = Some(lc.state);
            }
            *lc != before
        });
        if let Some(state) = changed {
            tracing::info!("realtime connection is now {:?}", state);
            self.publish(ConnectionEvent::StateChanged(state));
        }
        changed
    }

    /// Channel open or transport connected. Either one completes the connection once signaled.
    fn mark_ready(&self) {
        self.update(|lc| {
            if lc.state == ConnectionState::Connecting {
                lc.ready = true;
                if lc.signaled {
                    lc.state = ConnectionState::Connected;
                }
            }
        });
    }

    fn mark_signaled(&self) {
        self.update(|lc| {
            if lc.state == ConnectionState::Connecting {
                lc.signaled = true;
                if lc.ready {
                    lc.state = ConnectionState::Connected;
                }
            }
        });
    }

    fn mark_closed(&self) {
        self.update(|lc| lc.state = ConnectionState::Closed);
    }

    fn fail(&self, reason: String) {
        tracing::error!("realtime transport failed: {}", reason);
        self.resources().failure.get_or_insert(reason);
        self.release();
        self.mark_closed();
    }

    /// Stops local media, drops the transport, detaches the sink. Safe to repeat.
    fn release(&self) {
        let (peer, local, detach) = {
            let mut res = self.resources();
            let detach = std::mem::take(&mut res.sink_attached);
            (res.peer.take(), res.local.take(), detach)
        };
        if let Some(local) = local {
            tracing::debug!("stopping local track {}", local.id());
            local.stop();
        }
        if let Some(peer) = peer {
            peer.close();
        }
        if detach {
            self.host.sink.detach();
        }
    }

    /// The error to report when an in-flight `connect` finds the connection closed.
    fn closed_error(&self) -> TransportError {
        match &self.resources().failure {
            Some(reason) => TransportError::Peer(reason.clone()),
            None => TransportError::Closed,
        }
    }

    fn keep_local(&self, track: Arc<dyn LocalTrack>) -> Result<(), TransportError> {
        let mut res = self.resources();
        if self.state() == ConnectionState::Closed {
            drop(res);
            track.stop();
            return Err(self.closed_error());
        }
        res.local = Some(track);
        Ok(())
    }

    fn keep_peer(&self, peer: Arc<dyn PeerTransport>) -> Result<(), TransportError> {
        let mut res = self.resources();
        if self.state() == ConnectionState::Closed {
            drop(res);
            peer.close();
            return Err(self.closed_error());
        }
        res.peer = Some(peer);
        Ok(())
    }

    fn peer(&self) -> Option<Arc<dyn PeerTransport>> {
        self.resources().peer.clone()
    }
}

/// A one-shot realtime session with the narrating agent.
///
/// `Idle -> Connecting -> Connected`, and `Closed` from anywhere. A closed
/// connection stays closed; build a new one for the next session.
pub struct RealtimeConnection {
    shared: Arc<Shared>,
    modalities: Vec<Modality>,
    /// Numbers outbound `response.create` frames.
    sequence: AtomicU64,
}

impl RealtimeConnection {
    pub fn new(host: RealtimeHost) -> Self {
        Self::with_capacity(host, 64)
    }

    pub fn with_capacity(host: RealtimeHost, capacity: usize) -> Self {
        let (lifecycle, _) = watch::channel(Lifecycle::default());
        let (events, _) = broadcast::channel(capacity);
        Self {
            shared: Arc::new(Shared {
                host,
                lifecycle,
                events,
                resources: Mutex::new(Resources::default()),
            }),
            modalities: vec![Modality::Audio, Modality::Text],
            sequence: AtomicU64::new(0),
        }
    }

    pub fn with_modalities(mut self, modalities: Vec<Modality>) -> Self {
        self.modalities = modalities;
        self
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.state()
    }

    /// Subscribe to reassembled narration and state changes.
    pub fn subscribe(&self) -> EventRx {
        self.shared.events.subscribe()
    }

    /// Waits until the connection is no longer `Connecting` and returns the state it settled in.
    pub async fn settled(&self) -> ConnectionState {
        let mut rx = self.shared.lifecycle.subscribe();
        let state = match rx.wait_for(|lc| lc.state != ConnectionState::Connecting).await {
            Ok(lc) => lc.state,
            Err(_) => ConnectionState::Closed,
        };
        state
    }

    /// Negotiates the transport for `descriptor`. Valid only from `Idle`; on
    /// any failure the connection ends up `Closed`.
    pub async fn connect(&self, descriptor: &SessionDescriptor) -> Result<(), TransportError> {
        let mut from = ConnectionState::Idle;
        let began = self.shared.update(|lc| {
            from = lc.state;
            if lc.state == ConnectionState::Idle {
                lc.state = ConnectionState::Connecting;
            }
        });
        if began != Some(ConnectionState::Connecting) {
            return Err(TransportError::InvalidState {
                operation: "connect",
                state: from,
            });
        }

        match self.establish(descriptor).await {
            Ok(()) if self.state() == ConnectionState::Closed => {
                let err = self.shared.closed_error();
                self.close();
                Err(err)
            }
            Ok(()) => Ok(()),
            Err(e) => {
                tracing::error!("failed to connect realtime session: {}", e);
                self.close();
                Err(e)
            }
        }
    }

    async fn establish(&self, descriptor: &SessionDescriptor) -> Result<(), TransportError> {
        let track = self.shared.host.capture.acquire().await?;
        self.shared.keep_local(track.clone())?;

        let (peer, peer_events) = self.shared.host.peers.create().await?;
        self.shared.keep_peer(peer.clone())?;
        let pump = tokio::spawn(pump_events(self.shared.clone(), peer_events));
        self.shared.resources().pump = Some(pump);

        peer.add_local_audio(track).await?;
        peer.open_control_channel(CONTROL_CHANNEL_LABEL).await?;
        let offer = peer.create_offer().await?;
        let answer = self.shared.host.signaling.exchange(&offer, descriptor).await?;
        if self.state() == ConnectionState::Closed {
            return Err(self.shared.closed_error());
        }
        peer.apply_answer(&answer).await?;

        tracing::debug!("signaling complete for model {}", descriptor.model_id());
        self.shared.mark_signaled();
        Ok(())
    }

    /// Asks the agent to narrate from `text`. Waits while the connection is
    /// still coming up; fails with `NotReady` if there is no channel to send on.
    pub async fn speak(&self, text: &str) -> Result<(), TransportError> {
        if text.trim().is_empty() {
            return Ok(());
        }

        match self.settled().await {
            ConnectionState::Connected => {}
            state => {
                tracing::warn!("cannot speak while {:?}", state);
                return Err(TransportError::NotReady);
            }
        }
        let peer = self.shared.peer().ok_or(TransportError::NotReady)?;

        let event_id = format!("speak_{}", self.sequence.fetch_add(1, Ordering::Relaxed) + 1);
        let event = ClientEvent::ResponseCreate(
            ResponseCreateEvent::new()
                .with_event_id(&event_id)
                .with_instructions(text)
                .with_modalities(self.modalities.clone()),
        );
        let frame = serde_json::to_string(&event)?;
        peer.send(frame).await.map_err(|e| {
            tracing::error!("failed to send message: {}", e);
            e
        })
    }

    /// Tears everything down. Idempotent and valid from any state.
    pub fn close(&self) {
        self.shared.mark_closed();
        self.shared.release();
        if let Some(pump) = self.shared.resources().pump.take() {
            pump.abort();
        }
    }
}

impl Drop for RealtimeConnection {
    fn drop(&mut self) {
        self.close();
    }
}

async fn pump_events(shared: Arc<Shared>, mut peer_events: mpsc::Receiver<PeerEvent>) {
    let mut reassembler = UtteranceReassembler::new();
    while let Some(event) = peer_events.recv().await {
        match event {
            PeerEvent::ChannelOpen | PeerEvent::Connected => shared.mark_ready(),
            PeerEvent::Frame(frame) => {
                if let Some(utterance) = reassembler.push_frame(&frame) {
                    tracing::debug!(
                        "utterance {} complete ({} chars)",
                        utterance.response_id,
                        utterance.text.len()
                    );
                    shared.publish(ConnectionEvent::Text {
                        text: utterance.text,
                        envelope: utterance.envelope,
                    });
                }
            }
            PeerEvent::RemoteAudio(audio) => {
                shared.host.sink.attach(audio);
                shared.resources().sink_attached = true;
                match shared.host.sink.play().await {
                    Ok(()) => {}
                    Err(PlaybackError::Blocked(detail)) => {
                        tracing::warn!("remote audio autoplay blocked: {}", detail);
                        shared.publish(ConnectionEvent::PlaybackBlocked(detail));
                    }
                    Err(PlaybackError::Media(detail)) => {
                        tracing::warn!("remote audio failed to play: {}", detail);
                    }
                }
            }
            PeerEvent::ChannelClosed => {
                shared.fail("control channel closed".to_string());
                break;
            }
            PeerEvent::Failed(reason) => {
                shared.fail(reason);
                break;
            }
        }
    }
    tracing::debug!("peer event stream ended");
}
