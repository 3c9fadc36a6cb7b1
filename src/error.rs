use crate::client::ConnectionState;
use crate::config::ConfigError;
use std::fmt;

/// A failure that can be shown to a person: a short summary, plus technical
/// detail a UI may choose to hide.
pub trait UserFacing {
    fn summary(&self) -> String;
    fn detail(&self) -> Option<String>;
}

/// One failed handshake against a candidate model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelAttempt {
    pub model: String,
    pub status: Option<u16>,
    pub detail: String,
}

impl fmt::Display for ModelAttempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => write!(f, "{} ({}): {}", self.model, status, self.detail),
            None => write!(f, "{} (no status): {}", self.model, self.detail),
        }
    }
}

fn summarize(attempts: &[ModelAttempt]) -> String {
    attempts
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Failure of a single handshake attempt.
#[derive(Debug, thiserror::Error)]
pub enum HandshakeError {
    #[error("handshake rejected with status {status}: {detail}")]
    Rejected { status: u16, detail: String },
    #[error("handshake request failed: {0}")]
    Transport(String),
}

#[derive(Debug, thiserror::Error)]
pub enum NegotiationError {
    #[error("no realtime model configured")]
    NoModelConfigured,
    #[error("session negotiation stopped: {}", summarize(.attempts))]
    Rejected { attempts: Vec<ModelAttempt> },
    #[error("no candidate model accepted the session: {}", summarize(.attempts))]
    Exhausted { attempts: Vec<ModelAttempt> },
}

impl NegotiationError {
    pub fn attempts(&self) -> &[ModelAttempt] {
        match self {
            NegotiationError::NoModelConfigured => &[],
            NegotiationError::Rejected { attempts } | NegotiationError::Exhausted { attempts } => {
                attempts
            }
        }
    }

    /// Every attempted model with its status and detail, joined into one line.
    pub fn diagnostic(&self) -> String {
        summarize(self.attempts())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("cannot {operation} while {state:?}")]
    InvalidState {
        operation: &'static str,
        state: ConnectionState,
    },
    #[error("control channel not ready")]
    NotReady,
    #[error("audio capture unavailable: {0}")]
    Capture(String),
    #[error("signaling failed: {0}")]
    Signaling(String),
    #[error("signaling rejected with status {status}: {detail}")]
    SignalingRejected { status: u16, detail: String },
    #[error("transport failure: {0}")]
    Peer(String),
    #[error("connection closed")]
    Closed,
    #[error("failed to encode client event: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Negotiation(#[from] NegotiationError),
    #[error("session endpoint returned {status}: {message}")]
    Endpoint {
        status: u16,
        message: String,
        details: Option<String>,
    },
    #[error("session endpoint request failed: {0}")]
    Request(#[from] reqwest::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum PlaylistError {
    #[error("playlist request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("{message}")]
    Rejected { status: u16, message: String },
    #[error("failed to read playlist {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid playlist document: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("playlist has no steps")]
    Empty,
}

/// Media element failures. `Blocked` is the runtime refusing autoplay and is recoverable.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlaybackError {
    #[error("playback blocked: {0}")]
    Blocked(String),
    #[error("media error: {0}")]
    Media(String),
}

#[derive(Debug, thiserror::Error)]
pub enum StartError {
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("session was stopped before it finished starting")]
    Cancelled,
}

impl UserFacing for StartError {
    fn summary(&self) -> String {
        match self {
            StartError::Session(_) => "Could not start the narrated session.".to_string(),
            StartError::Transport(_) => "Could not connect to the narrator.".to_string(),
            StartError::Cancelled => "Session start was cancelled.".to_string(),
        }
    }

    fn detail(&self) -> Option<String> {
        match self {
            StartError::Session(e) => Some(e.to_string()),
            StartError::Transport(e) => Some(e.to_string()),
            StartError::Cancelled => None,
        }
    }
}

impl UserFacing for PlaylistError {
    fn summary(&self) -> String {
        match self {
            PlaylistError::Rejected { message, .. } => message.clone(),
            _ => "Could not load the playlist.".to_string(),
        }
    }

    fn detail(&self) -> Option<String> {
        match self {
            PlaylistError::Rejected { status, .. } => Some(format!("status {}", status)),
            other => Some(other.to_string()),
        }
    }
}

impl UserFacing for PlaybackError {
    fn summary(&self) -> String {
        match self {
            PlaybackError::Blocked(_) => "Playback is paused until you interact with the page.".to_string(),
            PlaybackError::Media(_) => "The clip could not be played.".to_string(),
        }
    }

    fn detail(&self) -> Option<String> {
        match self {
            PlaybackError::Blocked(d) | PlaybackError::Media(d) => Some(d.clone()),
        }
    }
}
