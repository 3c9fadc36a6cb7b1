pub mod client;
pub mod command;
pub mod config;
pub mod error;
pub mod host;
pub mod instructions;
pub mod negotiator;
pub mod playback;
pub mod playlist;
pub mod reassembler;
pub mod session;
pub mod transcript;

pub use induction_realtime_types as types;

pub use client::{ConnectionEvent, ConnectionState, EventRx, RealtimeConnection};
pub use command::{parse, strip_markers, Directive};
pub use config::Config;
pub use negotiator::SessionNegotiator;
pub use playback::{MediaTracks, PlaybackController, PlaybackMode, PlaybackState};
pub use reassembler::{UtteranceComplete, UtteranceReassembler};
