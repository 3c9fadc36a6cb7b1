pub mod client;
pub mod server;

use client::*;
use server::*;

/// Events sent to the remote agent over the control channel.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type")]
pub enum ClientEvent {
    #[serde(rename = "response.create")]
    ResponseCreate(ResponseCreateEvent),
}

/// Events received from the remote agent over the control channel.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type")]
pub enum ServerEvent {
    #[serde(rename = "error")]
    Error(ErrorEvent),
    #[serde(rename = "session.created")]
    SessionCreated(SessionEvent),
    #[serde(rename = "session.updated")]
    SessionUpdated(SessionEvent),
    #[serde(rename = "response.created")]
    ResponseCreated(ResponseEnvelopeEvent),
    #[serde(rename = "response.done")]
    ResponseDone(ResponseEnvelopeEvent),
    #[serde(rename = "response.text.delta")]
    ResponseTextDelta(TextDeltaEvent),
    #[serde(rename = "response.text.done")]
    ResponseTextDone(TextDoneEvent),
    #[serde(rename = "response.audio_transcript.delta")]
    ResponseAudioTranscriptDelta(TextDeltaEvent),
    #[serde(rename = "response.audio_transcript.done")]
    ResponseAudioTranscriptDone(TextDoneEvent),
    /// Any event type this crate does not route.
    #[serde(other)]
    Other,
}
