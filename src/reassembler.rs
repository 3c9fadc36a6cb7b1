use induction_realtime_types::ServerEvent;
use std::collections::HashMap;

/// A narrated response whose fragments have all arrived.
#[derive(Debug, Clone, PartialEq)]
pub struct UtteranceComplete {
    pub response_id: String,
    pub text: String,
    /// The raw frame that completed the utterance.
    pub envelope: serde_json::Value,
}

/// Rebuilds whole utterances from streamed text fragments, keyed by response id.
///
/// Buffers exist only between the first fragment and the completion signal,
/// so memory is bounded by the number of responses in flight.
#[derive(Debug, Default)]
pub struct UtteranceReassembler {
    buffers: HashMap<String, String>,
}

impl UtteranceReassembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Routes one raw control-channel frame. Frames that are not valid events
    /// are dropped with a warning.
    pub fn push_frame(&mut self, frame: &str) -> Option<UtteranceComplete> {
        let envelope = match serde_json::from_str::<serde_json::Value>(frame) {
            Ok(json) => json,
            Err(e) => {
                tracing::warn!("dropping unparsable frame: {}, text=> {:?}", e, frame);
                return None;
            }
        };
        let event = match serde_json::from_value::<ServerEvent>(envelope.clone()) {
            Ok(event) => event,
            Err(e) => {
                let event_type = envelope.get("type").and_then(|v| v.as_str());
                tracing::warn!(
                    "dropping malformed event: {}, type=> {}",
                    e,
                    event_type.unwrap_or("unknown")
                );
                return None;
            }
        };
        self.push(&event, envelope)
    }

    /// Routes one decoded event; `envelope` is carried into the completion.
    pub fn push(
        &mut self,
        event: &ServerEvent,
        envelope: serde_json::Value,
    ) -> Option<UtteranceComplete> {
        match event {
            ServerEvent::ResponseTextDelta(delta)
            | ServerEvent::ResponseAudioTranscriptDelta(delta) => {
                self.buffers
                    .entry(delta.response_id().to_string())
                    .or_default()
                    .push_str(delta.delta());
                None
            }
            ServerEvent::ResponseTextDone(done) | ServerEvent::ResponseAudioTranscriptDone(done) => {
                self.complete(done.response_id(), envelope)
            }
            ServerEvent::ResponseDone(done) => match done.response().id() {
                Some(id) => self.complete(id, envelope),
                None => {
                    tracing::debug!("response.done without a response id");
                    None
                }
            },
            ServerEvent::Error(err) => {
                let details = err.error();
                tracing::warn!(
                    "server error {}: {}",
                    details.code().unwrap_or(details.error_type()),
                    details.message()
                );
                None
            }
            ServerEvent::Other => {
                tracing::debug!(
                    "ignoring event type {}",
                    envelope.get("type").and_then(|v| v.as_str()).unwrap_or("unknown")
                );
                None
            }
            _ => None,
        }
    }

    pub fn in_flight(&self) -> usize {
        self.buffers.len()
    }

    fn complete(&mut self, response_id: &str, envelope: serde_json::Value) -> Option<UtteranceComplete> {
        let text = self.buffers.remove(response_id)?;
        if text.is_empty() {
            tracing::debug!("utterance {} completed without text", response_id);
            return None;
        }
        Some(UtteranceComplete {
            response_id: response_id.to_string(),
            text,
            envelope,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn delta(id: &str, fragment: &str) -> String {
        serde_json::json!({
            "type": "response.audio_transcript.delta",
            "event_id": "ev",
            "response_id": id,
            "item_id": "item",
            "output_index": 0,
            "content_index": 0,
            "delta": fragment,
        })
        .to_string()
    }

    fn transcript_done(id: &str) -> String {
        serde_json::json!({
            "type": "response.audio_transcript.done",
            "response_id": id,
            "transcript": "ignored",
        })
        .to_string()
    }

    fn response_done(id: &str) -> String {
        serde_json::json!({
            "type": "response.done",
            "response": { "id": id, "status": "completed" },
        })
        .to_string()
    }

    #[test]
    fn test_fragments_complete_once() {
        let mut reassembler = UtteranceReassembler::new();
        assert_eq!(reassembler.push_frame(&delta("u1", "Hel")), None);
        assert_eq!(reassembler.push_frame(&delta("u1", "lo")), None);

        let completed = reassembler.push_frame(&transcript_done("u1")).unwrap();
        assert_eq!(completed.text, "Hello");
        assert_eq!(completed.response_id, "u1");
        assert_eq!(completed.envelope["type"], "response.audio_transcript.done");

        // The envelope that follows the explicit done finds nothing to flush.
        assert_eq!(reassembler.push_frame(&response_done("u1")), None);
        assert_eq!(reassembler.in_flight(), 0);
    }

    #[test]
    fn test_envelope_completion_uses_nested_id() {
        let mut reassembler = UtteranceReassembler::new();
        reassembler.push_frame(&delta("resp_2", "Put on your gloves. [NEXT]"));
        let completed = reassembler.push_frame(&response_done("resp_2")).unwrap();
        assert_eq!(completed.text, "Put on your gloves. [NEXT]");
        assert_eq!(completed.envelope["response"]["id"], "resp_2");
    }

    #[test]
    fn test_completion_for_unknown_id_is_silent() {
        let mut reassembler = UtteranceReassembler::new();
        assert_eq!(reassembler.push_frame(&transcript_done("ghost")), None);
        assert_eq!(reassembler.push_frame(&response_done("ghost")), None);
    }

    #[test]
    fn test_interleaved_utterances_stay_separate() {
        let mut reassembler = UtteranceReassembler::new();
        reassembler.push_frame(&delta("a", "one "));
        reassembler.push_frame(&delta("b", "two "));
        reassembler.push_frame(&delta("a", "three"));
        assert_eq!(reassembler.in_flight(), 2);
        assert_eq!(reassembler.push_frame(&response_done("b")).unwrap().text, "two ");
        assert_eq!(reassembler.push_frame(&response_done("a")).unwrap().text, "one three");
    }

    #[test]
    fn test_malformed_frames_are_dropped() {
        let mut reassembler = UtteranceReassembler::new();
        assert_eq!(reassembler.push_frame("not json"), None);
        assert_eq!(
            reassembler.push_frame(r#"{"type":"response.text.delta","delta":"no id"}"#),
            None
        );
        assert_eq!(reassembler.push_frame(r#"{"type":"rate_limits.updated"}"#), None);
        assert_eq!(
            reassembler.push_frame(
                r#"{"type":"error","error":{"type":"invalid_request_error","message":"bad"}}"#
            ),
            None
        );
        assert_eq!(reassembler.in_flight(), 0);
    }

    #[test]
    fn test_empty_utterance_emits_nothing() {
        let mut reassembler = UtteranceReassembler::new();
        reassembler.push_frame(&delta("quiet", ""));
        assert_eq!(reassembler.push_frame(&response_done("quiet")), None);
        assert_eq!(reassembler.in_flight(), 0);
    }
}
