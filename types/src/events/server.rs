/// `error` event
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ErrorEvent {
    #[serde(default)]
    event_id: String,

    /// Details about the error
    error: ErrorDetails,
}

impl ErrorEvent {
    pub fn event_id(&self) -> &str {
        &self.event_id
    }

    pub fn error(&self) -> &ErrorDetails {
        &self.error
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ErrorDetails {
    #[serde(rename = "type")]
    error_type: String,
    code: Option<String>,
    message: String,
    param: Option<String>,
}

impl ErrorDetails {
    pub fn error_type(&self) -> &str {
        &self.error_type
    }

    pub fn code(&self) -> Option<&str> {
        self.code.as_deref()
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn param(&self) -> Option<&str> {
        self.param.as_deref()
    }
}

/// `session.created` / `session.updated` event. The session body is passed through untouched.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct SessionEvent {
    #[serde(default)]
    event_id: String,
    session: serde_json::Value,
}

impl SessionEvent {
    pub fn event_id(&self) -> &str {
        &self.event_id
    }

    pub fn session(&self) -> &serde_json::Value {
        &self.session
    }
}

/// `response.created` / `response.done` event
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ResponseEnvelopeEvent {
    #[serde(default)]
    event_id: String,

    /// The response resource
    response: ResponseResource,
}

impl ResponseEnvelopeEvent {
    pub fn event_id(&self) -> &str {
        &self.event_id
    }

    pub fn response(&self) -> &ResponseResource {
        &self.response
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ResponseResource {
    /// The unique ID of the response
    #[serde(default)]
    id: Option<String>,

    /// "in_progress", "completed", "cancelled", "failed", "incomplete"
    #[serde(default)]
    status: Option<String>,

    #[serde(default)]
    status_details: Option<serde_json::Value>,
}

impl ResponseResource {
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn status(&self) -> Option<&str> {
        self.status.as_deref()
    }

    pub fn status_details(&self) -> Option<&serde_json::Value> {
        self.status_details.as_ref()
    }
}

/// `response.text.delta` / `response.audio_transcript.delta` event
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct TextDeltaEvent {
    #[serde(default)]
    event_id: String,

    /// The ID of the response the fragment belongs to
    response_id: String,

    #[serde(default)]
    item_id: Option<String>,

    #[serde(default)]
    output_index: Option<u32>,

    #[serde(default)]
    content_index: Option<u32>,

    /// The text fragment
    delta: String,
}

impl TextDeltaEvent {
    pub fn event_id(&self) -> &str {
        &self.event_id
    }

    pub fn response_id(&self) -> &str {
        &self.response_id
    }

    pub fn item_id(&self) -> Option<&str> {
        self.item_id.as_deref()
    }

    pub fn output_index(&self) -> Option<u32> {
        self.output_index
    }

    pub fn content_index(&self) -> Option<u32> {
        self.content_index
    }

    pub fn delta(&self) -> &str {
        &self.delta
    }
}

/// `response.text.done` / `response.audio_transcript.done` event
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct TextDoneEvent {
    #[serde(default)]
    event_id: String,

    response_id: String,

    #[serde(default)]
    item_id: Option<String>,

    /// Final text as reported by the server. Named `transcript` on audio transcript events.
    #[serde(default, alias = "transcript")]
    text: Option<String>,
}

impl TextDoneEvent {
    pub fn event_id(&self) -> &str {
        &self.event_id
    }

    pub fn response_id(&self) -> &str {
        &self.response_id
    }

    pub fn item_id(&self) -> Option<&str> {
        self.item_id.as_deref()
    }

    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use crate::ServerEvent;

    #[test]
    fn test_audio_transcript_done_reads_transcript_field() {
        let event: ServerEvent = serde_json::from_str(
            r#"{"type":"response.audio_transcript.done","event_id":"ev_1","response_id":"resp_1","item_id":"item_1","transcript":"Hello"}"#,
        )
        .unwrap();
        match event {
            ServerEvent::ResponseAudioTranscriptDone(done) => {
                assert_eq!(done.response_id(), "resp_1");
                assert_eq!(done.text(), Some("Hello"));
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_response_done_exposes_nested_id() {
        let event: ServerEvent = serde_json::from_str(
            r#"{"type":"response.done","event_id":"ev_2","response":{"id":"resp_7","status":"completed","output":[]}}"#,
        )
        .unwrap();
        match event {
            ServerEvent::ResponseDone(done) => {
                assert_eq!(done.response().id(), Some("resp_7"));
                assert_eq!(done.response().status(), Some("completed"));
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_unrouted_event_type_is_other() {
        let event: ServerEvent = serde_json::from_str(
            r#"{"type":"rate_limits.updated","event_id":"ev_3","rate_limits":[]}"#,
        )
        .unwrap();
        assert!(matches!(event, ServerEvent::Other));
    }
}
