use crate::audio::Modality;

/// `response.create` event. Asks the agent to produce a response from an instruction.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ResponseCreateEvent {
    #[serde(skip_serializing_if = "Option::is_none")]
    event_id: Option<String>,

    response: ResponseOptions,
}

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct ResponseOptions {
    /// Instructions for this response only; the session instructions still apply.
    #[serde(skip_serializing_if = "Option::is_none")]
    instructions: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    modalities: Option<Vec<Modality>>,
}

impl ResponseCreateEvent {
    pub fn new() -> Self {
        Self {
            event_id: None,
            response: ResponseOptions::default(),
        }
    }

    pub fn with_event_id(mut self, event_id: &str) -> Self {
        self.event_id = Some(event_id.to_string());
        self
    }

    pub fn with_instructions(mut self, instructions: &str) -> Self {
        self.response.instructions = Some(instructions.to_string());
        self
    }

    pub fn with_modalities(mut self, modalities: Vec<Modality>) -> Self {
        self.response.modalities = Some(modalities);
        self
    }

    pub fn instructions(&self) -> Option<&str> {
        self.response.instructions.as_deref()
    }

    pub fn modalities(&self) -> Option<&[Modality]> {
        self.response.modalities.as_deref()
    }
}

impl Default for ResponseCreateEvent {
    fn default() -> Self {
        Self::new()
    }
}
