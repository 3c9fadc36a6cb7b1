use crate::audio::{Modality, Voice};
use secrecy::{ExposeSecret, SecretString};

/// Body of a model-selection handshake.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct SessionRequest {
    /// The realtime model this attempt asks for.
    model: String,

    /// System instructions the narrating agent follows for the whole session.
    instructions: String,

    /// The voice used for narration, ex: "alloy".
    voice: Voice,

    /// Output modalities. Narration needs audio; text keeps transcripts flowing.
    modalities: Vec<Modality>,
}

impl SessionRequest {
    pub fn builder(model: &str) -> SessionRequestBuilder {
        SessionRequestBuilder::new(model)
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn instructions(&self) -> &str {
        &self.instructions
    }

    pub fn voice(&self) -> &Voice {
        &self.voice
    }

    pub fn modalities(&self) -> &[Modality] {
        &self.modalities
    }
}

pub struct SessionRequestBuilder {
    request: SessionRequest,
}

impl SessionRequestBuilder {
    pub fn new(model: &str) -> Self {
        Self {
            request: SessionRequest {
                model: model.to_string(),
                instructions: String::new(),
                voice: Voice::default(),
                modalities: vec![Modality::Audio, Modality::Text],
            },
        }
    }

    pub fn with_instructions(mut self, instructions: &str) -> Self {
        self.request.instructions = instructions.to_string();
        self
    }

    pub fn with_voice(mut self, voice: Voice) -> Self {
        self.request.voice = voice;
        self
    }

    pub fn with_modalities(mut self, modalities: Vec<Modality>) -> Self {
        self.request.modalities = modalities;
        self
    }

    pub fn build(self) -> SessionRequest {
        self.request
    }
}

/// The secret handed back by a successful handshake.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ClientSecret {
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
}

/// Successful handshake payload. Also the shape a session endpoint relays.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct SessionResponse {
    pub client_secret: ClientSecret,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

/// Structured failure returned by a session endpoint.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct SessionErrorBody {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// Credential plus model id that a realtime connection is built from.
///
/// The credential expires on the remote side; nothing here tracks that.
#[derive(Debug)]
pub struct SessionDescriptor {
    credential: SecretString,
    model_id: String,
}

impl SessionDescriptor {
    pub fn new(credential: &str, model_id: &str) -> Self {
        Self {
            credential: SecretString::from(credential.to_string()),
            model_id: model_id.to_string(),
        }
    }

    /// Builds a descriptor from a handshake response, binding `requested_model`
    /// when the remote payload does not name one.
    pub fn from_response(response: SessionResponse, requested_model: &str) -> Self {
        let model_id = response
            .model
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| requested_model.to_string());
        Self {
            credential: SecretString::from(response.client_secret.value),
            model_id,
        }
    }

    pub fn credential(&self) -> &SecretString {
        &self.credential
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    pub fn has_credential(&self) -> bool {
        !self.credential.expose_secret().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_serializes_payload() {
        let request = SessionRequest::builder("gpt-realtime")
            .with_instructions("Read each line.")
            .with_voice(Voice::Verse)
            .build();
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "model": "gpt-realtime",
                "instructions": "Read each line.",
                "voice": "verse",
                "modalities": ["audio", "text"],
            })
        );
    }

    #[test]
    fn test_descriptor_fills_missing_model() {
        let response: SessionResponse =
            serde_json::from_str(r#"{"client_secret":{"value":"ek_123"}}"#).unwrap();
        let descriptor = SessionDescriptor::from_response(response, "gpt-4o-realtime-preview");
        assert_eq!(descriptor.model_id(), "gpt-4o-realtime-preview");
        assert_eq!(descriptor.credential().expose_secret(), "ek_123");
    }

    #[test]
    fn test_descriptor_keeps_remote_model() {
        let response: SessionResponse = serde_json::from_str(
            r#"{"client_secret":{"value":"ek_9","expires_at":1700000000},"model":"gpt-realtime-mini"}"#,
        )
        .unwrap();
        let descriptor = SessionDescriptor::from_response(response, "gpt-realtime");
        assert_eq!(descriptor.model_id(), "gpt-realtime-mini");
    }

    #[test]
    fn test_descriptor_debug_redacts_credential() {
        let descriptor = SessionDescriptor::new("ek_secret", "gpt-realtime");
        let debug = format!("{:?}", descriptor);
        assert!(!debug.contains("ek_secret"));
        assert!(descriptor.has_credential());
    }
}
