use crate::config::{Config, ConfigError};
use crate::error::{HandshakeError, ModelAttempt, NegotiationError};
use async_trait::async_trait;
use induction_realtime_types::session::SessionResponse;
use induction_realtime_types::{SessionDescriptor, SessionRequest, Voice};
#[cfg(test)]
use mockall::automock;
use secrecy::{ExposeSecret, SecretString};

/// Statuses that mean "this model will not do, try another". Anything else ends negotiation.
pub const RETRYABLE_STATUSES: [u16; 3] = [400, 404, 422];

/// One remote model-selection handshake.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait HandshakeApi: Send + Sync {
    async fn create_session(
        &self,
        request: &SessionRequest,
    ) -> Result<SessionResponse, HandshakeError>;
}

/// Walks an ordered list of candidate models until one accepts a session.
pub struct SessionNegotiator {
    api: Box<dyn HandshakeApi>,
}

impl SessionNegotiator {
    pub fn new<H: HandshakeApi + 'static>(api: H) -> Self {
        Self { api: Box::new(api) }
    }

    pub async fn create_session(
        &self,
        candidates: &[String],
        instructions: &str,
        voice: &Voice,
    ) -> Result<SessionDescriptor, NegotiationError> {
        if candidates.is_empty() {
            return Err(NegotiationError::NoModelConfigured);
        }

        let mut attempts: Vec<ModelAttempt> = Vec::new();
        for model in candidates {
            let request = SessionRequest::builder(model)
                .with_instructions(instructions)
                .with_voice(voice.clone())
                .build();

            tracing::debug!("requesting realtime session for model {}", model);
            match self.api.create_session(&request).await {
                Ok(response) => {
                    let descriptor = SessionDescriptor::from_response(response, model);
                    tracing::info!(
                        "realtime session created for model {} after {} failed attempt(s)",
                        descriptor.model_id(),
                        attempts.len()
                    );
                    return Ok(descriptor);
                }
                Err(HandshakeError::Rejected { status, detail }) => {
                    tracing::warn!("model {} rejected with status {}: {}", model, status, detail);
                    attempts.push(ModelAttempt {
                        model: model.clone(),
                        status: Some(status),
                        detail,
                    });
                    if !RETRYABLE_STATUSES.contains(&status) {
                        return Err(NegotiationError::Rejected { attempts });
                    }
                }
                Err(HandshakeError::Transport(detail)) => {
                    tracing::warn!("session request for model {} failed: {}", model, detail);
                    attempts.push(ModelAttempt {
                        model: model.clone(),
                        status: None,
                        detail,
                    });
                    return Err(NegotiationError::Rejected { attempts });
                }
            }
        }

        Err(NegotiationError::Exhausted { attempts })
    }
}

/// Builds the candidate list: explicit primary, explicit fallbacks, then
/// built-in defaults. Blank entries are skipped; first occurrence wins.
pub fn candidate_models(primary: Option<&str>, fallbacks: &[String], defaults: &[&str]) -> Vec<String> {
    let mut models: Vec<String> = Vec::new();
    let ordered = primary
        .into_iter()
        .chain(fallbacks.iter().map(String::as_str))
        .chain(defaults.iter().copied());
    for model in ordered {
        let model = model.trim();
        if model.is_empty() || models.iter().any(|m| m == model) {
            continue;
        }
        models.push(model.to_string());
    }
    models
}

/// Handshake against the OpenAI realtime sessions endpoint.
pub struct OpenAiSessions {
    client: reqwest::Client,
    base_url: String,
    api_key: SecretString,
}

impl OpenAiSessions {
    pub fn new(base_url: &str, api_key: SecretString) -> Result<Self, ConfigError> {
        if api_key.expose_secret().trim().is_empty() {
            return Err(ConfigError::MissingVar("OPENAI_API_KEY".to_string()));
        }
        Ok(Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let api_key = config
            .api_key
            .as_ref()
            .map(|key| SecretString::from(key.expose_secret().to_owned()))
            .ok_or_else(|| ConfigError::MissingVar("OPENAI_API_KEY".to_string()))?;
        Self::new(&config.base_url, api_key)
    }
}

#[async_trait]
impl HandshakeApi for OpenAiSessions {
    async fn create_session(
        &self,
        request: &SessionRequest,
    ) -> Result<SessionResponse, HandshakeError> {
        let resp = self
            .client
            .post(format!("{}/realtime/sessions", self.base_url))
            .bearer_auth(self.api_key.expose_secret())
            .json(request)
            .send()
            .await
            .map_err(|e| HandshakeError::Transport(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(HandshakeError::Rejected {
                status: status.as_u16(),
                detail: error_detail(&body),
            });
        }

        resp.json::<SessionResponse>()
            .await
            .map_err(|e| HandshakeError::Transport(format!("invalid session payload: {}", e)))
    }
}

/// Pulls `error.message` out of an API error body, falling back to the raw text.
fn error_detail(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|json| {
            json.get("error")
                .and_then(|e| e.get("message").or(Some(e)))
                .and_then(|m| m.as_str())
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use induction_realtime_types::session::ClientSecret;
    use mockall::Sequence;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn ok_response(secret: &str, model: Option<&str>) -> SessionResponse {
        SessionResponse {
            client_secret: ClientSecret {
                value: secret.to_string(),
                expires_at: None,
            },
            model: model.map(str::to_string),
        }
    }

    fn models(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[tokio::test]
    async fn test_falls_back_after_retryable_status() {
        let mut api = MockHandshakeApi::new();
        let mut seq = Sequence::new();
        api.expect_create_session()
            .withf(|r| r.model() == "model-a")
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| {
                Err(HandshakeError::Rejected {
                    status: 404,
                    detail: "model not found".to_string(),
                })
            });
        api.expect_create_session()
            .withf(|r| r.model() == "model-b" && r.instructions() == "narrate")
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(ok_response("ek_b", None)));

        let negotiator = SessionNegotiator::new(api);
        let descriptor = negotiator
            .create_session(&models(&["model-a", "model-b"]), "narrate", &Voice::Alloy)
            .await
            .unwrap();

        assert_eq!(descriptor.model_id(), "model-b");
        assert_eq!(descriptor.credential().expose_secret(), "ek_b");
    }

    #[tokio::test]
    async fn test_auth_failure_is_terminal() {
        let mut api = MockHandshakeApi::new();
        api.expect_create_session()
            .withf(|r| r.model() == "model-a")
            .times(1)
            .returning(|_| {
                Err(HandshakeError::Rejected {
                    status: 401,
                    detail: "invalid api key".to_string(),
                })
            });
        api.expect_create_session()
            .withf(|r| r.model() == "model-b")
            .times(0);

        let negotiator = SessionNegotiator::new(api);
        let err = negotiator
            .create_session(&models(&["model-a", "model-b"]), "", &Voice::Alloy)
            .await
            .unwrap_err();

        assert!(matches!(err, NegotiationError::Rejected { .. }));
        assert_eq!(err.diagnostic(), "model-a (401): invalid api key");
    }

    #[tokio::test]
    async fn test_empty_candidates_make_no_calls() {
        let mut api = MockHandshakeApi::new();
        api.expect_create_session().times(0);

        let negotiator = SessionNegotiator::new(api);
        let err = negotiator
            .create_session(&[], "", &Voice::Alloy)
            .await
            .unwrap_err();

        assert!(matches!(err, NegotiationError::NoModelConfigured));
        assert_eq!(err.to_string(), "no realtime model configured");
    }

    #[tokio::test]
    async fn test_exhaustion_aggregates_every_attempt() {
        let mut api = MockHandshakeApi::new();
        api.expect_create_session().times(2).returning(|r| {
            let status = if r.model() == "model-a" { 400 } else { 422 };
            Err(HandshakeError::Rejected {
                status,
                detail: format!("{} unavailable", r.model()),
            })
        });

        let negotiator = SessionNegotiator::new(api);
        let err = negotiator
            .create_session(&models(&["model-a", "model-b"]), "", &Voice::Alloy)
            .await
            .unwrap_err();

        assert!(matches!(err, NegotiationError::Exhausted { .. }));
        assert_eq!(err.attempts().len(), 2);
        assert_eq!(
            err.diagnostic(),
            "model-a (400): model-a unavailable; model-b (422): model-b unavailable"
        );
    }

    #[tokio::test]
    async fn test_transport_failure_stops_negotiation() {
        let mut api = MockHandshakeApi::new();
        api.expect_create_session()
            .times(1)
            .returning(|_| Err(HandshakeError::Transport("connection refused".to_string())));

        let negotiator = SessionNegotiator::new(api);
        let err = negotiator
            .create_session(&models(&["model-a", "model-b"]), "", &Voice::Alloy)
            .await
            .unwrap_err();

        assert_eq!(err.diagnostic(), "model-a (no status): connection refused");
    }

    #[test]
    fn test_candidate_models_dedup_in_order() {
        let fallbacks = models(&["b", " a ", "", "c"]);
        assert_eq!(
            candidate_models(Some("a"), &fallbacks, &["c", "d"]),
            vec!["a", "b", "c", "d"]
        );
        assert_eq!(candidate_models(None, &[], &[]), Vec::<String>::new());
    }

    #[test]
    fn test_missing_api_key_fails_fast() {
        let result = OpenAiSessions::new("https://api.openai.com/v1", SecretString::from(String::new()));
        assert!(matches!(result, Err(ConfigError::MissingVar(_))));
    }

    #[tokio::test]
    async fn test_http_handshake_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/realtime/sessions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(serde_json::json!({
                "model": "gpt-realtime",
                "voice": "alloy",
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "sess_1",
                "object": "realtime.session",
                "client_secret": { "value": "ek_abc", "expires_at": 1700000000 },
            })))
            .expect(1)
            .mount(&server)
            .await;

        let api = OpenAiSessions::new(&server.uri(), SecretString::from("sk-test".to_string())).unwrap();
        let negotiator = SessionNegotiator::new(api);
        let descriptor = negotiator
            .create_session(&models(&["gpt-realtime"]), "narrate", &Voice::Alloy)
            .await
            .unwrap();

        assert_eq!(descriptor.model_id(), "gpt-realtime");
        assert_eq!(descriptor.credential().expose_secret(), "ek_abc");
    }

    #[tokio::test]
    async fn test_http_handshake_reports_status_and_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/realtime/sessions"))
            .respond_with(ResponseTemplate::new(404).set_body_json(serde_json::json!({
                "error": { "message": "The model `old-rt` does not exist.", "type": "invalid_request_error" }
            })))
            .mount(&server)
            .await;

        let api = OpenAiSessions::new(&server.uri(), SecretString::from("sk-test".to_string())).unwrap();
        let request = SessionRequest::builder("old-rt").build();
        let err = api.create_session(&request).await.unwrap_err();

        match err {
            HandshakeError::Rejected { status, detail } => {
                assert_eq!(status, 404);
                assert_eq!(detail, "The model `old-rt` does not exist.");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_error_detail_fallbacks() {
        assert_eq!(error_detail(r#"{"error":"quota exceeded"}"#), "quota exceeded");
        assert_eq!(error_detail(" upstream timeout \n"), "upstream timeout");
    }
}
