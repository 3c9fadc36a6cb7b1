//! Where session descriptors come from.
//!
//! Either the process negotiates directly with the realtime API using its own
//! key ([`NegotiatedSessions`]), or it asks a trusted endpoint that does so on
//! its behalf ([`SessionEndpoint`]).

use crate::config::Config;
use crate::error::SessionError;
use crate::instructions;
use crate::negotiator::{OpenAiSessions, SessionNegotiator};
use async_trait::async_trait;
use induction_realtime_types::session::{SessionErrorBody, SessionResponse};
use induction_realtime_types::{Playlist, SessionDescriptor, Voice};
#[cfg(test)]
use mockall::automock;

#[cfg_attr(test, automock)]
#[async_trait]
pub trait SessionSource: Send + Sync {
    /// Obtains a fresh descriptor for narrating `playlist`.
    async fn open_session(&self, playlist: &Playlist) -> Result<SessionDescriptor, SessionError>;
}

pub struct NegotiatedSessions {
    negotiator: SessionNegotiator,
    candidates: Vec<String>,
    voice: Voice,
}

impl NegotiatedSessions {
    pub fn new(negotiator: SessionNegotiator, candidates: Vec<String>, voice: Voice) -> Self {
        Self {
            negotiator,
            candidates,
            voice,
        }
    }

    pub fn from_config(config: &Config) -> Result<Self, SessionError> {
        let api = OpenAiSessions::from_config(config)?;
        Ok(Self::new(
            SessionNegotiator::new(api),
            config.candidate_models(),
            config.voice.clone(),
        ))
    }
}

#[async_trait]
impl SessionSource for NegotiatedSessions {
    async fn open_session(&self, playlist: &Playlist) -> Result<SessionDescriptor, SessionError> {
        let instructions = instructions::for_playlist(playlist);
        let descriptor = self
            .negotiator
            .create_session(&self.candidates, &instructions, &self.voice)
            .await?;
        Ok(descriptor)
    }
}

/// Fetches descriptors from `GET {url}?lang=<locale>&site=<site>`.
pub struct SessionEndpoint {
    client: reqwest::Client,
    url: String,
}

impl SessionEndpoint {
    pub fn new(url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.to_string(),
        }
    }
}

#[async_trait]
impl SessionSource for SessionEndpoint {
    async fn open_session(&self, playlist: &Playlist) -> Result<SessionDescriptor, SessionError> {
        let resp = self
            .client
            .get(&self.url)
            .query(&[("lang", playlist.locale()), ("site", playlist.site())])
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            let (message, details) = match serde_json::from_str::<SessionErrorBody>(&body) {
                Ok(err) => (err.error, err.details.map(|d| d.to_string())),
                Err(_) => (body.trim().to_string(), None),
            };
            tracing::warn!("session endpoint returned {}: {}", status, message);
            return Err(SessionError::Endpoint {
                status: status.as_u16(),
                message,
                details,
            });
        }

        let response = resp.json::<SessionResponse>().await?;
        Ok(SessionDescriptor::from_response(response, ""))
    }
}

/// Picks the endpoint when one is configured, local negotiation otherwise.
pub fn from_config(config: &Config) -> Result<Box<dyn SessionSource>, SessionError> {
    match &config.session_endpoint {
        Some(url) => Ok(Box::new(SessionEndpoint::new(url))),
        None => Ok(Box::new(NegotiatedSessions::from_config(config)?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigError;
    use crate::error::{HandshakeError, NegotiationError};
    use crate::negotiator::MockHandshakeApi;
    use induction_realtime_types::session::ClientSecret;
    use induction_realtime_types::PlaylistStep;
    use secrecy::ExposeSecret;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn playlist() -> Playlist {
        Playlist::new(
            "Harbour Depot",
            "es",
            vec![PlaylistStep::new("intro", "intro.mp4", "Bienvenido.")],
        )
    }

    #[tokio::test]
    async fn test_negotiated_sessions_send_trainer_instructions() {
        let mut api = MockHandshakeApi::new();
        api.expect_create_session()
            .withf(|r| {
                r.model() == "gpt-realtime"
                    && r.instructions().contains("Harbour Depot")
                    && r.instructions().contains("Spanish")
            })
            .times(1)
            .returning(|_| {
                Ok(SessionResponse {
                    client_secret: ClientSecret {
                        value: "ek_1".to_string(),
                        expires_at: None,
                    },
                    model: None,
                })
            });

        let source = NegotiatedSessions::new(
            SessionNegotiator::new(api),
            vec!["gpt-realtime".to_string()],
            Voice::Sage,
        );
        let descriptor = source.open_session(&playlist()).await.unwrap();
        assert_eq!(descriptor.model_id(), "gpt-realtime");
    }

    #[tokio::test]
    async fn test_negotiated_sessions_surface_negotiation_errors() {
        let mut api = MockHandshakeApi::new();
        api.expect_create_session().times(1).returning(|_| {
            Err(HandshakeError::Rejected {
                status: 401,
                detail: "bad key".to_string(),
            })
        });
        let source = NegotiatedSessions::new(
            SessionNegotiator::new(api),
            vec!["a".to_string(), "b".to_string()],
            Voice::Alloy,
        );
        let err = source.open_session(&playlist()).await.unwrap_err();
        assert!(matches!(
            err,
            SessionError::Negotiation(NegotiationError::Rejected { .. })
        ));
    }

    #[test]
    fn test_local_negotiation_needs_api_key() {
        let config = Config::from_lookup(|_| None).unwrap();
        let err = from_config(&config).err().unwrap();
        assert!(matches!(err, SessionError::Config(ConfigError::MissingVar(_))));
    }

    #[tokio::test]
    async fn test_endpoint_returns_descriptor() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/session"))
            .and(query_param("lang", "es"))
            .and(query_param("site", "Harbour Depot"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "client_secret": { "value": "ek_remote" },
                "model": "gpt-realtime",
            })))
            .expect(1)
            .mount(&server)
            .await;

        let source = SessionEndpoint::new(&format!("{}/session", server.uri()));
        let descriptor = source.open_session(&playlist()).await.unwrap();
        assert_eq!(descriptor.model_id(), "gpt-realtime");
        assert_eq!(descriptor.credential().expose_secret(), "ek_remote");
    }

    #[tokio::test]
    async fn test_endpoint_error_body_is_kept() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/session"))
            .respond_with(ResponseTemplate::new(502).set_body_json(serde_json::json!({
                "error": "all models failed",
                "details": ["gpt-realtime (404): not found"],
            })))
            .mount(&server)
            .await;

        let source = SessionEndpoint::new(&format!("{}/session", server.uri()));
        match source.open_session(&playlist()).await.unwrap_err() {
            SessionError::Endpoint {
                status,
                message,
                details,
            } => {
                assert_eq!(status, 502);
                assert_eq!(message, "all models failed");
                assert!(details.unwrap().contains("404"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
