use crate::error::PlaylistError;
use async_trait::async_trait;
use induction_realtime_types::playlist::PlaylistErrorBody;
use induction_realtime_types::{Playlist, PlaylistDocument};
use std::path::PathBuf;

/// Loads the playlist for one language.
#[async_trait]
pub trait PlaylistSource: Send + Sync {
    async fn load(&self, language: &str) -> Result<Playlist, PlaylistError>;
}

fn into_playlist(doc: PlaylistDocument) -> Result<Playlist, PlaylistError> {
    let playlist = Playlist::from(doc);
    if playlist.is_empty() {
        return Err(PlaylistError::Empty);
    }
    tracing::info!(
        "loaded {} step(s) for {} ({})",
        playlist.len(),
        playlist.site(),
        playlist.locale()
    );
    Ok(playlist)
}

/// `GET {base}?lang=<code>`.
pub struct HttpPlaylistSource {
    client: reqwest::Client,
    base_url: String,
}

impl HttpPlaylistSource {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.to_string(),
        }
    }
}

#[async_trait]
impl PlaylistSource for HttpPlaylistSource {
    async fn load(&self, language: &str) -> Result<Playlist, PlaylistError> {
        let resp = self
            .client
            .get(&self.base_url)
            .query(&[("lang", language)])
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            let message = serde_json::from_str::<PlaylistErrorBody>(&body)
                .ok()
                .and_then(|b| b.error)
                .unwrap_or_else(|| format!("Failed to load playlist for {}", language));
            return Err(PlaylistError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        into_playlist(resp.json::<PlaylistDocument>().await?)
    }
}

/// Reads `<dir>/<code>.json`.
pub struct FilePlaylistSource {
    dir: PathBuf,
}

impl FilePlaylistSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl PlaylistSource for FilePlaylistSource {
    async fn load(&self, language: &str) -> Result<Playlist, PlaylistError> {
        let path = self.dir.join(format!("{}.json", language));
        let raw = tokio::fs::read_to_string(&path)
            .await
            .map_err(|source| PlaylistError::Io {
                path: path.display().to_string(),
                source,
            })?;
        into_playlist(serde_json::from_str::<PlaylistDocument>(&raw)?)
    }
}

/// URLs are fetched over HTTP; anything else is treated as a directory.
pub fn from_source(source: &str) -> Box<dyn PlaylistSource> {
    if source.starts_with("http://") || source.starts_with("https://") {
        Box::new(HttpPlaylistSource::new(source))
    } else {
        Box::new(FilePlaylistSource::new(source))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn document() -> serde_json::Value {
        serde_json::json!({
            "site": "North Quarry",
            "locale": "en",
            "playlist": [
                { "id": "intro", "src": "clips/intro.mp4", "line": "Welcome to North Quarry." },
                { "id": "ppe", "src": "clips/ppe.mp4", "line": "Always wear your hard hat." },
            ],
        })
    }

    #[tokio::test]
    async fn test_http_source_loads_document() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("lang", "en"))
            .respond_with(ResponseTemplate::new(200).set_body_json(document()))
            .expect(1)
            .mount(&server)
            .await;

        let playlist = HttpPlaylistSource::new(&server.uri()).load("en").await.unwrap();
        assert_eq!(playlist.site(), "North Quarry");
        assert_eq!(playlist.len(), 2);
        assert_eq!(playlist.step(1).unwrap().media_ref(), "clips/ppe.mp4");
    }

    #[tokio::test]
    async fn test_http_source_uses_error_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(404)
                    .set_body_json(serde_json::json!({ "error": "Unknown language: xx" })),
            )
            .mount(&server)
            .await;

        let err = HttpPlaylistSource::new(&server.uri()).load("xx").await.unwrap_err();
        assert!(matches!(
            err,
            PlaylistError::Rejected { status: 404, ref message } if message == "Unknown language: xx"
        ));
    }

    #[tokio::test]
    async fn test_file_source_reads_language_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("en.json"), document().to_string()).unwrap();

        let source = from_source(dir.path().to_str().unwrap());
        let playlist = source.load("en").await.unwrap();
        assert_eq!(playlist.step(0).unwrap().id(), "intro");

        let err = source.load("de").await.unwrap_err();
        assert!(matches!(err, PlaylistError::Io { .. }));
    }

    #[tokio::test]
    async fn test_empty_playlist_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("en.json"),
            r#"{"site":"s","locale":"en","playlist":[]}"#,
        )
        .unwrap();

        let err = FilePlaylistSource::new(dir.path()).load("en").await.unwrap_err();
        assert!(matches!(err, PlaylistError::Empty));
    }
}
