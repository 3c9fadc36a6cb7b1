/// One playlist entry as served by a playlist source.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct StepDocument {
    pub id: String,
    pub src: String,
    pub line: String,
}

/// Per-language playlist document: `{ site, locale, playlist: [...] }`.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct PlaylistDocument {
    pub site: String,
    pub locale: String,
    pub playlist: Vec<StepDocument>,
}

/// Failure body a playlist source may send with a non-success status.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct PlaylistErrorBody {
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaylistStep {
    id: String,
    media_ref: String,
    line: String,
}

impl PlaylistStep {
    pub fn new(id: &str, media_ref: &str, line: &str) -> Self {
        Self {
            id: id.to_string(),
            media_ref: media_ref.to_string(),
            line: line.to_string(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn media_ref(&self) -> &str {
        &self.media_ref
    }

    pub fn line(&self) -> &str {
        &self.line
    }
}

/// An ordered, immutable sequence of steps for one site and locale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Playlist {
    site: String,
    locale: String,
    steps: Vec<PlaylistStep>,
}

impl Playlist {
    pub fn new(site: &str, locale: &str, steps: Vec<PlaylistStep>) -> Self {
        Self {
            site: site.to_string(),
            locale: locale.to_string(),
            steps,
        }
    }

    pub fn site(&self) -> &str {
        &self.site
    }

    pub fn locale(&self) -> &str {
        &self.locale
    }

    pub fn steps(&self) -> &[PlaylistStep] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn step(&self, index: usize) -> Option<&PlaylistStep> {
        self.steps.get(index)
    }

    /// Index of the step whose id matches `id`, ignoring case.
    pub fn position_of(&self, id: &str) -> Option<usize> {
        let needle = id.to_lowercase();
        self.steps
            .iter()
            .position(|step| step.id.to_lowercase() == needle)
    }
}

impl From<PlaylistDocument> for Playlist {
    fn from(doc: PlaylistDocument) -> Self {
        let steps = doc
            .playlist
            .into_iter()
            .map(|s| PlaylistStep {
                id: s.id,
                media_ref: s.src,
                line: s.line,
            })
            .collect();
        Self {
            site: doc.site,
            locale: doc.locale,
            steps,
        }
    }
}
