use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Narrated by the trainer.
    Trainer,
    /// Status lines from the controller.
    System,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TranscriptEntry {
    pub id: u64,
    pub role: Role,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

/// Append-only, in-memory log of what was said and what happened.
#[derive(Debug, Default)]
pub struct TranscriptLog {
    entries: Vec<TranscriptEntry>,
    next_id: u64,
}

impl TranscriptLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, role: Role, text: &str) -> &TranscriptEntry {
        self.next_id += 1;
        tracing::debug!("transcript {:?}: {}", role, text);
        self.entries.push(TranscriptEntry {
            id: self.next_id,
            role,
            text: text.to_string(),
            timestamp: Utc::now(),
        });
        &self.entries[self.entries.len() - 1]
    }

    pub fn entries(&self) -> &[TranscriptEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drops every entry. Ids keep increasing so they stay unique across sessions.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entries_are_ordered_with_unique_ids() {
        let mut log = TranscriptLog::new();
        log.append(Role::System, "Session started.");
        log.append(Role::Trainer, "Welcome to the site.");
        assert_eq!(log.len(), 2);
        assert_eq!(log.entries()[0].role, Role::System);
        assert_eq!(log.entries()[1].text, "Welcome to the site.");
        assert!(log.entries()[0].timestamp <= log.entries()[1].timestamp);

        log.clear();
        assert!(log.is_empty());
        let id = log.append(Role::System, "Again.").id;
        assert_eq!(id, 3);
    }

    #[test]
    fn test_entry_serializes_role_lowercase() {
        let mut log = TranscriptLog::new();
        let entry = log.append(Role::Trainer, "Hi").clone();
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["role"], "trainer");
        assert_eq!(json["id"], 1);
    }
}
