use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};

/// Live observers that fall further behind than this lose the oldest updates
const UPDATE_BUFFER: usize = 256;

/// Who said it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    /// Recognized speech of the student
    User,
    /// The coach's spoken reply
    Model,
}

impl Speaker {
    /// Prefix the UI groups entries by
    pub fn label(self) -> &'static str {
        match self {
            Speaker::User => "You",
            Speaker::Model => "Maestro",
        }
    }
}

/// A single transcript fragment, exactly as it arrived
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub speaker: Speaker,

    /// Fragment text
    pub text: String,

    /// When this fragment was received
    pub received_at: DateTime<Utc>,
}

impl TranscriptEntry {
    pub fn display(&self) -> String {
        format!("{}: {}", self.speaker.label(), self.text)
    }
}

/// Append-only, arrival-ordered transcript
///
/// Fragments are never merged or deduplicated; a continuation of the same
/// utterance is a new entry.
#[derive(Clone)]
pub struct TranscriptLog {
    entries: Arc<Mutex<Vec<TranscriptEntry>>>,
    updates: broadcast::Sender<TranscriptEntry>,
}

impl TranscriptLog {
    pub fn new() -> Self {
        let (updates, _) = broadcast::channel(UPDATE_BUFFER);
        Self {
            entries: Arc::new(Mutex::new(Vec::new())),
            updates,
        }
    }

    /// Append a fragment and notify observers
    pub async fn append(&self, speaker: Speaker, text: impl Into<String>) -> TranscriptEntry {
        let entry = TranscriptEntry {
            speaker,
            text: text.into(),
            received_at: Utc::now(),
        };

        {
            let mut entries = self.entries.lock().await;
            entries.push(entry.clone());
        }

        // No subscribers is fine
        let _ = self.updates.send(entry.clone());

        entry
    }

    /// Copy of the whole log
    pub async fn snapshot(&self) -> Vec<TranscriptEntry> {
        let entries = self.entries.lock().await;
        entries.clone()
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    /// Receive every entry appended from now on
    pub fn subscribe(&self) -> broadcast::Receiver<TranscriptEntry> {
        self.updates.subscribe()
    }
}

impl Default for TranscriptLog {
    fn default() -> Self {
        Self::new()
    }
}
