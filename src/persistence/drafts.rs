//! Local draft cache
//!
//! Mirrors the live segments and speakers of a transcript so unsaved work
//! survives a crash. Each draft lives under the key `transcript:{videoId}`,
//! stored as one JSON file per key.

use crate::config::DraftConfig;
use crate::error::DraftError;
use crate::segments::Segment;
use crate::speakers::Speaker;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info};

/// Cache key for a video's draft
pub fn draft_key(video_id: &str) -> String {
    format!("transcript:{video_id}")
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Draft {
    pub segments: Vec<Segment>,
    pub speakers: Vec<Speaker>,
    pub last_saved: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct DraftCache {
    dir: PathBuf,
}

impl DraftCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Configured directory, or the platform data directory
    pub fn from_config(config: &DraftConfig) -> Result<Self, DraftError> {
        let dir = match &config.directory {
            Some(dir) => dir.clone(),
            None => dirs::data_dir()
                .ok_or(DraftError::NoDataDir)?
                .join("transcript-annotator")
                .join("drafts"),
        };
        Ok(Self::new(dir))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File backing a key. Characters outside `[A-Za-z0-9.-]` are hex-escaped
    /// so distinct keys never share a file.
    fn path_for(&self, video_id: &str) -> PathBuf {
        let mut file_name = String::new();
        for c in draft_key(video_id).chars() {
            if c.is_ascii_alphanumeric() || c == '-' || c == '.' {
                file_name.push(c);
            } else {
                file_name.push_str(&format!("_{:x}_", c as u32));
            }
        }
        file_name.push_str(".json");
        self.dir.join(file_name)
    }

    pub fn load(&self, video_id: &str) -> Result<Option<Draft>, DraftError> {
        let path = self.path_for(video_id);
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(DraftError::Read { path, source: e }),
        };
        let draft: Draft =
            serde_json::from_str(&raw).map_err(|e| DraftError::Json { path: path.clone(), source: e })?;
        debug!(?path, segments = draft.segments.len(), "Loaded draft");
        Ok(Some(draft))
    }

    /// Write atomically: a temp file in the same directory is persisted over the target.
    pub fn store(&self, video_id: &str, draft: &Draft) -> Result<(), DraftError> {
        if !self.dir.exists() {
            fs::create_dir_all(&self.dir).map_err(|e| DraftError::CreateDirectory {
                path: self.dir.clone(),
                source: e,
            })?;
            info!("Created draft directory: {:?}", self.dir);
        }

        let path = self.path_for(video_id);
        let json = serde_json::to_string(draft).map_err(|e| DraftError::Json {
            path: path.clone(),
            source: e,
        })?;
        let write_error = |source: std::io::Error| DraftError::Write {
            path: path.clone(),
            source,
        };

        let mut temp = NamedTempFile::new_in(&self.dir).map_err(write_error)?;
        temp.write_all(json.as_bytes()).map_err(write_error)?;
        temp.flush().map_err(write_error)?;
        temp.persist(&path).map_err(|e| write_error(e.error))?;

        debug!(?path, segments = draft.segments.len(), "Stored draft");
        Ok(())
    }

    /// Remove a draft. Returns whether one existed.
    pub fn invalidate(&self, video_id: &str) -> Result<bool, DraftError> {
        let path = self.path_for(video_id);
        match fs::remove_file(&path) {
            Ok(()) => {
                info!(?path, "Invalidated draft");
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(DraftError::Remove { path, source: e }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segments::SegmentId;
    use crate::speakers::{SpeakerId, SpeakerRole};
    use tempfile::tempdir;

    fn draft() -> Draft {
        let now = Utc::now();
        let mut segment = Segment::new(0.0, now);
        segment.id = SegmentId::from("b1");
        segment.content = "hello".to_string();
        Draft {
            segments: vec![segment],
            speakers: vec![Speaker::new(SpeakerId::from("Ana"), "Ana", SpeakerRole::Coordinator)],
            last_saved: now,
        }
    }

    #[test]
    fn test_store_and_load() {
        let temp = tempdir().unwrap();
        let cache = DraftCache::new(temp.path().join("drafts"));
        assert_eq!(cache.load("vid-1").unwrap(), None);

        let draft = draft();
        cache.store("vid-1", &draft).unwrap();
        assert_eq!(cache.load("vid-1").unwrap(), Some(draft));
        assert_eq!(cache.load("vid-2").unwrap(), None);
    }

    #[test]
    fn test_draft_json_shape() {
        let value = serde_json::to_value(draft()).unwrap();
        assert!(value.get("segments").is_some());
        assert!(value.get("speakers").is_some());
        assert!(value.get("lastSaved").is_some());
    }

    #[test]
    fn test_invalidate() {
        let temp = tempdir().unwrap();
        let cache = DraftCache::new(temp.path());
        cache.store("vid-1", &draft()).unwrap();

        assert!(cache.invalidate("vid-1").unwrap());
        assert_eq!(cache.load("vid-1").unwrap(), None);
        assert!(!cache.invalidate("vid-1").unwrap());
    }

    #[test]
    fn test_keys_map_to_distinct_files() {
        let cache = DraftCache::new("/drafts");
        assert_ne!(cache.path_for("a/b"), cache.path_for("a_b"));
        assert_eq!(
            cache.path_for("vid-1"),
            PathBuf::from("/drafts/transcript_3a_vid-1.json")
        );
    }

    #[test]
    fn test_corrupt_draft_is_an_error() {
        let temp = tempdir().unwrap();
        let cache = DraftCache::new(temp.path());
        fs::write(cache.path_for("vid-1"), "{not json").unwrap();
        assert!(matches!(cache.load("vid-1"), Err(DraftError::Json { .. })));
    }
}
