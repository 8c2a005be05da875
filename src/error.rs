use std::path::PathBuf;
use thiserror::Error;

/// Application-level errors
#[derive(Debug, Error)]
pub enum AppError {
    #[error("No transcript found for video {video_id}")]
    NotFound { video_id: String },

    #[error("Failed to load transcript: {0}")]
    Load(#[source] ApiError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Failed to save: {0}")]
    Save(#[source] ApiError),

    #[error("Upload failed: {0}")]
    Upload(#[source] ApiError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Draft(#[from] DraftError),
}

/// Hierarchy, uniqueness and assignment rule violations.
///
/// These are always recoverable: the operation that produced one performed no
/// mutation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Cannot create a section inside another section")]
    SectionNesting,

    #[error("Close the open section \"{name}\" before creating a new one")]
    SectionAlreadyOpen { name: String },

    #[error("A subsection can only be created inside a section")]
    SubsectionOutsideSection,

    #[error("Cannot create a subsection inside another subsection")]
    SubsectionNesting,

    #[error("Close the open subsection \"{name}\" before creating a new one")]
    SubsectionAlreadyOpen { name: String },

    #[error("There is no open section or subsection to close")]
    NothingToClose,

    #[error("The close position ({position}) must come after the start position ({start})")]
    CloseBeforeStart { start: usize, position: usize },

    #[error("This change would enclose \"{name}\"")]
    WouldEnclose { name: String },

    #[error("A subsection must end inside its section (section ends at {section_end})")]
    CloseOutsideParent { section_end: usize },

    #[error("Cannot reopen: another {kind} is already open")]
    CannotReopen { kind: &'static str },

    #[error("Position {position} is outside the transcript ({len} blocks)")]
    PositionOutOfRange { position: usize, len: usize },

    #[error("Unknown section or subsection: {0}")]
    UnknownStructure(String),

    #[error("Master tag \"{name}\" is already used in this section")]
    MasterNameInUse { name: String },

    #[error("Master tag \"{name}\" is closed; enter edit mode to add tags")]
    MasterClosed { name: String },

    #[error("Enter edit mode for this master tag first")]
    EditModeRequired,

    #[error("Master tag name cannot be empty")]
    EmptyMasterName,

    #[error("Tag value cannot be empty")]
    EmptyTagValue,

    #[error("Speaker name cannot be empty")]
    EmptySpeakerName,

    #[error("Add at least one primary tag before closing the master tag")]
    NothingToCommit,

    #[error("Selection is empty or not part of the block text")]
    InvalidSelection,

    #[error("Unknown block: {0}")]
    UnknownBlock(String),

    #[error("Unknown segment: {0}")]
    UnknownSegment(String),

    #[error("Unknown speaker: {0}")]
    UnknownSpeaker(String),

    #[error("Unknown tag: {0}")]
    UnknownTag(String),

    #[error("Unknown pending selection: {0}")]
    UnknownPendingEntry(String),
}

/// REST backend errors
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Resource not found")]
    NotFound,

    #[error("Invalid response from server: {0}")]
    InvalidResponse(String),

    #[error("Server error ({status}): {message}")]
    Server { status: u16, message: String },

    #[error("Invalid endpoint URL: {0}")]
    InvalidUrl(String),
}

/// Local draft cache errors with contextual information
#[derive(Debug, Error)]
pub enum DraftError {
    #[error("Could not find a data directory for drafts")]
    NoDataDir,

    #[error("Failed to create directory {path}: {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read draft {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write draft {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to remove draft {path}: {source}")]
    Remove {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Draft {path} is not valid JSON: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_messages_are_user_facing() {
        let err = ValidationError::SectionAlreadyOpen {
            name: "Intro".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Close the open section \"Intro\" before creating a new one"
        );

        let err = ValidationError::CloseBeforeStart {
            start: 4,
            position: 2,
        };
        assert!(err.to_string().contains("(2)"));
    }

    #[test]
    fn test_validation_converts_into_app_error() {
        let err: AppError = ValidationError::NothingToCommit.into();
        assert!(matches!(
            err,
            AppError::Validation(ValidationError::NothingToCommit)
        ));
    }
}
