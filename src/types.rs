//! Core types and events

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Unique identifier for a catalog species (1-based catalog row unless the catalog supplies one)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SpeciesId(pub u32);

impl std::fmt::Display for SpeciesId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for SpeciesId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

/// Species priority tier from the catalog
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum Priority {
    /// Low priority
    Low,
    /// Medium priority
    #[default]
    Medium,
    /// High priority
    High,
}

impl std::str::FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "HIGH" | "TINGGI" => Ok(Priority::High),
            "MEDIUM" | "SEDANG" => Ok(Priority::Medium),
            "LOW" | "RENDAH" => Ok(Priority::Low),
            other => Err(format!("unknown priority: {}", other)),
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Priority::High => "HIGH",
            Priority::Medium => "MEDIUM",
            Priority::Low => "LOW",
        };
        f.write_str(s)
    }
}

/// Species session status
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SessionStatus {
    /// Created, not yet started
    Pending,
    /// Searching and downloading
    Running,
    /// Quota met
    Satisfied,
    /// Some images saved, quota not met
    Partial,
    /// No images saved, or infrastructure failure
    Failed,
}

impl SessionStatus {
    /// Whether the session has reached a final state
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionStatus::Satisfied | SessionStatus::Partial | SessionStatus::Failed
        )
    }

    /// Terminal status for a finished search given how many images the species has
    pub fn from_counts(total: usize, target: usize) -> Self {
        if total >= target {
            SessionStatus::Satisfied
        } else if total > 0 {
            SessionStatus::Partial
        } else {
            SessionStatus::Failed
        }
    }
}

/// Raster image formats the pipeline knows how to recognise
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageKind {
    /// JPEG
    Jpeg,
    /// PNG
    Png,
    /// WebP
    Webp,
    /// GIF
    Gif,
}

impl ImageKind {
    /// File extension used when saving
    pub fn extension(&self) -> &'static str {
        match self {
            ImageKind::Jpeg => "jpg",
            ImageKind::Png => "png",
            ImageKind::Webp => "webp",
            ImageKind::Gif => "gif",
        }
    }

    /// Parse a `Content-Type` value, ignoring parameters
    pub fn from_mime(mime: &str) -> Option<Self> {
        let essence = mime.split(';').next()?.trim().to_ascii_lowercase();
        match essence.as_str() {
            "image/jpeg" | "image/jpg" | "image/pjpeg" => Some(ImageKind::Jpeg),
            "image/png" => Some(ImageKind::Png),
            "image/webp" => Some(ImageKind::Webp),
            "image/gif" => Some(ImageKind::Gif),
            _ => None,
        }
    }

    /// Parse a file extension (without the dot)
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" | "jpe" => Some(ImageKind::Jpeg),
            "png" => Some(ImageKind::Png),
            "webp" => Some(ImageKind::Webp),
            "gif" => Some(ImageKind::Gif),
            _ => None,
        }
    }

    pub(crate) fn from_image_format(format: image::ImageFormat) -> Option<Self> {
        match format {
            image::ImageFormat::Jpeg => Some(ImageKind::Jpeg),
            image::ImageFormat::Png => Some(ImageKind::Png),
            image::ImageFormat::WebP => Some(ImageKind::Webp),
            image::ImageFormat::Gif => Some(ImageKind::Gif),
            _ => None,
        }
    }
}

/// Event emitted during a batch run
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A species session started
    SessionStarted {
        /// Species ID
        id: SpeciesId,
        /// Regional species name
        name: String,
        /// Target image count
        target: usize,
    },

    /// A source was queried for a search term
    SourceQueried {
        /// Species ID
        id: SpeciesId,
        /// Source name
        source: String,
        /// Search term used
        term: String,
    },

    /// A source was abandoned for the current species after an error
    SourceAbandoned {
        /// Species ID
        id: SpeciesId,
        /// Source name
        source: String,
        /// Error message
        error: String,
    },

    /// An image was accepted and saved
    ImageSaved {
        /// Species ID
        id: SpeciesId,
        /// Where the file was written
        path: PathBuf,
        /// Images accepted so far for this species (including pre-existing ones)
        total: usize,
    },

    /// A species session reached a terminal status
    SessionFinished {
        /// Species ID
        id: SpeciesId,
        /// Terminal status
        status: SessionStatus,
        /// Images saved during this session
        accepted: usize,
    },

    /// The batch finished (normally or through cancellation)
    BatchFinished {
        /// Species attempted
        attempted: usize,
        /// Whether the run was cancelled
        cancelled: bool,
    },
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_parsing() {
        assert_eq!("HIGH".parse::<Priority>().unwrap(), Priority::High);
        assert_eq!(" medium ".parse::<Priority>().unwrap(), Priority::Medium);
        assert_eq!("low".parse::<Priority>().unwrap(), Priority::Low);
        assert_eq!("Tinggi".parse::<Priority>().unwrap(), Priority::High);
        assert!("urgent".parse::<Priority>().is_err());
        assert_eq!(Priority::High.to_string(), "HIGH");
    }

    #[test]
    fn test_status_from_counts() {
        assert_eq!(SessionStatus::from_counts(5, 5), SessionStatus::Satisfied);
        assert_eq!(SessionStatus::from_counts(7, 5), SessionStatus::Satisfied);
        assert_eq!(SessionStatus::from_counts(2, 5), SessionStatus::Partial);
        assert_eq!(SessionStatus::from_counts(0, 5), SessionStatus::Failed);
        assert!(SessionStatus::Partial.is_terminal());
        assert!(!SessionStatus::Running.is_terminal());
    }

    #[test]
    fn test_image_kind_from_mime_and_extension() {
        assert_eq!(
            ImageKind::from_mime("image/jpeg; charset=binary"),
            Some(ImageKind::Jpeg)
        );
        assert_eq!(ImageKind::from_mime("IMAGE/PNG"), Some(ImageKind::Png));
        assert_eq!(ImageKind::from_mime("text/html"), None);
        assert_eq!(ImageKind::from_extension("JPEG"), Some(ImageKind::Jpeg));
        assert_eq!(ImageKind::from_extension("svg"), None);
        assert_eq!(ImageKind::Webp.extension(), "webp");
    }

    #[test]
    fn test_event_serializes_with_type_tag() {
        let event = Event::SessionFinished {
            id: SpeciesId(3),
            status: SessionStatus::Partial,
            accepted: 2,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "session_finished");
        assert_eq!(json["status"], "PARTIAL");
        assert_eq!(json["id"], 3);
    }
}
