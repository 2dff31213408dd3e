// FormatSelector - which streams to ask yt-dlp for
//
// Audio is a single selector with its own fallback chain inside the
// selector string. Video is an ordered list of attempts, tried one at a
// time, most constrained first.

use super::models::FormatKind;

/// Preferred audio: m4a, then any audio, then whatever is best
pub const AUDIO_FORMAT: &str = "bestaudio[ext=m4a]/bestaudio/best";

/// Container forced for merged video+audio output
pub const VIDEO_MERGE_FORMAT: &str = "mp4";

/// Video selectors in order of preference
pub const VIDEO_FORMATS: [&str; 5] = [
    "bestvideo[height<=720]+bestaudio/best",
    "bestvideo[height<=1080]+bestaudio/best",
    "bestvideo+bestaudio/best",
    "best[vcodec!=none][acodec!=none]/best",
    "best",
];

/// Attempt plan for one task
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatPolicy {
    pub kind: FormatKind,
    /// Selectors, tried strictly in order
    pub formats: Vec<String>,
    pub merge_output_format: Option<String>,
}

impl FormatPolicy {
    pub fn for_kind(kind: FormatKind) -> Self {
        match kind {
            FormatKind::Audio => Self::audio(),
            FormatKind::Video => Self::video(),
        }
    }

    pub fn audio() -> Self {
        Self {
            kind: FormatKind::Audio,
            formats: vec![AUDIO_FORMAT.to_string()],
            merge_output_format: None,
        }
    }

    pub fn video() -> Self {
        Self {
            kind: FormatKind::Video,
            formats: VIDEO_FORMATS.iter().map(|f| f.to_string()).collect(),
            merge_output_format: Some(VIDEO_MERGE_FORMAT.to_string()),
        }
    }

    /// Audio failures surface directly; video failures move to the next entry
    pub fn has_fallback(&self) -> bool {
        self.formats.len() > 1
    }
}
