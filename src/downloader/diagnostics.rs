// Failure diagnostics - classifies yt-dlp error output
//
// Only used to label attempt failures in logs and to pick the line of
// stderr that describes the failure; it never changes the attempt plan.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    /// DRM, premium or paid content
    DrmProtected,
    MembersOnly,
    AgeRestricted,
    PrivateVideo,
    VideoUnavailable,
    GeoBlocked,
    RateLimited,
    BotDetection,
    Http403Forbidden,
    NetworkTimeout,
    /// The requested format selector matched nothing
    FormatUnavailable,
    UnsupportedUrl,
    Unknown,
}

impl FailureReason {
    /// Nothing a different format selector could fix
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            Self::DrmProtected | Self::VideoUnavailable | Self::UnsupportedUrl
        )
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::DrmProtected => "DRM-protected content",
            Self::MembersOnly => "Members-only content",
            Self::AgeRestricted => "Age-restricted content",
            Self::PrivateVideo => "Private video",
            Self::VideoUnavailable => "Video unavailable",
            Self::GeoBlocked => "Geographic restriction",
            Self::RateLimited => "Rate limited",
            Self::BotDetection => "Bot detection triggered",
            Self::Http403Forbidden => "Access denied (HTTP 403)",
            Self::NetworkTimeout => "Network timeout",
            Self::FormatUnavailable => "Requested format not available",
            Self::UnsupportedUrl => "Unsupported URL",
            Self::Unknown => "Unknown failure",
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// Classify an error message; patterns are checked most specific first
pub fn diagnose(error: &str) -> FailureReason {
    let lower = error.to_lowercase();
    let any = |needles: &[&str]| needles.iter().any(|n| lower.contains(n));

    if any(&[
        "drm",
        "widevine",
        "playready",
        "fairplay",
        "youtube premium",
        "requires purchase",
        "rental",
    ]) {
        return FailureReason::DrmProtected;
    }
    if any(&["members only", "members-only", "join this channel", "available to members"]) {
        return FailureReason::MembersOnly;
    }
    if any(&["requested format is not available", "no video formats found"]) {
        return FailureReason::FormatUnavailable;
    }
    if any(&["unsupported url"]) {
        return FailureReason::UnsupportedUrl;
    }
    if any(&["age-restricted", "sign in to confirm your age"]) {
        return FailureReason::AgeRestricted;
    }
    if any(&["private video", "video is private"]) {
        return FailureReason::PrivateVideo;
    }
    if any(&[
        "video unavailable",
        "video has been removed",
        "no longer available",
        "video is unavailable",
    ]) {
        return FailureReason::VideoUnavailable;
    }
    if any(&["not available in your country", "blocked in your country", "geo restrict"]) {
        return FailureReason::GeoBlocked;
    }
    if any(&["429", "rate limit", "too many requests"]) {
        return FailureReason::RateLimited;
    }
    if any(&["confirm you're not a bot", "captcha", "unusual traffic"]) {
        return FailureReason::BotDetection;
    }
    if any(&["403", "forbidden"]) {
        return FailureReason::Http403Forbidden;
    }
    if any(&["timeout", "timed out", "connection refused", "network unreachable"]) {
        return FailureReason::NetworkTimeout;
    }
    FailureReason::Unknown
}

/// Short failure description from yt-dlp stderr: its `ERROR:` lines if
/// any, else the last non-empty line.
pub fn summarize_stderr(stderr: &str) -> Option<String> {
    let errors: Vec<&str> = stderr
        .lines()
        .map(str::trim)
        .filter(|l| l.starts_with("ERROR:"))
        .collect();
    if !errors.is_empty() {
        return Some(errors.join("\n"));
    }
    stderr
        .lines()
        .map(str::trim)
        .rev()
        .find(|l| !l.is_empty())
        .map(str::to_string)
}
