use std::fmt;

use url::Url;

/// Media type of a fragment; doubles as the exclusivity key for buffered
/// loads (one active loader per type).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaType {
    Main,
    Audio,
    Subtitle,
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Main => write!(f, "main"),
            Self::Audio => write!(f, "audio"),
            Self::Subtitle => write!(f, "subtitle"),
        }
    }
}

/// Half-open byte range `[start, end)` within the remote resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FragmentRange {
    pub start: u64,
    pub end: u64,
}

/// One downloadable segment of a media stream.
#[derive(Debug, Clone)]
pub struct Fragment {
    pub media_type: MediaType,
    pub url: Url,
    /// Present only when both bounds are known.
    pub range: Option<FragmentRange>,
    /// Bytes received so far for the current load attempt. Reset to 0 when
    /// a new attempt is issued, non-decreasing afterward.
    pub loaded: u64,
}

impl Fragment {
    pub fn new(media_type: MediaType, url: Url) -> Self {
        Self {
            media_type,
            url,
            range: None,
            loaded: 0,
        }
    }

    pub fn with_range(mut self, start: u64, end: u64) -> Self {
        self.range = Some(FragmentRange { start, end });
        self
    }
}
