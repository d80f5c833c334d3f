use std::{fmt, sync::Arc};

use serde::Serialize;

/// Title carried by the snapshot published when no source is presenting media.
pub const NOTHING_PLAYING: &str = "Nothing Playing";

/// Title used by the browser source when the tab has no usable name.
pub const BROWSER_PLACEHOLDER_TITLE: &str = "Web Media";

/// Artist used by the browser source, which never knows the real artist.
pub const BROWSER_PLACEHOLDER_ARTIST: &str = "Safari";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
pub enum Source {
    #[default]
    None,
    /// Spotify desktop client
    PrimaryPlayerA,
    /// Apple Music
    PrimaryPlayerB,
    /// Unpaused `<video>` element in a Safari tab
    BrowserFallback,
}

impl Source {
    pub fn label(self) -> &'static str {
        match self {
            Source::None => "",
            Source::PrimaryPlayerA => "Spotify",
            Source::PrimaryPlayerB => "Music",
            Source::BrowserFallback => "Safari",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Value snapshot of playback as seen by the last poll (and advanced by the
/// extrapolator between polls).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NowPlayingInfo {
    pub title: String,
    pub artist: String,
    pub album: String,
    pub is_playing: bool,
    /// Seconds
    pub duration: f64,
    /// Seconds
    pub elapsed: f64,
    pub source: Source,
    pub is_favorited: bool,
    /// Only set by the browser source.
    pub track_url: String,
}

impl Default for NowPlayingInfo {
    fn default() -> Self {
        Self::nothing_playing()
    }
}

impl NowPlayingInfo {
    pub fn nothing_playing() -> Self {
        Self {
            title: NOTHING_PLAYING.to_owned(),
            artist: String::new(),
            album: String::new(),
            is_playing: false,
            duration: 0.0,
            elapsed: 0.0,
            source: Source::None,
            is_favorited: false,
            track_url: String::new(),
        }
    }

    pub fn progress(&self) -> f64 {
        if self.duration > 0.0 {
            (self.elapsed / self.duration).clamp(0.0, 1.0)
        } else {
            0.0
        }
    }

    pub fn has_content(&self) -> bool {
        !self.title.is_empty() && self.title != NOTHING_PLAYING
    }

    pub fn identity(&self) -> TrackIdentity {
        TrackIdentity {
            title: self.title.clone(),
            artist: self.artist.clone(),
        }
    }

    pub fn is_same_track(&self, other: &NowPlayingInfo) -> bool {
        self.title == other.title && self.artist == other.artist
    }

    /// Whether this snapshot carries real metadata that a lyrics service could
    /// know about.
    pub fn wants_lyrics(&self) -> bool {
        self.has_content() && self.title != BROWSER_PLACEHOLDER_TITLE
    }

    pub fn elapsed_formatted(&self) -> String {
        format_time(self.elapsed)
    }

    pub fn remaining_formatted(&self) -> String {
        format!("-{}", format_time((self.duration - self.elapsed).max(0.0)))
    }
}

/// `(title, artist)` pair; two snapshots with equal identities are the same
/// track.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct TrackIdentity {
    pub title: String,
    pub artist: String,
}

impl fmt::Display for TrackIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'{}' by '{}'", self.title, self.artist)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SyncedLyricLine {
    pub text: String,
    /// Seconds, already shifted by the lyric offset; may be negative.
    pub timestamp: f64,
}

/// Raw encoded image bytes as returned by a probe.
pub type Artwork = Arc<Vec<u8>>;

fn format_time(seconds: f64) -> String {
    let total = seconds.max(0.0) as u64;
    format!("{}:{:02}", total / 60, total % 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn track(title: &str, artist: &str) -> NowPlayingInfo {
        NowPlayingInfo {
            title: title.to_owned(),
            artist: artist.to_owned(),
            ..NowPlayingInfo::nothing_playing()
        }
    }

    #[test]
    fn progress_is_clamped() {
        let mut info = track("Song", "Band");
        assert_eq!(info.progress(), 0.0);

        info.duration = 200.0;
        info.elapsed = 50.0;
        assert_eq!(info.progress(), 0.25);

        info.elapsed = 250.0;
        assert_eq!(info.progress(), 1.0);
    }

    #[test]
    fn sentinel_has_no_content() {
        assert!(!NowPlayingInfo::nothing_playing().has_content());
        assert!(!track("", "Band").has_content());
        assert!(track("Song", "").has_content());
    }

    #[test]
    fn identity_ignores_album_and_position() {
        let mut a = track("Song", "Band");
        let mut b = track("Song", "Band");
        a.album = "One".into();
        b.album = "Two".into();
        b.elapsed = 42.0;
        assert!(a.is_same_track(&b));
        assert_eq!(a.identity(), b.identity());
        assert!(!a.is_same_track(&track("Song", "Other Band")));
    }

    #[test]
    fn browser_placeholder_skips_lyrics() {
        assert!(!track(BROWSER_PLACEHOLDER_TITLE, BROWSER_PLACEHOLDER_ARTIST).wants_lyrics());
        assert!(track("Some Video", BROWSER_PLACEHOLDER_ARTIST).wants_lyrics());
        assert!(!NowPlayingInfo::nothing_playing().wants_lyrics());
    }

    #[test]
    fn formats_elapsed_and_remaining() {
        let mut info = track("Song", "Band");
        info.duration = 185.0;
        info.elapsed = 65.4;
        assert_eq!(info.elapsed_formatted(), "1:05");
        assert_eq!(info.remaining_formatted(), "-1:59");

        info.elapsed = 190.0;
        assert_eq!(info.remaining_formatted(), "-0:00");
    }
}
