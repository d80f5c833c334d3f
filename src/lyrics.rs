//! Timed lyrics: fetching, LRC parsing and synchronization with playback.

mod lrc;
mod lrclib;
mod sync;

pub use lrc::{line_at, parse_with_offset, DEFAULT_OFFSET};
pub use lrclib::{LrcLibClient, LyricsProvider, LyricsRecord};
pub use sync::{LyricsSync, MatchOptions};
