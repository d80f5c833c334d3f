use std::fmt;

use crate::{
    error::ProbeError,
    model::{Artwork, Source},
};

/// Unparsed answer of a probe. Numbers stay strings until the poller
/// normalizes them, because every application formats them differently.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawSnapshot {
    pub title: String,
    pub artist: String,
    pub album: String,
    pub duration: String,
    pub position: String,
    pub state: String,
    pub url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerCommand {
    PlayPause,
    Next,
    Previous,
}

impl PlayerCommand {
    pub fn name(self) -> &'static str {
        match self {
            PlayerCommand::PlayPause => "play/pause",
            PlayerCommand::Next => "next",
            PlayerCommand::Previous => "previous",
        }
    }
}

impl fmt::Display for PlayerCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One external media surface.
///
/// Implementations may block for a while; callers bound every call with a
/// timeout and treat the timeout like any other [`ProbeError`].
#[async_trait::async_trait]
pub trait Probe: Send + Sync {
    fn source(&self) -> Source;

    async fn probe(&self) -> Result<RawSnapshot, ProbeError>;

    /// Best effort; any failure is reported as `None`.
    async fn fetch_artwork(&self, snapshot: &RawSnapshot) -> Option<Artwork>;

    async fn send_command(&self, command: PlayerCommand) -> Result<(), ProbeError>;

    fn supports(&self, _command: PlayerCommand) -> bool {
        true
    }
}
