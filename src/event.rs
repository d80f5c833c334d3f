use crate::{model::NowPlayingInfo, source::PlayerCommand};

/// Emitted by the playback store.
#[derive(Debug, Clone)]
pub enum StatusEvent {
    /// Track identity differs from the previous snapshot. `track` may be the
    /// "nothing playing" sentinel.
    TrackChanged {
        track: NowPlayingInfo,
        generation: u64,
    },
}

/// Requests coming from the HUD front end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlEvent {
    Command(PlayerCommand),
    ToggleFavorite,
    OpenTrackUrl,
    Refresh,
}
