use std::{
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Instant,
};

use tracing::{debug, info};

use crate::{
    event::StatusEvent,
    model::{Artwork, NowPlayingInfo, SyncedLyricLine},
    source::PollResult,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LyricsStatus {
    #[default]
    Idle,
    Searching,
    Loaded,
    Missing,
}

#[derive(Debug)]
struct PlaybackState {
    info: NowPlayingInfo,
    artwork: Option<Artwork>,
    /// When `info.elapsed` was last known to be accurate.
    last_sample: Instant,
    lyrics: Arc<Vec<SyncedLyricLine>>,
    lyrics_status: LyricsStatus,
    lyrics_generation: u64,
}

/// Copy of the store handed to readers.
#[derive(Debug, Clone)]
pub struct StoreSnapshot {
    pub info: NowPlayingInfo,
    pub artwork: Option<Artwork>,
    pub lyrics: Arc<Vec<SyncedLyricLine>>,
    pub lyrics_status: LyricsStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplaceOutcome {
    pub track_changed: bool,
    pub generation: u64,
}

/// Mutable view on the elapsed field, only reachable while the store is
/// locked.
pub struct ElapsedClock<'a> {
    info: &'a mut NowPlayingInfo,
    last_sample: &'a mut Instant,
}

impl ElapsedClock<'_> {
    pub fn info(&self) -> &NowPlayingInfo {
        self.info
    }

    pub fn last_sample(&self) -> Instant {
        *self.last_sample
    }

    pub fn advance(&mut self, elapsed: f64, sampled_at: Instant) {
        self.info.elapsed = elapsed.max(0.0);
        *self.last_sample = sampled_at;
    }
}

/// Single owner of the current [`NowPlayingInfo`], its artwork and the lyric
/// sequence. Poll replacements, extrapolation ticks and lyric publication all
/// go through the same lock.
pub struct PlaybackStore {
    state: Mutex<PlaybackState>,
    events: flume::Sender<StatusEvent>,
}

impl PlaybackStore {
    pub fn new(events: flume::Sender<StatusEvent>) -> Self {
        Self {
            state: Mutex::new(PlaybackState {
                info: NowPlayingInfo::nothing_playing(),
                artwork: None,
                last_sample: Instant::now(),
                lyrics: Arc::default(),
                lyrics_status: LyricsStatus::Idle,
                lyrics_generation: 0,
            }),
            events,
        }
    }

    fn lock(&self) -> MutexGuard<'_, PlaybackState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn current(&self) -> NowPlayingInfo {
        self.lock().info.clone()
    }

    pub fn snapshot(&self) -> StoreSnapshot {
        let state = self.lock();
        StoreSnapshot {
            info: state.info.clone(),
            artwork: state.artwork.clone(),
            lyrics: state.lyrics.clone(),
            lyrics_status: state.lyrics_status,
        }
    }

    /// Installs a fresh poll result. `elapsed` is taken as-is and `now`
    /// becomes the new extrapolation anchor.
    pub fn replace(&self, poll: PollResult, now: Instant) -> ReplaceOutcome {
        let PollResult { mut info, artwork } = poll;
        let mut state = self.lock();

        let track_changed = !state.info.is_same_track(&info);
        if !track_changed {
            info.is_favorited = state.info.is_favorited;
        }

        state.artwork = match artwork {
            _ if !info.has_content() => None,
            Some(artwork) => Some(artwork),
            None if track_changed => None,
            None => state.artwork.take(),
        };

        if track_changed {
            state.lyrics_generation += 1;
            state.lyrics = Arc::default();
            state.lyrics_status = LyricsStatus::Idle;
            info!(
                track = %info.identity(),
                source = %info.source,
                generation = state.lyrics_generation,
                "track changed"
            );
            // Unbounded, never blocks; sending under the lock keeps event
            // order equal to generation order.
            let _ = self.events.send(StatusEvent::TrackChanged {
                track: info.clone(),
                generation: state.lyrics_generation,
            });
        }

        state.info = info;
        state.last_sample = now;

        ReplaceOutcome {
            track_changed,
            generation: state.lyrics_generation,
        }
    }

    pub fn mutate_elapsed<F>(&self, f: F)
    where
        F: FnOnce(&mut ElapsedClock<'_>),
    {
        let mut state = self.lock();
        let PlaybackState {
            info, last_sample, ..
        } = &mut *state;
        f(&mut ElapsedClock { info, last_sample });
    }

    /// Marks a lyric search as running, unless the track already moved on.
    pub fn begin_lyrics_search(&self, generation: u64) -> bool {
        let mut state = self.lock();
        if state.lyrics_generation != generation {
            return false;
        }
        state.lyrics_status = LyricsStatus::Searching;
        true
    }

    /// Publishes the lyric sequence fetched for `generation`. Returns `false`
    /// and drops `lines` if a newer track change happened meanwhile.
    pub fn publish_lyrics(&self, generation: u64, lines: Vec<SyncedLyricLine>) -> bool {
        let mut state = self.lock();
        if state.lyrics_generation != generation {
            debug!(
                generation,
                current = state.lyrics_generation,
                "discarding stale lyrics"
            );
            return false;
        }
        state.lyrics_status = if lines.is_empty() {
            LyricsStatus::Missing
        } else {
            LyricsStatus::Loaded
        };
        state.lyrics = Arc::new(lines);
        true
    }

    pub fn toggle_favorite(&self) -> bool {
        let mut state = self.lock();
        if state.info.has_content() {
            state.info.is_favorited = !state.info.is_favorited;
        }
        state.info.is_favorited
    }
}
