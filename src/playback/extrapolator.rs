use std::{sync::Arc, time::Instant};

use super::PlaybackStore;

/// Advances the displayed position between polls from wall-clock time.
///
/// Ticks never move `elapsed` past the duration, and never backwards while it
/// is within the duration. A position reported beyond the duration is pulled
/// back to it on the next tick.
pub struct Extrapolator {
    store: Arc<PlaybackStore>,
}

impl Extrapolator {
    pub fn new(store: Arc<PlaybackStore>) -> Self {
        Self { store }
    }

    pub fn tick(&self, now: Instant) {
        self.store.mutate_elapsed(|clock| {
            let info = clock.info();
            if !info.is_playing || info.duration <= 0.0 {
                return;
            }
            // A poll landed after `now` was taken: its sample is fresher.
            let Some(delta) = now.checked_duration_since(clock.last_sample()) else {
                return;
            };
            let stored = info.elapsed;
            let next = (stored + delta.as_secs_f64()).min(info.duration);
            clock.advance(next, now);
        });
    }
}
