use std::sync::{Arc, Mutex, PoisonError};

use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::{
    event::StatusEvent,
    model::{NowPlayingInfo, SyncedLyricLine},
    playback::PlaybackStore,
};

use super::{line_at, parse_with_offset, LyricsProvider, LyricsRecord};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchOptions {
    /// Largest accepted duration difference for a search hit, in seconds.
    pub tolerance: f64,
    /// Subtracted from every parsed timestamp, in seconds.
    pub offset: f64,
}

/// Fetches lyrics whenever the track changes and answers "which line is
/// current".
///
/// At most one fetch runs at a time. A track change aborts the previous fetch,
/// and the store refuses anything published for an outdated generation, so a
/// slow stale fetch can never overwrite fresher lyrics.
pub struct LyricsSync {
    store: Arc<PlaybackStore>,
    provider: Arc<dyn LyricsProvider>,
    options: MatchOptions,
    in_flight: Mutex<Option<JoinHandle<()>>>,
}

impl LyricsSync {
    pub fn new(
        store: Arc<PlaybackStore>,
        provider: Arc<dyn LyricsProvider>,
        options: MatchOptions,
    ) -> Self {
        Self {
            store,
            provider,
            options,
            in_flight: Mutex::new(None),
        }
    }

    /// Consumes store events until every sender is gone.
    pub async fn run(self: Arc<Self>, events: flume::Receiver<StatusEvent>) {
        while let Ok(event) = events.recv_async().await {
            match event {
                StatusEvent::TrackChanged { track, generation } => {
                    self.on_track_changed(track, generation)
                }
            }
        }
        self.cancel();
    }

    pub fn on_track_changed(&self, track: NowPlayingInfo, generation: u64) {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = in_flight.take() {
            previous.abort();
        }

        if !track.wants_lyrics() {
            debug!(track = %track.identity(), "skipping lyrics");
            return;
        }
        if !self.store.begin_lyrics_search(generation) {
            return;
        }

        let store = self.store.clone();
        let provider = self.provider.clone();
        let options = self.options;
        *in_flight = Some(tokio::spawn(async move {
            let lines = fetch_lyrics(provider.as_ref(), &track, options).await;
            if lines.is_empty() {
                info!(track = %track.identity(), "no synced lyrics");
            } else {
                info!(track = %track.identity(), lines = lines.len(), "synced lyrics loaded");
            }
            store.publish_lyrics(generation, lines);
        }));
    }

    pub fn cancel(&self) {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(handle) = in_flight.take() {
            handle.abort();
        }
    }

    /// Last line whose timestamp is not after `elapsed`.
    pub fn current_line(&self, elapsed: f64) -> Option<SyncedLyricLine> {
        self.line_relative(elapsed, 0)
    }

    pub fn previous_line(&self, elapsed: f64) -> Option<SyncedLyricLine> {
        self.line_relative(elapsed, -1)
    }

    /// Before the first timestamp this is the first line.
    pub fn next_line(&self, elapsed: f64) -> Option<SyncedLyricLine> {
        self.line_relative(elapsed, 1)
    }

    fn line_relative(&self, elapsed: f64, step: isize) -> Option<SyncedLyricLine> {
        let lyrics = self.store.snapshot().lyrics;
        let index = match line_at(&lyrics, elapsed) {
            Some(current) => current as isize + step,
            None if step > 0 => step - 1,
            None => return None,
        };
        usize::try_from(index)
            .ok()
            .and_then(|index| lyrics.get(index))
            .cloned()
    }
}

/// Exact lookup first, then a free text search constrained by duration.
/// Every failure ends in an empty sequence.
pub async fn fetch_lyrics(
    provider: &dyn LyricsProvider,
    track: &NowPlayingInfo,
    options: MatchOptions,
) -> Vec<SyncedLyricLine> {
    match find_synced_payload(provider, track, options.tolerance).await {
        Some(payload) => parse_with_offset(&payload, options.offset),
        None => Vec::new(),
    }
}

async fn find_synced_payload(
    provider: &dyn LyricsProvider,
    track: &NowPlayingInfo,
    tolerance: f64,
) -> Option<String> {
    let duration = track.duration.max(0.0).round() as u64;
    match provider
        .get_exact(&track.artist, &track.title, duration)
        .await
    {
        Ok(Some(record)) if record.synced().is_some() => return record.synced_lyrics,
        Ok(_) => debug!(track = %track.identity(), "no exact synced match"),
        Err(err) => debug!(track = %track.identity(), "exact lookup failed: {err}"),
    }

    let query = format!("{} {}", track.title, track.artist);
    let candidates = match provider.search(query.trim()).await {
        Ok(candidates) => candidates,
        Err(err) => {
            debug!(%query, "lyrics search failed: {err}");
            return None;
        }
    };
    pick_candidate(&candidates, track.duration, tolerance).map(str::to_owned)
}

/// Candidate with synced lyrics whose duration is closest to `duration`,
/// provided the gap stays within `tolerance`.
pub fn pick_candidate(candidates: &[LyricsRecord], duration: f64, tolerance: f64) -> Option<&str> {
    let (gap, record, payload) = candidates
        .iter()
        .filter_map(|it| Some(((it.duration? - duration).abs(), it, it.synced()?)))
        .min_by(|a, b| a.0.total_cmp(&b.0))?;
    if gap > tolerance {
        debug!(gap, tolerance, "closest search result rejected");
        return None;
    }
    debug!(
        track = record.track_name.as_deref().unwrap_or_default(),
        artist = record.artist_name.as_deref().unwrap_or_default(),
        gap,
        "search result accepted"
    );
    Some(payload)
}

#[cfg(test)]
mod tests {
    use std::{
        sync::atomic::{AtomicUsize, Ordering},
        time::{Duration, Instant},
    };

    use super::*;
    use crate::{
        error::LyricsError,
        model::{Source, BROWSER_PLACEHOLDER_ARTIST, BROWSER_PLACEHOLDER_TITLE},
        playback::LyricsStatus,
        source::PollResult,
    };

    /// Serves lyrics keyed by title; titles starting with "Slow" answer after
    /// ten seconds.
    #[derive(Default)]
    struct FakeProvider {
        exact: Vec<(String, String)>,
        search: Vec<LyricsRecord>,
        fail_exact: bool,
        calls: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl LyricsProvider for FakeProvider {
        async fn get_exact(
            &self,
            _artist: &str,
            title: &str,
            _duration_secs: u64,
        ) -> Result<Option<LyricsRecord>, LyricsError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if title.starts_with("Slow") {
                tokio::time::sleep(Duration::from_secs(10)).await;
            }
            if self.fail_exact {
                return Err(LyricsError::Timeout);
            }
            Ok(self
                .exact
                .iter()
                .find(|(known, _)| known == title)
                .map(|(_, payload)| LyricsRecord {
                    synced_lyrics: Some(payload.clone()),
                    ..Default::default()
                }))
        }

        async fn search(&self, _query: &str) -> Result<Vec<LyricsRecord>, LyricsError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.search.clone())
        }
    }

    fn candidate(duration: f64, payload: &str) -> LyricsRecord {
        LyricsRecord {
            duration: Some(duration),
            synced_lyrics: Some(payload.to_owned()),
            ..Default::default()
        }
    }

    fn track(title: &str, artist: &str, duration: f64) -> PollResult {
        PollResult {
            info: NowPlayingInfo {
                title: title.to_owned(),
                artist: artist.to_owned(),
                album: String::new(),
                is_playing: true,
                duration,
                elapsed: 0.0,
                source: Source::PrimaryPlayerA,
                is_favorited: false,
                track_url: String::new(),
            },
            artwork: None,
        }
    }

    const OPTIONS: MatchOptions = MatchOptions {
        tolerance: 10.0,
        offset: 0.2,
    };

    fn engine(provider: FakeProvider) -> (Arc<PlaybackStore>, Arc<LyricsSync>, Arc<FakeProvider>) {
        let (tx, _rx) = flume::unbounded();
        let store = Arc::new(PlaybackStore::new(tx));
        let provider = Arc::new(provider);
        let sync = Arc::new(LyricsSync::new(store.clone(), provider.clone(), OPTIONS));
        (store, sync, provider)
    }

    fn change(store: &PlaybackStore, sync: &LyricsSync, poll: PollResult) {
        let info = poll.info.clone();
        let outcome = store.replace(poll, Instant::now());
        sync.on_track_changed(info, outcome.generation);
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_secs(60)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn publishes_exact_match() {
        let (store, sync, _) = engine(FakeProvider {
            exact: vec![("Song".into(), "[00:01.00]one\n[00:03.00]two".into())],
            ..Default::default()
        });

        change(&store, &sync, track("Song", "Band", 200.0));
        assert_eq!(store.snapshot().lyrics_status, LyricsStatus::Searching);
        settle().await;

        let snapshot = store.snapshot();
        assert_eq!(snapshot.lyrics_status, LyricsStatus::Loaded);
        assert_eq!(snapshot.lyrics.len(), 2);
        assert_eq!(sync.current_line(2.0).unwrap().text, "one");
        assert!(sync.current_line(0.5).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn neighbours_follow_current_line() {
        let (store, sync, _) = engine(FakeProvider {
            exact: vec![("Song".into(), "[00:00.00]a\n[00:05.00]b\n[00:10.00]c".into())],
            ..Default::default()
        });
        change(&store, &sync, track("Song", "Band", 200.0));
        settle().await;

        // Shifted by the 0.2s offset: -0.2, 4.8 and 9.8.
        assert_eq!(sync.current_line(7.0).unwrap().text, "b");
        assert_eq!(sync.previous_line(7.0).unwrap().text, "a");
        assert_eq!(sync.next_line(7.0).unwrap().text, "c");

        assert!(sync.previous_line(2.0).is_none());
        assert!(sync.next_line(12.0).is_none());

        assert!(sync.current_line(-1.0).is_none());
        assert!(sync.previous_line(-1.0).is_none());
        assert_eq!(sync.next_line(-1.0).unwrap().text, "a");
    }

    #[tokio::test(start_paused = true)]
    async fn track_change_cancels_stale_fetch() {
        let (store, sync, _) = engine(FakeProvider {
            exact: vec![
                ("Slow Song".into(), "[00:01.00]old".into()),
                ("Fresh".into(), "[00:01.00]new".into()),
            ],
            ..Default::default()
        });

        change(&store, &sync, track("Slow Song", "A", 200.0));
        tokio::time::sleep(Duration::from_secs(1)).await;
        change(&store, &sync, track("Fresh", "B", 200.0));
        settle().await;

        let snapshot = store.snapshot();
        assert_eq!(snapshot.lyrics.len(), 1);
        assert_eq!(snapshot.lyrics[0].text, "new");
    }

    #[tokio::test(start_paused = true)]
    async fn lyrics_cleared_immediately_on_track_change() {
        let (store, sync, _) = engine(FakeProvider {
            exact: vec![
                ("Song".into(), "[00:01.00]one".into()),
                ("Slow Next".into(), "[00:01.00]next".into()),
            ],
            ..Default::default()
        });

        change(&store, &sync, track("Song", "Band", 200.0));
        settle().await;
        assert_eq!(store.snapshot().lyrics.len(), 1);

        change(&store, &sync, track("Slow Next", "Band", 200.0));
        assert!(store.snapshot().lyrics.is_empty());
        assert!(sync.current_line(5.0).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn search_fallback_rejects_duration_mismatch() {
        let (store, sync, _) = engine(FakeProvider {
            search: vec![candidate(100.0, "[00:01.00]wrong song")],
            ..Default::default()
        });

        change(&store, &sync, track("Song", "Band", 200.0));
        settle().await;

        let snapshot = store.snapshot();
        assert!(snapshot.lyrics.is_empty());
        assert_eq!(snapshot.lyrics_status, LyricsStatus::Missing);
    }

    #[tokio::test(start_paused = true)]
    async fn search_fallback_after_exact_failure() {
        let (store, sync, _) = engine(FakeProvider {
            fail_exact: true,
            search: vec![
                candidate(150.0, "[00:01.00]far"),
                candidate(204.0, "[00:01.00]close"),
                candidate(230.0, "[00:01.00]farther"),
            ],
            ..Default::default()
        });

        change(&store, &sync, track("Song", "Band", 200.0));
        settle().await;

        assert_eq!(store.snapshot().lyrics[0].text, "close");
    }

    #[tokio::test(start_paused = true)]
    async fn placeholder_title_skips_fetching() {
        let (store, sync, provider) = engine(FakeProvider::default());

        let mut poll = track(BROWSER_PLACEHOLDER_TITLE, BROWSER_PLACEHOLDER_ARTIST, 0.0);
        poll.info.source = Source::BrowserFallback;
        change(&store, &sync, poll);
        change(&store, &sync, PollResult::nothing_playing());
        settle().await;

        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
        assert_eq!(store.snapshot().lyrics_status, LyricsStatus::Idle);
    }

    #[test]
    fn pick_candidate_ignores_unsynced_records() {
        let candidates = vec![
            LyricsRecord {
                duration: Some(200.0),
                synced_lyrics: None,
                ..Default::default()
            },
            candidate(195.0, "[00:01.00]synced"),
        ];
        assert_eq!(
            pick_candidate(&candidates, 200.0, 10.0),
            Some("[00:01.00]synced")
        );
        assert_eq!(pick_candidate(&candidates, 200.0, 2.0), None);
        assert_eq!(pick_candidate(&[], 200.0, 10.0), None);
    }
}
