use std::{
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use reqwest::Client;
use tokio::{
    task::JoinHandle,
    time::{interval, sleep, timeout, Instant, MissedTickBehavior},
};
use tracing::{debug, info, warn};

use crate::{
    config::RefrainConfig,
    event::StatusEvent,
    lyrics::{LrcLibClient, LyricsProvider, LyricsSync, MatchOptions},
    playback::{Extrapolator, PlaybackStore},
    source::{OsaScriptProbe, PlayerCommand, PollResult, Probe, SourcePoller},
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ServiceTiming {
    pub startup_delay: Duration,
    pub poll_interval: Duration,
    pub tick_interval: Duration,
    pub probe_timeout: Duration,
    pub command_refresh_delay: Duration,
}

/// Wires the poller, the extrapolator and the lyrics engine around one
/// [`PlaybackStore`]. Nothing runs until [`start`](Self::start).
pub struct NowPlayingService {
    timing: ServiceTiming,
    store: Arc<PlaybackStore>,
    poller: Arc<SourcePoller>,
    extrapolator: Arc<Extrapolator>,
    lyrics: Arc<LyricsSync>,
    events: flume::Receiver<StatusEvent>,
    refresh_tx: flume::Sender<()>,
    refresh_rx: flume::Receiver<()>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl NowPlayingService {
    pub fn new(
        timing: ServiceTiming,
        match_options: MatchOptions,
        probes: Vec<Arc<dyn Probe>>,
        provider: Arc<dyn LyricsProvider>,
    ) -> Self {
        let (events_tx, events) = flume::unbounded();
        let (refresh_tx, refresh_rx) = flume::unbounded();
        let store = Arc::new(PlaybackStore::new(events_tx));
        Self {
            timing,
            poller: Arc::new(SourcePoller::new(probes, timing.probe_timeout)),
            extrapolator: Arc::new(Extrapolator::new(store.clone())),
            lyrics: Arc::new(LyricsSync::new(store.clone(), provider, match_options)),
            store,
            events,
            refresh_tx,
            refresh_rx,
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Scripted probes in configured order plus the LRCLIB client.
    pub fn from_config(config: &RefrainConfig) -> anyhow::Result<Self> {
        let general = &config.general;
        let client = Client::builder()
            .user_agent(config.api.user_agent.as_str())
            .build()?;
        let probes = general
            .sources
            .iter()
            .map(|&app| {
                Arc::new(OsaScriptProbe::new(app, general.probe_timeout(), client.clone()))
                    as Arc<dyn Probe>
            })
            .collect();
        let timing = ServiceTiming {
            startup_delay: general.startup_delay(),
            poll_interval: general.poll_interval(),
            tick_interval: general.tick_interval(),
            probe_timeout: general.probe_timeout(),
            command_refresh_delay: general.command_refresh_delay(),
        };
        let match_options = MatchOptions {
            tolerance: general.match_tolerance_secs,
            offset: general.lyric_offset(),
        };
        let provider = Arc::new(LrcLibClient::new(client, &config.api));
        Ok(Self::new(timing, match_options, probes, provider))
    }

    pub fn store(&self) -> &Arc<PlaybackStore> {
        &self.store
    }

    pub fn lyrics(&self) -> &Arc<LyricsSync> {
        &self.lyrics
    }

    pub fn start(&self) {
        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        if !tasks.is_empty() {
            return;
        }
        info!(?self.timing, "starting now playing service");

        let poller = self.poller.clone();
        let store = self.store.clone();
        let refresh = self.refresh_rx.clone();
        let timing = self.timing;
        tasks.push(tokio::spawn(async move {
            sleep(timing.startup_delay).await;
            let mut ticker = interval(timing.poll_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    request = refresh.recv_async() => {
                        if request.is_err() {
                            break;
                        }
                        debug!("forced re-poll");
                    }
                }
                poll_and_publish(&poller, &store).await;
            }
        }));

        let extrapolator = self.extrapolator.clone();
        tasks.push(tokio::spawn(async move {
            let mut ticker = interval(timing.tick_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                extrapolator.tick(Instant::now().into_std());
            }
        }));

        tasks.push(tokio::spawn(self.lyrics.clone().run(self.events.clone())));
    }

    pub fn stop(&self) {
        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        if tasks.is_empty() {
            return;
        }
        for task in tasks.drain(..) {
            task.abort();
        }
        self.lyrics.cancel();
        info!("now playing service stopped");
    }

    /// Polls right away instead of waiting for the next interval.
    pub fn refresh(&self) {
        let _ = self.refresh_tx.send(());
    }

    /// One complete cycle, published to the store.
    pub async fn poll_once(&self) -> PollResult {
        let result = self.poller.poll().await;
        self.store.replace(result.clone(), Instant::now().into_std());
        result
    }

    /// Sends `command` to the source currently shown, then re-polls after a
    /// short delay whatever the outcome. Track skipping falls back to the
    /// highest priority player when the shown source cannot skip.
    pub fn send_command(&self, command: PlayerCommand) {
        let current = self
            .poller
            .probe_for(self.store.current().source)
            .filter(|it| it.supports(command));
        let target = match command {
            PlayerCommand::PlayPause => current,
            PlayerCommand::Next | PlayerCommand::Previous => {
                current.or_else(|| self.poller.first_supporting(command))
            }
        };
        let Some(probe) = target else {
            debug!(%command, "no source for command");
            return;
        };
        let source = probe.source();

        let refresh = self.refresh_tx.clone();
        let timing = self.timing;
        tokio::spawn(async move {
            match timeout(timing.probe_timeout, probe.send_command(command)).await {
                Ok(Ok(())) => debug!(%command, %source, "command sent"),
                Ok(Err(err)) => warn!(%command, %source, "command failed: {err}"),
                Err(_) => warn!(%command, %source, "command timed out"),
            }
            sleep(timing.command_refresh_delay).await;
            let _ = refresh.send(());
        });
    }
}

impl Drop for NowPlayingService {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn poll_and_publish(poller: &SourcePoller, store: &PlaybackStore) {
    match timeout(poller.cycle_timeout(), poller.poll()).await {
        Ok(result) => {
            store.replace(result, Instant::now().into_std());
        }
        Err(_) => warn!("poll cycle abandoned, keeping previous state"),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::{
        error::{LyricsError, ProbeError},
        lyrics::LyricsRecord,
        model::{Artwork, Source},
        playback::LyricsStatus,
        source::RawSnapshot,
    };

    #[derive(Default)]
    struct ScriptedProbe {
        polls: AtomicUsize,
        commands: Mutex<Vec<PlayerCommand>>,
    }

    #[async_trait::async_trait]
    impl Probe for ScriptedProbe {
        fn source(&self) -> Source {
            Source::PrimaryPlayerB
        }

        async fn probe(&self) -> Result<RawSnapshot, ProbeError> {
            self.polls.fetch_add(1, Ordering::SeqCst);
            Ok(RawSnapshot {
                title: "Song".into(),
                artist: "Band".into(),
                album: "Album".into(),
                duration: "30".into(),
                position: "10".into(),
                state: "playing".into(),
                url: String::new(),
            })
        }

        async fn fetch_artwork(&self, _snapshot: &RawSnapshot) -> Option<Artwork> {
            None
        }

        async fn send_command(&self, command: PlayerCommand) -> Result<(), ProbeError> {
            self.commands.lock().unwrap().push(command);
            Ok(())
        }
    }

    struct StaticLyrics;

    #[async_trait::async_trait]
    impl LyricsProvider for StaticLyrics {
        async fn get_exact(
            &self,
            _artist: &str,
            _title: &str,
            _duration_secs: u64,
        ) -> Result<Option<LyricsRecord>, LyricsError> {
            Ok(Some(LyricsRecord {
                synced_lyrics: Some("[00:05.00]first\n[00:11.00]second".into()),
                ..Default::default()
            }))
        }

        async fn search(&self, _query: &str) -> Result<Vec<LyricsRecord>, LyricsError> {
            Ok(Vec::new())
        }
    }

    fn service(probe: Arc<ScriptedProbe>) -> NowPlayingService {
        NowPlayingService::new(
            ServiceTiming {
                startup_delay: Duration::from_millis(500),
                poll_interval: Duration::from_secs(2),
                tick_interval: Duration::from_millis(500),
                probe_timeout: Duration::from_secs(3),
                command_refresh_delay: Duration::from_millis(300),
            },
            MatchOptions {
                tolerance: 10.0,
                offset: 0.0,
            },
            vec![probe as Arc<dyn Probe>],
            Arc::new(StaticLyrics),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn polls_after_startup_delay_and_loads_lyrics() {
        let probe = Arc::new(ScriptedProbe::default());
        let service = service(probe.clone());
        service.start();

        sleep(Duration::from_millis(400)).await;
        assert_eq!(probe.polls.load(Ordering::SeqCst), 0);

        sleep(Duration::from_millis(200)).await;
        let snapshot = service.store().snapshot();
        assert_eq!(snapshot.info.title, "Song");
        assert_eq!(snapshot.lyrics_status, LyricsStatus::Loaded);
        assert_eq!(
            service.lyrics().current_line(snapshot.info.elapsed).unwrap().text,
            "first"
        );
        service.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn elapsed_stays_within_duration() {
        let probe = Arc::new(ScriptedProbe::default());
        let service = service(probe);
        service.start();

        let mut last = 0.0;
        for _ in 0..40 {
            sleep(Duration::from_millis(250)).await;
            let elapsed = service.store().current().elapsed;
            assert!(elapsed <= 30.0);
            // Every poll resets to 10s, so only compare within a poll window.
            if elapsed < last {
                assert_eq!(elapsed, 10.0);
            }
            last = elapsed;
        }
        service.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn command_forces_repoll() {
        let probe = Arc::new(ScriptedProbe::default());
        let service = service(probe.clone());
        service.start();
        sleep(Duration::from_millis(600)).await;
        let before = probe.polls.load(Ordering::SeqCst);

        service.send_command(PlayerCommand::Next);
        sleep(Duration::from_millis(400)).await;

        assert_eq!(*probe.commands.lock().unwrap(), [PlayerCommand::Next]);
        assert_eq!(probe.polls.load(Ordering::SeqCst), before + 1);
        service.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn stop_halts_polling() {
        let probe = Arc::new(ScriptedProbe::default());
        let service = service(probe.clone());
        service.start();
        sleep(Duration::from_secs(1)).await;
        service.stop();

        let polls = probe.polls.load(Ordering::SeqCst);
        sleep(Duration::from_secs(10)).await;
        assert_eq!(probe.polls.load(Ordering::SeqCst), polls);
    }

    #[tokio::test(start_paused = true)]
    async fn skipping_without_source_goes_to_first_player() {
        let probe = Arc::new(ScriptedProbe::default());
        let service = service(probe.clone());
        assert_eq!(service.store().current().source, Source::None);

        service.send_command(PlayerCommand::PlayPause);
        service.send_command(PlayerCommand::Next);
        sleep(Duration::from_millis(400)).await;

        assert_eq!(*probe.commands.lock().unwrap(), [PlayerCommand::Next]);
    }

    #[tokio::test]
    async fn poll_once_publishes_snapshot() {
        let probe = Arc::new(ScriptedProbe::default());
        let service = service(probe);

        let result = service.poll_once().await;

        assert_eq!(result.info.source, Source::PrimaryPlayerB);
        assert_eq!(service.store().current().title, "Song");
    }
}
