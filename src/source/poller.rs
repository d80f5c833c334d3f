use std::{sync::Arc, time::Duration};

use tokio::time::timeout;
use tracing::{debug, warn};

use crate::model::{Artwork, NowPlayingInfo, Source};

use super::{PlayerCommand, Probe, RawSnapshot};

/// Outcome of one complete poll cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct PollResult {
    pub info: NowPlayingInfo,
    pub artwork: Option<Artwork>,
}

impl PollResult {
    pub fn nothing_playing() -> Self {
        Self {
            info: NowPlayingInfo::nothing_playing(),
            artwork: None,
        }
    }
}

/// Runs the probes in priority order and keeps the first one presenting
/// media. Probes after the winner are never invoked.
pub struct SourcePoller {
    probes: Vec<Arc<dyn Probe>>,
    probe_timeout: Duration,
}

impl SourcePoller {
    pub fn new(probes: Vec<Arc<dyn Probe>>, probe_timeout: Duration) -> Self {
        Self {
            probes,
            probe_timeout,
        }
    }

    pub fn probe_for(&self, source: Source) -> Option<Arc<dyn Probe>> {
        self.probes.iter().find(|it| it.source() == source).cloned()
    }

    /// Highest priority probe able to run `command`.
    pub fn first_supporting(&self, command: PlayerCommand) -> Option<Arc<dyn Probe>> {
        self.probes.iter().find(|it| it.supports(command)).cloned()
    }

    /// Upper bound for a whole cycle: every probe times out, then the winner's
    /// artwork fetch times out too. Half a probe timeout of slack on top.
    pub fn cycle_timeout(&self) -> Duration {
        self.probe_timeout * (self.probes.len() as u32 + 1) + self.probe_timeout / 2
    }

    pub async fn poll(&self) -> PollResult {
        for probe in &self.probes {
            let source = probe.source();
            let raw = match timeout(self.probe_timeout, probe.probe()).await {
                Ok(Ok(raw)) => raw,
                Ok(Err(err)) => {
                    debug!(%source, "source unavailable: {err}");
                    continue;
                }
                Err(_) => {
                    warn!(%source, timeout = ?self.probe_timeout, "probe timed out");
                    continue;
                }
            };

            let Some(info) = normalize(source, &raw) else {
                debug!(%source, "source is not presenting media");
                continue;
            };

            let artwork = match timeout(self.probe_timeout, probe.fetch_artwork(&raw)).await {
                Ok(artwork) => artwork,
                Err(_) => {
                    debug!(%source, "artwork fetch timed out");
                    None
                }
            };

            return PollResult { info, artwork };
        }

        PollResult::nothing_playing()
    }
}

/// Turns a raw answer into a snapshot, or `None` when the source should not
/// count as present.
///
/// Dedicated players surface paused tracks. The browser source only counts
/// while its media element is actually playing, so background tabs never
/// shadow anything.
pub fn normalize(source: Source, raw: &RawSnapshot) -> Option<NowPlayingInfo> {
    let is_playing = raw.state.to_lowercase().contains("playing");
    match source {
        Source::None => return None,
        Source::BrowserFallback if !is_playing => return None,
        _ => {}
    }
    if raw.title.trim().is_empty() {
        return None;
    }

    let mut duration = parse_seconds(&raw.duration);
    if source == Source::PrimaryPlayerA {
        // Spotify reports milliseconds
        duration /= 1000.0;
    }

    Some(NowPlayingInfo {
        title: raw.title.trim().to_owned(),
        artist: raw.artist.trim().to_owned(),
        album: raw.album.trim().to_owned(),
        is_playing,
        duration,
        elapsed: parse_seconds(&raw.position),
        source,
        is_favorited: false,
        track_url: if source == Source::BrowserFallback {
            raw.url.clone()
        } else {
            String::new()
        },
    })
}

fn parse_seconds(value: &str) -> f64 {
    value
        .trim()
        .replace(',', ".")
        .parse::<f64>()
        .ok()
        .filter(|it| it.is_finite() && *it >= 0.0)
        .unwrap_or(0.0)
}
