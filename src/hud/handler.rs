use std::sync::Arc;

use tracing::{debug, warn};

use crate::{
    config::RefrainConfig,
    event::ControlEvent,
    lyrics::LyricsSync,
    playback::PlaybackStore,
    service::NowPlayingService,
};

/// Read side handed to a front end.
#[derive(Clone)]
pub struct HudView {
    pub store: Arc<PlaybackStore>,
    pub lyrics: Arc<LyricsSync>,
}

pub struct HudHandler<T: HudBackend> {
    service: Arc<NowPlayingService>,
    backend: T,
}

#[async_trait::async_trait]
pub trait HudBackend {
    /// Runs until the user quits. Requests go out through `control`.
    async fn run_backend(
        &mut self,
        view: HudView,
        control: flume::Sender<ControlEvent>,
        config: Arc<RefrainConfig>,
    ) -> anyhow::Result<()>;
}

impl<T: HudBackend + Send + Sync + 'static> HudHandler<T> {
    pub fn new(service: Arc<NowPlayingService>, backend: T) -> Self {
        Self { service, backend }
    }

    pub async fn run(mut self, config: Arc<RefrainConfig>) -> anyhow::Result<()> {
        let (control_tx, control_rx) = flume::unbounded();
        let view = HudView {
            store: self.service.store().clone(),
            lyrics: self.service.lyrics().clone(),
        };

        self.service.start();
        let service = self.service.clone();
        let event_handler =
            tokio::task::spawn(async move { Self::run_event_handler(service, control_rx).await });
        let backend_handler = tokio::task::spawn(async move {
            self.backend.run_backend(view, control_tx, config).await
        });
        let (events, backend) = tokio::join!(event_handler, backend_handler);
        events??;
        backend??;
        Ok(())
    }

    async fn run_event_handler(
        service: Arc<NowPlayingService>,
        control_rx: flume::Receiver<ControlEvent>,
    ) -> anyhow::Result<()> {
        while let Ok(event) = control_rx.recv_async().await {
            debug!(?event, "control event");
            match event {
                ControlEvent::Command(command) => service.send_command(command),
                ControlEvent::ToggleFavorite => {
                    service.store().toggle_favorite();
                }
                ControlEvent::OpenTrackUrl => {
                    let url = service.store().current().track_url;
                    if url.is_empty() {
                        continue;
                    }
                    if let Err(err) = webbrowser::open(&url) {
                        warn!(%url, "could not open browser: {err}");
                    }
                }
                ControlEvent::Refresh => service.refresh(),
            }
        }
        service.stop();
        Ok(())
    }
}
