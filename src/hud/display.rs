use handlebars::Handlebars;
use serde::Serialize;

use crate::{config::DisplayConfig, model::NowPlayingInfo};

const TITLE: &str = "title";
const SUBTITLE: &str = "subtitle";

#[derive(Serialize)]
struct TrackFields<'a> {
    title: &'a str,
    artist: &'a str,
    album: &'a str,
    source: &'a str,
}

/// Renders the title and subtitle lines of the panel from the configured
/// templates.
pub struct TrackFormatter {
    registry: Handlebars<'static>,
    romanize: bool,
}

impl TrackFormatter {
    pub fn new(display: &DisplayConfig, romanize: bool) -> anyhow::Result<Self> {
        let mut registry = Handlebars::new();
        registry.register_escape_fn(handlebars::no_escape);
        registry.register_template_string(TITLE, &display.title_format)?;
        registry.register_template_string(SUBTITLE, &display.subtitle_format)?;
        Ok(Self { registry, romanize })
    }

    pub fn title(&self, info: &NowPlayingInfo) -> String {
        self.render(TITLE, info)
            .unwrap_or_else(|| self.text(&info.title))
    }

    pub fn subtitle(&self, info: &NowPlayingInfo) -> String {
        self.render(SUBTITLE, info)
            .unwrap_or_else(|| self.text(&info.artist))
    }

    /// Applies romanization when enabled.
    pub fn text(&self, text: &str) -> String {
        if self.romanize {
            deunicode::deunicode(text)
        } else {
            text.to_owned()
        }
    }

    fn render(&self, template: &str, info: &NowPlayingInfo) -> Option<String> {
        let fields = TrackFields {
            title: &info.title,
            artist: &info.artist,
            album: &info.album,
            source: info.source.label(),
        };
        match self.registry.render(template, &fields) {
            Ok(rendered) => Some(self.text(&rendered)),
            Err(err) => {
                tracing::warn!(template, "display template failed: {err}");
                None
            }
        }
    }
}
