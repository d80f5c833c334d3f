use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::Context;
use home::home_dir;
use ratatui::style::Color;
use serde::{
    de::{DeserializeOwned, Visitor},
    Deserialize,
};
use tokio::io::AsyncReadExt;

use crate::{lyrics::DEFAULT_OFFSET, source::ScriptedApp};

#[derive(Debug, Clone, Default)]
pub struct RefrainConfig {
    pub api: ApiConfiguration,
    pub general: GeneralConfiguration,
    pub theme: ThemeConfiguration,
}

impl RefrainConfig {
    /// Reads `path`, or the default location when `None`. A missing file
    /// means defaults.
    pub async fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let path = match path {
            Some(path) => path.to_owned(),
            None => config_dir()?.join("config.toml"),
        };
        if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
            return Ok(Self::default());
        }
        let str = read_file(&path).await?;
        let base = path.parent().map(Path::to_owned).unwrap_or_default();
        Self::read_from_str(&str, &base)
            .await
            .with_context(|| format!("invalid config file {}", path.display()))
    }

    pub async fn read_from_str(str: &str, base: &Path) -> anyhow::Result<Self> {
        let unresolved = toml::from_str::<RefrainConfigUnresolved>(str)?;
        let theme = unresolved.theme.resolve(base).await?;
        let api = unresolved.api.resolve(base).await?;
        let general = unresolved.general.resolve(base).await?;
        Ok(Self {
            theme,
            api,
            general,
        })
    }
}

pub fn config_dir() -> anyhow::Result<PathBuf> {
    let home = home_dir().context("could not determine home directory")?;
    Ok(home.join(".config").join("refrain"))
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfiguration {
    pub lyrics_api_url: String,
    pub user_agent: String,
    pub request_timeout_secs: u64,
}

impl Default for ApiConfiguration {
    fn default() -> Self {
        Self {
            lyrics_api_url: "https://lrclib.net/api".to_owned(),
            user_agent: concat!("refrain/", env!("CARGO_PKG_VERSION")).to_owned(),
            request_timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GeneralConfiguration {
    pub startup_delay_ms: u64,
    pub poll_interval_ms: u64,
    pub tick_interval_ms: u64,
    pub probe_timeout_ms: u64,
    pub command_refresh_delay_ms: u64,
    pub idle_timeout_ms: u64,
    pub lyric_offset_ms: u64,
    pub match_tolerance_secs: f64,
    /// Probing order, highest priority first.
    pub sources: Vec<ScriptedApp>,
    pub romanize_unicode: bool,
    pub display: DisplayConfig,
}

impl GeneralConfiguration {
    pub fn startup_delay(&self) -> Duration {
        Duration::from_millis(self.startup_delay_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn command_refresh_delay(&self) -> Duration {
        Duration::from_millis(self.command_refresh_delay_ms)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }

    pub fn lyric_offset(&self) -> f64 {
        self.lyric_offset_ms as f64 / 1000.0
    }
}

impl Default for GeneralConfiguration {
    fn default() -> Self {
        Self {
            startup_delay_ms: 500,
            poll_interval_ms: 2000,
            tick_interval_ms: 500,
            probe_timeout_ms: 3000,
            command_refresh_delay_ms: 300,
            idle_timeout_ms: 5000,
            lyric_offset_ms: (DEFAULT_OFFSET * 1000.0).round() as u64,
            match_tolerance_secs: 10.0,
            sources: vec![ScriptedApp::Spotify, ScriptedApp::Music, ScriptedApp::Safari],
            romanize_unicode: false,
            display: DisplayConfig::default(),
        }
    }
}

/// Handlebars templates; `title`, `artist`, `album` and `source` are
/// available.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    pub title_format: String,
    pub subtitle_format: String,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            title_format: "{{title}}".to_owned(),
            subtitle_format: "{{artist}}{{#if album}} · {{album}}{{/if}}".to_owned(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ThemeConfiguration {
    pub pill_color: ThemeColor,
    pub text_color: ThemeColor,
    pub faded_text_color: ThemeColor,
    pub active_lyric_color: ThemeColor,
    pub inactive_lyric_color: ThemeColor,
    pub progress_color: ThemeColor,
    pub favorite_color: ThemeColor,
}

impl Default for ThemeConfiguration {
    fn default() -> Self {
        Self {
            pill_color: ThemeColor(Color::Black),
            text_color: ThemeColor(Color::White),
            faded_text_color: ThemeColor(Color::DarkGray),
            active_lyric_color: ThemeColor(Color::White),
            inactive_lyric_color: ThemeColor(Color::Gray),
            progress_color: ThemeColor(Color::LightBlue),
            favorite_color: ThemeColor(Color::Yellow),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(transparent)]
pub struct ThemeColor(pub Color);

impl<'de> Deserialize<'de> for ThemeColor {
    fn deserialize<D>(de: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        de.deserialize_str(ColorVisitor)
    }
}

struct ColorVisitor;

impl<'v> Visitor<'v> for ColorVisitor {
    type Value = ThemeColor;

    fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(formatter, "a named color or a #rrggbb string")
    }

    fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
    where
        E: serde::de::Error,
    {
        if let Some(stripped) = v.strip_prefix('#') {
            let color_rgb = u32::from_str_radix(stripped, 16).map_err(|e| {
                serde::de::Error::custom(format!("Invalid hex string for color {e}"))
            })?;
            let r = (color_rgb & 0xFF0000) >> 16;
            let g = (color_rgb & 0x00FF00) >> 8;
            let b = color_rgb & 0x0000FF;
            Ok(ThemeColor(Color::Rgb(r as u8, g as u8, b as u8)))
        } else {
            v.parse::<Color>()
                .map_err(|e| serde::de::Error::custom(format!("Invalid named color format {e}")))
                .map(ThemeColor)
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
struct RefrainConfigUnresolved {
    general: MaybeLink<GeneralConfiguration>,
    api: MaybeLink<ApiConfiguration>,
    theme: MaybeLink<ThemeConfiguration>,
}

impl Default for RefrainConfigUnresolved {
    fn default() -> Self {
        Self {
            general: MaybeLink::Explicit(Default::default()),
            api: MaybeLink::Explicit(Default::default()),
            theme: MaybeLink::Explicit(Default::default()),
        }
    }
}

/// A section written inline, or `{ include = "file.toml" }` relative to the
/// config directory.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum MaybeLink<V> {
    Link { include: PathBuf },
    Explicit(V),
}

impl<V: DeserializeOwned> MaybeLink<V> {
    async fn resolve(self, base: &Path) -> anyhow::Result<V> {
        match self {
            MaybeLink::Explicit(value) => Ok(value),
            MaybeLink::Link { include } => {
                let path = base.join(include);
                let str = read_file(&path).await?;
                toml::from_str(&str)
                    .with_context(|| format!("invalid included config {}", path.display()))
            }
        }
    }
}

async fn read_file(path: &Path) -> anyhow::Result<String> {
    let mut file = tokio::fs::File::open(path)
        .await
        .with_context(|| format!("could not open {}", path.display()))?;
    let mut str = String::new();
    file.read_to_string(&mut str).await?;
    Ok(str)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn empty_file_means_defaults() {
        let config = RefrainConfig::read_from_str("", Path::new("."))
            .await
            .unwrap();
        assert_eq!(config.general.poll_interval(), Duration::from_secs(2));
        assert_eq!(config.general.tick_interval(), Duration::from_millis(500));
        assert_eq!(config.general.match_tolerance_secs, 10.0);
        assert_eq!(config.general.lyric_offset(), 0.2);
        assert_eq!(config.api.lyrics_api_url, "https://lrclib.net/api");
        assert_eq!(
            config.general.sources,
            [ScriptedApp::Spotify, ScriptedApp::Music, ScriptedApp::Safari]
        );
    }

    #[tokio::test]
    async fn partial_sections_keep_other_defaults() {
        let config = RefrainConfig::read_from_str(
            r##"
            [general]
            poll_interval_ms = 1000
            sources = ["music", "safari"]

            [theme]
            progress_color = "#ff8000"
            favorite_color = "red"
            "##,
            Path::new("."),
        )
        .await
        .unwrap();

        assert_eq!(config.general.poll_interval_ms, 1000);
        assert_eq!(config.general.idle_timeout_ms, 5000);
        assert_eq!(
            config.general.sources,
            [ScriptedApp::Music, ScriptedApp::Safari]
        );
        assert_eq!(config.theme.progress_color, ThemeColor(Color::Rgb(255, 128, 0)));
        assert_eq!(config.theme.favorite_color, ThemeColor(Color::Red));
        assert_eq!(config.theme.text_color, ThemeColor(Color::White));
    }

    #[tokio::test]
    async fn includes_are_resolved_relative_to_base() {
        let dir = std::env::temp_dir().join(format!("refrain-config-{}", std::process::id()));
        tokio::fs::create_dir_all(&dir).await.unwrap();
        tokio::fs::write(
            dir.join("api.toml"),
            "lyrics_api_url = \"http://localhost:3000/api\"\n",
        )
        .await
        .unwrap();

        let config = RefrainConfig::read_from_str(
            "[api]\ninclude = \"api.toml\"\n",
            &dir,
        )
        .await
        .unwrap();

        assert_eq!(config.api.lyrics_api_url, "http://localhost:3000/api");
        assert_eq!(config.api.request_timeout_secs, 10);
        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }

    #[tokio::test]
    async fn rejects_bad_color() {
        let result = RefrainConfig::read_from_str(
            "[theme]\nprogress_color = \"#zzzzzz\"\n",
            Path::new("."),
        )
        .await;
        assert!(result.is_err());
    }
}
