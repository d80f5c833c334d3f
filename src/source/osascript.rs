//! Probes backed by AppleScript, run through `osascript`.
//!
//! Every script answers with either a sentinel word (`NOT_RUNNING`,
//! `STOPPED`, `NOT_FOUND`) or a `|||` separated record.

use std::{process::Stdio, sync::Arc, time::Duration};

use reqwest::Client;
use serde::Deserialize;
use tokio::process::Command;
use tracing::debug;

use crate::{
    error::ProbeError,
    model::{Artwork, Source, BROWSER_PLACEHOLDER_ARTIST, BROWSER_PLACEHOLDER_TITLE},
};

use super::{PlayerCommand, Probe, RawSnapshot};

const FIELD_SEPARATOR: &str = "|||";

const TITLE_SUFFIXES: [&str; 3] = [" - YouTube", " - Netflix", " | TED"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScriptedApp {
    Spotify,
    Music,
    Safari,
}

impl ScriptedApp {
    pub fn source(self) -> Source {
        match self {
            ScriptedApp::Spotify => Source::PrimaryPlayerA,
            ScriptedApp::Music => Source::PrimaryPlayerB,
            ScriptedApp::Safari => Source::BrowserFallback,
        }
    }

    fn application(self) -> &'static str {
        match self {
            ScriptedApp::Spotify => "Spotify",
            ScriptedApp::Music => "Music",
            ScriptedApp::Safari => "Safari",
        }
    }

    fn state_script(self) -> String {
        match self {
            ScriptedApp::Spotify | ScriptedApp::Music => {
                let app = self.application();
                format!(
                    r#"
                    tell application "System Events"
                        if not (exists process "{app}") then return "NOT_RUNNING"
                    end tell
                    tell application "{app}"
                        if player state is stopped then return "STOPPED"
                        set trackName to name of current track
                        set artistName to artist of current track
                        set albumName to album of current track
                        set trackDuration to duration of current track
                        set trackPosition to player position
                        set playState to player state as string
                        return trackName & "|||" & artistName & "|||" & albumName & "|||" & trackDuration & "|||" & trackPosition & "|||" & playState
                    end tell
                    "#
                )
            }
            ScriptedApp::Safari => r#"
                tell application "System Events"
                    if not (exists process "Safari") then return "NOT_RUNNING"
                end tell
                tell application "Safari"
                    if (count of windows) is 0 then return "NOT_RUNNING"
                    set js to "(function() { var vids = document.getElementsByTagName('video'); for (var i = 0; i < vids.length; i++) { if (!vids[i].paused && vids[i].duration > 1) { return 'PLAYING'; } } return 'NOT_PLAYING'; })()"
                    repeat with w in windows
                        repeat with t in tabs of w
                            try
                                if (do JavaScript js in t) is "PLAYING" then
                                    return (name of t) & "|||" & (URL of t)
                                end if
                            end try
                        end repeat
                    end repeat
                    return "NOT_FOUND"
                end tell
                "#
            .to_owned(),
        }
    }

    fn command_script(self, command: PlayerCommand) -> Option<String> {
        let app = self.application();
        match (self, command) {
            (ScriptedApp::Safari, PlayerCommand::PlayPause) => Some(
                r#"
                tell application "Safari"
                    do JavaScript "(function() { var v = document.querySelector('video'); if (v) { if (v.paused) { v.play(); } else { v.pause(); } } })()" in document 1
                end tell
                "#
                .to_owned(),
            ),
            (ScriptedApp::Safari, _) => None,
            (_, PlayerCommand::PlayPause) => Some(format!(r#"tell application "{app}" to playpause"#)),
            (_, PlayerCommand::Next) => Some(format!(r#"tell application "{app}" to next track"#)),
            (_, PlayerCommand::Previous) => {
                Some(format!(r#"tell application "{app}" to previous track"#))
            }
        }
    }
}

/// A [`Probe`] for one scriptable application.
pub struct OsaScriptProbe {
    app: ScriptedApp,
    timeout: Duration,
    client: Client,
}

impl OsaScriptProbe {
    pub fn new(app: ScriptedApp, timeout: Duration, client: Client) -> Self {
        Self {
            app,
            timeout,
            client,
        }
    }

    async fn run_script(&self, script: &str) -> Result<String, ProbeError> {
        let child = Command::new("osascript")
            .arg("-e")
            .arg(script)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(self.timeout, child)
            .await
            .map_err(|_| ProbeError::Timeout)?
            .map_err(|e| ProbeError::ExecutionError(e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ProbeError::ExecutionError(stderr.trim().to_owned()));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_owned())
    }

    async fn spotify_artwork(&self) -> Option<Artwork> {
        let url = self
            .run_script(r#"tell application "Spotify" to return artwork url of current track"#)
            .await
            .ok()
            .filter(|it| it.starts_with("http"))?;
        let resp = self
            .client
            .get(&url)
            .timeout(self.timeout)
            .send()
            .await
            .ok()?;
        if !resp.status().is_success() {
            debug!(status = %resp.status(), "artwork download failed");
            return None;
        }
        let bytes = resp.bytes().await.ok()?;
        Some(Arc::new(bytes.to_vec()))
    }

    async fn music_artwork(&self) -> Option<Artwork> {
        let path = self
            .run_script(
                r#"
                tell application "Music"
                    try
                        set artworkData to data of artwork 1 of current track
                        set tempPath to (path to temporary items as text) & "refrain-artwork.jpg"
                        set fileRef to open for access file tempPath with write permission
                        set eof fileRef to 0
                        write artworkData to fileRef
                        close access fileRef
                        return POSIX path of file tempPath
                    on error
                        return ""
                    end try
                end tell
                "#,
            )
            .await
            .ok()
            .filter(|it| !it.is_empty())?;
        tokio::fs::read(path).await.ok().map(Arc::new)
    }
}

#[async_trait::async_trait]
impl Probe for OsaScriptProbe {
    fn source(&self) -> Source {
        self.app.source()
    }

    async fn probe(&self) -> Result<RawSnapshot, ProbeError> {
        let output = self.run_script(&self.app.state_script()).await?;
        match self.app {
            ScriptedApp::Safari => parse_browser_record(&output),
            _ => parse_player_record(&output),
        }
    }

    async fn fetch_artwork(&self, _snapshot: &RawSnapshot) -> Option<Artwork> {
        match self.app {
            ScriptedApp::Spotify => self.spotify_artwork().await,
            ScriptedApp::Music => self.music_artwork().await,
            ScriptedApp::Safari => None,
        }
    }

    async fn send_command(&self, command: PlayerCommand) -> Result<(), ProbeError> {
        let script = self
            .app
            .command_script(command)
            .ok_or(ProbeError::Unsupported(command.name()))?;
        self.run_script(&script).await.map(|_| ())
    }

    fn supports(&self, command: PlayerCommand) -> bool {
        self.app.command_script(command).is_some()
    }
}

fn check_sentinel(output: &str) -> Result<(), ProbeError> {
    match output {
        "NOT_RUNNING" => Err(ProbeError::NotRunning),
        "STOPPED" => Err(ProbeError::Stopped),
        "NOT_FOUND" | "" => Err(ProbeError::NoDocument),
        _ => Ok(()),
    }
}

fn parse_player_record(output: &str) -> Result<RawSnapshot, ProbeError> {
    check_sentinel(output)?;
    let parts: Vec<&str> = output.split(FIELD_SEPARATOR).collect();
    let [title, artist, album, duration, position, state, ..] = parts[..] else {
        return Err(ProbeError::NoDocument);
    };
    Ok(RawSnapshot {
        title: title.to_owned(),
        artist: artist.to_owned(),
        album: album.to_owned(),
        duration: duration.to_owned(),
        position: position.to_owned(),
        state: state.to_owned(),
        url: String::new(),
    })
}

fn parse_browser_record(output: &str) -> Result<RawSnapshot, ProbeError> {
    check_sentinel(output)?;
    let mut parts = output.split(FIELD_SEPARATOR);
    let name = parts.next().unwrap_or_default();
    let url = parts.next().unwrap_or_default();

    let mut title = name.to_owned();
    for suffix in TITLE_SUFFIXES {
        title = title.replace(suffix, "");
    }
    let title = match title.trim() {
        "" => BROWSER_PLACEHOLDER_TITLE.to_owned(),
        trimmed => trimmed.to_owned(),
    };

    Ok(RawSnapshot {
        title,
        artist: BROWSER_PLACEHOLDER_ARTIST.to_owned(),
        state: "playing".to_owned(),
        url: url.trim().to_owned(),
        ..Default::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_player_record() {
        let raw = parse_player_record("Song|||Band|||Album|||215000|||12.5|||playing").unwrap();
        assert_eq!(raw.title, "Song");
        assert_eq!(raw.artist, "Band");
        assert_eq!(raw.album, "Album");
        assert_eq!(raw.duration, "215000");
        assert_eq!(raw.position, "12.5");
        assert_eq!(raw.state, "playing");
    }

    #[test]
    fn maps_sentinels_to_errors() {
        assert_eq!(parse_player_record("NOT_RUNNING"), Err(ProbeError::NotRunning));
        assert_eq!(parse_player_record("STOPPED"), Err(ProbeError::Stopped));
        assert_eq!(parse_browser_record("NOT_FOUND"), Err(ProbeError::NoDocument));
    }

    #[test]
    fn short_record_is_no_document() {
        assert_eq!(
            parse_player_record("Song|||Band|||Album"),
            Err(ProbeError::NoDocument)
        );
    }

    #[test]
    fn cleans_browser_titles() {
        let raw =
            parse_browser_record("Live Session - YouTube|||https://youtube.com/watch?v=1").unwrap();
        assert_eq!(raw.title, "Live Session");
        assert_eq!(raw.artist, BROWSER_PLACEHOLDER_ARTIST);
        assert_eq!(raw.url, "https://youtube.com/watch?v=1");
        assert_eq!(raw.state, "playing");

        let raw = parse_browser_record(" - Netflix|||").unwrap();
        assert_eq!(raw.title, BROWSER_PLACEHOLDER_TITLE);
    }

    #[test]
    fn browser_only_supports_play_pause() {
        assert!(ScriptedApp::Safari
            .command_script(PlayerCommand::PlayPause)
            .is_some());
        assert!(ScriptedApp::Safari.command_script(PlayerCommand::Next).is_none());
        assert!(ScriptedApp::Safari
            .command_script(PlayerCommand::Previous)
            .is_none());
        assert!(ScriptedApp::Music.command_script(PlayerCommand::Next).is_some());
    }
}
