use std::time::Duration;

use reqwest::{header::USER_AGENT, Client, StatusCode};
use serde::Deserialize;
use tracing::debug;

use crate::{config::ApiConfiguration, error::LyricsError};

/// Timed lyrics backend.
#[async_trait::async_trait]
pub trait LyricsProvider: Send + Sync {
    /// Exact lookup; `Ok(None)` when the service has no record.
    async fn get_exact(
        &self,
        artist: &str,
        title: &str,
        duration_secs: u64,
    ) -> Result<Option<LyricsRecord>, LyricsError>;

    async fn search(&self, query: &str) -> Result<Vec<LyricsRecord>, LyricsError>;
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LyricsRecord {
    #[serde(default)]
    pub track_name: Option<String>,
    #[serde(default)]
    pub artist_name: Option<String>,
    /// Seconds
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default)]
    pub synced_lyrics: Option<String>,
}

impl LyricsRecord {
    pub fn synced(&self) -> Option<&str> {
        self.synced_lyrics
            .as_deref()
            .filter(|it| !it.trim().is_empty())
    }
}

/// Client for an LRCLIB compatible HTTP API.
#[derive(Debug, Clone)]
pub struct LrcLibClient {
    client: Client,
    base_url: String,
    user_agent: String,
    timeout: Duration,
}

impl LrcLibClient {
    pub fn new(client: Client, api: &ApiConfiguration) -> Self {
        Self {
            client,
            base_url: api.lyrics_api_url.trim_end_matches('/').to_owned(),
            user_agent: api.user_agent.clone(),
            timeout: Duration::from_secs(api.request_timeout_secs),
        }
    }

    async fn get(
        &self,
        endpoint: &str,
        query: &[(&str, &str)],
    ) -> Result<reqwest::Response, LyricsError> {
        let url = format!("{}/{endpoint}", self.base_url);
        debug!(%url, ?query, "lyrics request");
        self.client
            .get(url)
            .query(query)
            .header(USER_AGENT, &self.user_agent)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(LyricsError::from_reqwest)
    }
}

#[async_trait::async_trait]
impl LyricsProvider for LrcLibClient {
    async fn get_exact(
        &self,
        artist: &str,
        title: &str,
        duration_secs: u64,
    ) -> Result<Option<LyricsRecord>, LyricsError> {
        let duration = duration_secs.to_string();
        let resp = self
            .get(
                "get",
                &[
                    ("artist_name", artist),
                    ("track_name", title),
                    ("duration", duration.as_str()),
                ],
            )
            .await?;

        match resp.status() {
            // Song is unknown to the service
            StatusCode::NOT_FOUND => Ok(None),
            status if !status.is_success() => Err(LyricsError::Status(status.as_u16())),
            _ => resp
                .json::<LyricsRecord>()
                .await
                .map(Some)
                .map_err(LyricsError::from_reqwest),
        }
    }

    async fn search(&self, query: &str) -> Result<Vec<LyricsRecord>, LyricsError> {
        let resp = self.get("search", &[("q", query)]).await?;
        if !resp.status().is_success() {
            return Err(LyricsError::Status(resp.status().as_u16()));
        }
        resp.json::<Vec<LyricsRecord>>()
            .await
            .map_err(LyricsError::from_reqwest)
    }
}
