//! Throttled, retrying client for the MLB Stats API

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use reqwest::{header, Client, StatusCode};
use serde_json::Value;
use tracing::{debug, info, warn};

use super::parse::is_pitcher;
use super::rate_limit::{run_with_retry, Attempt, RateLimiter, RetryPolicy};
use super::types::{PeopleEnvelope, StatsEnvelope, TeamsEnvelope};
use crate::cli::types::{PlayerId, Season, TeamId};
use crate::core::config::Settings;
use crate::core::http::{default_header_map, USER_AGENT};
use crate::error::{PitcherError, Result};


/// MLB's sport id for the major leagues.
const MLB_SPORT_ID: &str = "1";

/// Error bodies are cut to this many bytes before they reach an error value.
const ERROR_BODY_LIMIT: usize = 512;

pub struct MlbClient {
    client: Client,
    base_url: String,
    headers: header::HeaderMap,
    limiter: Arc<RateLimiter>,
    retry: RetryPolicy,
}

impl MlbClient {
    pub fn new(settings: &Settings) -> Result<Self> {
        Self::with_limiter(settings, Arc::new(RateLimiter::new(settings.rate_limit)))
    }

    /// Build a client around an existing limiter; clients sharing one limiter
    /// share its interval.
    pub fn with_limiter(settings: &Settings, limiter: Arc<RateLimiter>) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(settings.request_timeout)
            .build()?;
        Ok(Self {
            client,
            base_url: settings.api_base_url.trim_end_matches('/').to_string(),
            headers: default_header_map(settings.api_key.as_deref())?,
            limiter,
            retry: settings.retry.clone(),
        })
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    /// Throttled GET of `endpoint` (relative to the API root), returning the
    /// decoded JSON body.
    pub async fn request(&self, endpoint: &str, params: &[(&str, String)]) -> Result<Value> {
        let url = format!("{}/{}", self.base_url, endpoint.trim_start_matches('/'));
        let url = url.as_str();
        let clock = Arc::clone(self.limiter.clock());
        run_with_retry(&self.retry, clock.as_ref(), move |attempt| {
            self.send_once(url, params, attempt)
        })
        .await
    }

    async fn send_once(&self, url: &str, params: &[(&str, String)], attempt: u32) -> Attempt<Value> {
        self.limiter.acquire().await;
        debug!(url, attempt, "HTTP GET start");

        let response = match self
            .client
            .get(url)
            .headers(self.headers.clone())
            .query(params)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                let error = PitcherError::Network {
                    message: format!("GET {url}: {e}"),
                };
                return if e.is_timeout() || e.is_connect() || e.is_request() {
                    Attempt::Retryable {
                        error,
                        retry_after: None,
                    }
                } else {
                    Attempt::Fatal(error)
                };
            }
        };

        let status = response.status();
        if status.is_success() {
            return match response.bytes().await {
                Ok(body) => match serde_json::from_slice::<Value>(&body) {
                    Ok(value) => Attempt::Success(value),
                    Err(e) => Attempt::Fatal(e.into()),
                },
                Err(e) => Attempt::Retryable {
                    error: PitcherError::Network {
                        message: format!("reading body of {url}: {e}"),
                    },
                    retry_after: None,
                },
            };
        }

        let retry_after = parse_retry_after(response.headers());
        let mut body = response.text().await.unwrap_or_default();
        truncate_body(&mut body);
        let error = PitcherError::Api {
            status: status.as_u16(),
            body,
        };

        if status == StatusCode::TOO_MANY_REQUESTS {
            warn!(url, ?retry_after, "rate limited by server");
            Attempt::Retryable { error, retry_after }
        } else if status.is_server_error() {
            Attempt::Retryable {
                error,
                retry_after: None,
            }
        } else {
            Attempt::Fatal(error)
        }
    }

    /// Raw team records for a season.
    pub async fn get_teams(&self, season: Season) -> Result<Vec<Value>> {
        let params = [
            ("sportId", MLB_SPORT_ID.to_string()),
            ("season", season.to_string()),
        ];
        let envelope: TeamsEnvelope = serde_json::from_value(self.request("teams", &params).await?)?;
        info!(%season, count = envelope.teams.len(), "fetched teams");
        Ok(envelope.teams)
    }

    /// A single raw team record, `None` if the API returns an empty list.
    pub async fn get_team(&self, team_id: TeamId) -> Result<Option<Value>> {
        let envelope: TeamsEnvelope =
            serde_json::from_value(self.request(&format!("teams/{team_id}"), &[]).await?)?;
        Ok(envelope.teams.into_iter().next())
    }

    /// Raw player records for a season, keeping only pitchers.
    pub async fn get_pitchers(&self, season: Season) -> Result<Vec<Value>> {
        let params = [("season", season.to_string())];
        let endpoint = format!("sports/{MLB_SPORT_ID}/players");
        let envelope: PeopleEnvelope = serde_json::from_value(self.request(&endpoint, &params).await?)?;
        let total = envelope.people.len();
        let pitchers: Vec<Value> = envelope.people.into_iter().filter(is_pitcher).collect();
        info!(%season, total, pitchers = pitchers.len(), "fetched players");
        Ok(pitchers)
    }

    /// Season pitching stats payload for one player.
    pub async fn get_player_stats(&self, pitcher_id: PlayerId, season: Season) -> Result<Value> {
        let params = [
            ("stats", "season".to_string()),
            ("group", "pitching".to_string()),
            ("season", season.to_string()),
        ];
        self.request(&format!("people/{pitcher_id}/stats"), &params).await
    }

    /// Pitchers who appeared in a game between `start` and `end` inclusive.
    pub async fn get_active_pitcher_ids(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        season: Season,
    ) -> Result<Vec<PlayerId>> {
        let params = [
            ("stats", "byDateRange".to_string()),
            ("group", "pitching".to_string()),
            ("sportId", MLB_SPORT_ID.to_string()),
            ("season", season.to_string()),
            ("startDate", start.format("%Y-%m-%d").to_string()),
            ("endDate", end.format("%Y-%m-%d").to_string()),
            ("playerPool", "ALL".to_string()),
        ];
        let envelope: StatsEnvelope = serde_json::from_value(self.request("stats", &params).await?)?;
        let ids: Vec<PlayerId> = envelope.player_ids().into_iter().map(PlayerId::new).collect();
        info!(%start, %end, count = ids.len(), "fetched active pitchers");
        Ok(ids)
    }
}

/// `Retry-After` as delta-seconds or an HTTP date.
fn parse_retry_after(headers: &header::HeaderMap) -> Option<Duration> {
    let value = headers.get(header::RETRY_AFTER)?.to_str().ok()?.trim();
    if let Ok(secs) = value.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }
    let at = DateTime::parse_from_rfc2822(value).ok()?.with_timezone(&Utc);
    (at - Utc::now()).to_std().ok()
}

fn truncate_body(body: &mut String) {
    if body.len() > ERROR_BODY_LIMIT {
        let mut cut = ERROR_BODY_LIMIT;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        body.truncate(cut);
    }
}
