use crate::error::UploadError;
use crate::weather::DerivedOutdoorMetrics;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use url::form_urlencoded::byte_serialize;
use url::Url;

pub const SOFTWARE_TYPE: &str = "Pi3-SH-WR2-Updater";
const MAX_LOGGED_BODY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DestinationKind {
    /// Every outdoor reading, real-time protocol.
    Primary,
    /// Cadence-gated, standard protocol.
    Secondary,
}

impl DestinationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            DestinationKind::Primary => "primary",
            DestinationKind::Secondary => "secondary",
        }
    }

    fn action_pairs(self) -> &'static [(&'static str, &'static str)] {
        match self {
            DestinationKind::Primary => &[("realtime", "1"), ("rtfreq", "16")],
            DestinationKind::Secondary => &[("action", "updateraw")],
        }
    }
}

#[derive(Debug, Clone)]
pub struct Destination {
    pub kind: DestinationKind,
    pub endpoint: Url,
    pub station_id: String,
    pub station_key: String,
}

impl Destination {
    pub fn name(&self) -> &'static str {
        self.kind.as_str()
    }

    /// Full request URL for one observation.
    pub fn request_url(&self, metrics: &DerivedOutdoorMetrics) -> Url {
        let fields = metrics.wire_fields();
        let mut pairs: Vec<(&str, &str)> = vec![
            ("ID", self.station_id.as_str()),
            ("PASSWORD", self.station_key.as_str()),
        ];
        pairs.extend(fields.pairs());
        pairs.push(("softwaretype", SOFTWARE_TYPE));
        pairs.extend(self.kind.action_pairs().iter().copied());

        let query = pairs
            .iter()
            .map(|(key, value)| format!("{key}={}", percent_encode(value)))
            .collect::<Vec<_>>()
            .join("&");
        let mut url = self.endpoint.clone();
        url.set_query(Some(&query));
        url
    }

    /// Same as `request_url` with the station key masked, for logs.
    pub fn redacted_url(&self, metrics: &DerivedOutdoorMetrics) -> String {
        let url = self.request_url(metrics).to_string();
        let secret = format!("PASSWORD={}", percent_encode(&self.station_key));
        url.replace(&secret, "PASSWORD=***")
    }
}

/// Strict percent-encoding: a space becomes `%20`, never `+`.
fn percent_encode(value: &str) -> String {
    byte_serialize(value.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadOutcome {
    Accepted,
    /// Uploads are disabled; the request was built and logged only.
    DryRun,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct UploadStats {
    pub success: u64,
    pub failure: u64,
}

impl UploadStats {
    pub fn record(&mut self, result: &Result<UploadOutcome, UploadError>) {
        match result {
            Ok(UploadOutcome::Accepted) => self.success += 1,
            Ok(UploadOutcome::DryRun) => {}
            Err(_) => self.failure += 1,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Uploader {
    client: Client,
    enabled: bool,
}

impl Uploader {
    pub fn new(timeout: Duration, enabled: bool) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("weather-relay/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client, enabled })
    }

    /// One GET per call; there is no retry.
    pub async fn send(
        &self,
        destination: &Destination,
        metrics: &DerivedOutdoorMetrics,
    ) -> Result<UploadOutcome, UploadError> {
        let name = destination.name();
        tracing::debug!(
            destination = name,
            url = %destination.redacted_url(metrics),
            "uploading observation"
        );
        if !self.enabled {
            tracing::info!(
                destination = name,
                url = %destination.redacted_url(metrics),
                "uploads disabled; skipping request"
            );
            return Ok(UploadOutcome::DryRun);
        }

        let response = self
            .client
            .get(destination.request_url(metrics))
            .send()
            .await
            .map_err(|source| UploadError::Transport {
                destination: name,
                source,
            })?;
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let body = truncate(body.trim(), MAX_LOGGED_BODY);
        tracing::info!(
            destination = name,
            status = status.as_u16(),
            body = %body,
            "upload response"
        );

        if status == StatusCode::OK {
            Ok(UploadOutcome::Accepted)
        } else {
            Err(UploadError::Status {
                destination: name,
                status: status.as_u16(),
                body,
            })
        }
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
