//! Live charger-status client.
//!
//! One request per station, returning the per-connector state list. A
//! timeout or error here means "status unknown", never "station unavailable":
//! the caller keeps the station in its results with unknown counts.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::errors::AppError;
use crate::helpers::de_opt_f64_lenient;

/// Connector state, decoded from the provider's numeric status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ConnectorStatus {
    /// Station reachable, connector idle (code "2")
    Available,
    /// Actively charging a vehicle (code "3")
    Charging,
    /// Station↔operator link down (code "1")
    CommunicationError,
    /// Taken out of operation (code "4")
    Suspended,
    /// Under maintenance (code "5")
    Inspecting,
    /// Unreported or unrecognized code (including "9")
    Unknown,
}

impl ConnectorStatus {
    fn from_code(code: &str) -> Self {
        match code.trim() {
            "1" => ConnectorStatus::CommunicationError,
            "2" => ConnectorStatus::Available,
            "3" => ConnectorStatus::Charging,
            "4" => ConnectorStatus::Suspended,
            "5" => ConnectorStatus::Inspecting,
            _ => ConnectorStatus::Unknown,
        }
    }
}

/// One charger connector at a station.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct Connector {
    pub status: ConnectorStatus,
    /// Rated output in kW, when reported
    pub output_kw: Option<f64>,
    /// When the provider last refreshed this connector's state
    pub last_update: Option<DateTime<Utc>>,
}

/// Count (available, total) connectors.
pub fn count_available(connectors: &[Connector]) -> (u32, u32) {
    let available = connectors
        .iter()
        .filter(|c| c.status == ConnectorStatus::Available)
        .count() as u32;
    (available, connectors.len() as u32)
}

// --- Status API wire types ---

#[derive(Debug, Deserialize)]
struct StatusResponse {
    #[serde(default)]
    items: StatusItems,
}

#[derive(Debug, Default, Deserialize)]
struct StatusItems {
    #[serde(default)]
    item: Vec<ChargerItem>,
}

#[derive(Debug, Deserialize)]
struct ChargerItem {
    #[serde(default)]
    stat: String,
    #[serde(default, deserialize_with = "de_opt_f64_lenient")]
    output: Option<f64>,
    #[serde(rename = "statUpdDt", default)]
    stat_upd_dt: Option<String>,
}

/// Timestamp format used by the status provider ("20260805143000").
const STATUS_TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

fn parse_status_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(raw.trim(), STATUS_TIMESTAMP_FORMAT)
        .ok()
        .map(|naive| DateTime::from_naive_utc_and_offset(naive, Utc))
}

/// Client for the live charger-status API.
#[derive(Debug, Clone)]
pub struct ChargerStatusClient {
    client: reqwest::Client,
    base_url: String,
    service_key: String,
}

impl ChargerStatusClient {
    pub fn new(base_url: &str, service_key: &str, timeout: std::time::Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("Failed to build HTTP client");
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            service_key: service_key.to_string(),
        }
    }

    /// Fetch the connector list for one station.
    pub async fn fetch_station_status(&self, station_id: &str) -> Result<Vec<Connector>, AppError> {
        let url = format!("{}/getChargerInfo", self.base_url);

        let response = self
            .client
            .get(&url)
            .query(&[
                ("serviceKey", self.service_key.as_str()),
                ("numOfRows", "9999"),
                ("pageNo", "1"),
                ("statId", station_id),
                ("dataType", "JSON"),
            ])
            .send()
            .await
            .map_err(|e| {
                AppError::ExternalServiceError(format!(
                    "status request failed for station {}: {}",
                    station_id, e
                ))
            })?;

        if !response.status().is_success() {
            return Err(AppError::ExternalServiceError(format!(
                "status API returned HTTP {} for station {}",
                response.status(),
                station_id
            )));
        }

        let parsed: StatusResponse = response.json().await.map_err(|e| {
            AppError::ExternalServiceError(format!(
                "status JSON parse error for station {}: {}",
                station_id, e
            ))
        })?;

        Ok(parsed
            .items
            .item
            .into_iter()
            .map(|item| Connector {
                status: ConnectorStatus::from_code(&item.stat),
                output_kw: item.output,
                last_update: item.stat_upd_dt.as_deref().and_then(parse_status_timestamp),
            })
            .collect())
    }
}
