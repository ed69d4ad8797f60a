/// Application configuration, parsed from environment variables.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    /// Base URL of the routing oracle (Tmap-compatible directions API).
    pub directions_base_url: String,
    /// App key sent with every directions request.
    pub directions_app_key: String,
    /// Base URL of the corridor station-search service.
    pub station_search_base_url: String,
    /// Base URL of the live charger-status service.
    pub charger_status_base_url: String,
    /// Service key for the charger-status API.
    pub charger_status_service_key: String,
    /// Per-request timeout applied to every outbound HTTP call, in seconds.
    pub http_timeout_secs: u64,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .expect("PORT must be a valid u16"),
            directions_base_url: std::env::var("DIRECTIONS_BASE_URL")
                .unwrap_or_else(|_| "https://apis.openapi.sk.com/tmap".to_string()),
            directions_app_key: std::env::var("DIRECTIONS_APP_KEY")
                .expect("DIRECTIONS_APP_KEY must be set"),
            station_search_base_url: std::env::var("STATION_SEARCH_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:4000".to_string()),
            charger_status_base_url: std::env::var("CHARGER_STATUS_BASE_URL").unwrap_or_else(
                |_| "http://apis.data.go.kr/B552584/EvCharger".to_string(),
            ),
            charger_status_service_key: std::env::var("CHARGER_STATUS_SERVICE_KEY")
                .expect("CHARGER_STATUS_SERVICE_KEY must be set"),
            http_timeout_secs: std::env::var("HTTP_TIMEOUT_SECS")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .expect("HTTP_TIMEOUT_SECS must be a valid u64"),
        }
    }
}
