// Charge Route API v0.1
use axum::routing::{get, post};
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

mod config;
mod errors;
mod helpers;
mod routes;
mod services;

use config::AppConfig;
use routes::plan::AppState;
use services::directions::DirectionsClient;
use services::planner::Planner;
use services::stations::StationSearchClient;
use services::status::ChargerStatusClient;

/// Charge Route API OpenAPI specification.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Charge Route API",
        version = "0.1.0",
        description = "EV charging-stop recommendation API for long-distance routes. \
            Samples the driving route into fixed-interval waypoints, estimates \
            reachable range from the battery profile and road/temperature \
            conditions, then ranks reachable charging stations by detour cost \
            with live availability and charging-time projections, chaining a \
            second stop when one cannot bridge the remaining distance.",
        license(name = "MIT"),
    ),
    tags(
        (name = "Health", description = "Service health check"),
        (name = "Plan", description = "Charging-stop planning"),
    ),
    paths(
        routes::health::health_check,
        routes::plan::create_plan,
    ),
    components(
        schemas(
            routes::health::HealthResponse,
            routes::plan::PlanResponse,
            routes::plan::RouteSummary,
            routes::plan::StopPlanResponse,
            routes::plan::StationResponse,
            services::planner::PlanRequest,
            services::energy::BatteryProfile,
            services::energy::VehicleEnergyProfile,
            services::stations::StationFilter,
            services::directions::LatLon,
            services::directions::RouteOption,
            services::status::Connector,
            services::status::ConnectorStatus,
            errors::ErrorResponse,
        )
    )
)]
struct ApiDoc;

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "charge_route_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env();
    let timeout = std::time::Duration::from_secs(config.http_timeout_secs);

    // External collaborators
    let directions =
        DirectionsClient::new(&config.directions_base_url, &config.directions_app_key, timeout);
    let stations = StationSearchClient::new(&config.station_search_base_url, timeout);
    let charger_status = ChargerStatusClient::new(
        &config.charger_status_base_url,
        &config.charger_status_service_key,
        timeout,
    );

    let planner = Arc::new(Planner::new(directions, stations, charger_status));
    let app_state = AppState { planner };

    // CORS: the plan endpoint is a POST from the map UI
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([axum::http::Method::GET, axum::http::Method::POST])
        .allow_headers(Any);

    // Build router
    let plan_routes = Router::new()
        .route("/api/v1/plan", post(routes::plan::create_plan))
        .with_state(app_state);

    let health_routes = Router::new().route("/api/v1/health", get(routes::health::health_check));

    let app = Router::new()
        .merge(health_routes)
        .merge(plan_routes)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(cors);

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("API server listening on {}", addr);
    tracing::info!(
        "Swagger UI available at http://localhost:{}/swagger-ui/",
        config.port
    );

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind TCP listener");
    axum::serve(listener, app)
        .await
        .expect("Server terminated unexpectedly");
}
