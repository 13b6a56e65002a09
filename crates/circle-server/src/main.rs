use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{State, WebSocketUpgrade},
    middleware,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use circle_api::auth::{self, AppState, AppStateInner};
use circle_api::help;
use circle_api::matches;
use circle_api::messages;
use circle_api::middleware::require_auth;
use circle_api::settings;
use circle_gateway::connection;
use circle_gateway::dispatcher::Dispatcher;
use circle_match::{Coordinator, CoordinatorConfig};

#[derive(Clone)]
struct ServerState {
    dispatcher: Dispatcher,
    jwt_secret: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "circle=debug,tower_http=debug".into()),
        )
        .init();

    // Config
    let jwt_secret =
        std::env::var("CIRCLE_JWT_SECRET").unwrap_or_else(|_| "dev-secret-change-me".into());
    let db_path = std::env::var("CIRCLE_DB_PATH").unwrap_or_else(|_| "circle.db".into());
    let host = std::env::var("CIRCLE_HOST").unwrap_or_else(|_| "0.0.0.0".into());
    let port: u16 = std::env::var("CIRCLE_PORT")
        .unwrap_or_else(|_| "3000".into())
        .parse()?;
    let match_ttl_days: i64 = std::env::var("CIRCLE_MATCH_TTL_DAYS")
        .unwrap_or_else(|_| "7".into())
        .parse()?;
    let help_timeout_mins: i64 = std::env::var("CIRCLE_HELP_REQUEST_TIMEOUT_MINS")
        .unwrap_or_else(|_| "30".into())
        .parse()?;
    let expiry_interval_secs: u64 = std::env::var("CIRCLE_EXPIRY_INTERVAL_SECS")
        .unwrap_or_else(|_| "300".into())
        .parse()?;

    // Init database + coordinator
    let db = Arc::new(circle_db::Database::open(&PathBuf::from(&db_path))?);
    let coordinator = Coordinator::new(
        db,
        CoordinatorConfig {
            match_ttl: chrono::Duration::days(match_ttl_days),
            help_request_timeout: chrono::Duration::minutes(help_timeout_mins),
            ..CoordinatorConfig::default()
        },
    );

    // Shared state
    let dispatcher = Dispatcher::new();
    let app_state: AppState = Arc::new(AppStateInner {
        coordinator: coordinator.clone(),
        dispatcher: dispatcher.clone(),
        jwt_secret: jwt_secret.clone(),
    });

    // Periodic expiry sweep for stale matches and overdue help requests
    spawn_expiry_task(
        coordinator.clone(),
        dispatcher.clone(),
        Duration::from_secs(expiry_interval_secs),
    );

    let state = ServerState {
        dispatcher: dispatcher.clone(),
        jwt_secret: jwt_secret.clone(),
    };

    // Routes
    let public_routes = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .with_state(app_state.clone());

    let protected_routes = Router::new()
        .route(
            "/blind-dating/settings",
            get(settings::get_settings).put(settings::update_settings),
        )
        .route("/blind-dating/enable", post(settings::enable))
        .route("/blind-dating/disable", post(settings::disable))
        .route("/blind-dating/matches", get(matches::list_matches))
        .route("/blind-dating/match/{match_id}", get(matches::get_match))
        .route(
            "/blind-dating/match/{match_id}/messages",
            get(messages::get_messages).post(messages::send_message),
        )
        .route("/blind-dating/find-match", post(matches::find_match))
        .route("/blind-dating/reveal/{match_id}", post(matches::request_reveal))
        .route("/blind-dating/end/{match_id}", post(matches::end_match))
        .route("/blind-dating/stats", get(matches::stats))
        .route("/match/request", post(help::create_request))
        .route("/match/status/{request_id}", get(help::request_status))
        .route("/match/cancel/{request_id}", post(help::cancel_request))
        .route("/match/complete/{request_id}", post(help::complete_request))
        .route("/match/requests", get(help::list_requests))
        .route("/match/receiver/active", get(help::active_request))
        .route("/match/giver/setup", post(help::giver_setup))
        .route("/match/giver/toggle", post(help::giver_toggle))
        .route("/match/giver/profile", get(help::giver_profile))
        .route("/match/giver/respond", post(help::respond))
        .layer(middleware::from_fn(require_auth))
        .with_state(app_state);

    let ws_route = Router::new()
        .route("/gateway", get(ws_upgrade))
        .with_state(state);

    let app = Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .merge(ws_route)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("Circle server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn ws_upgrade(
    State(state): State<ServerState>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| {
        connection::handle_connection(socket, state.dispatcher, state.jwt_secret)
    })
}

/// Drives the coordinator's batch expiry on an interval and fans the
/// resulting events out to connected clients.
fn spawn_expiry_task(coordinator: Coordinator, dispatcher: Dispatcher, interval: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let now = chrono::Utc::now();

            let c = coordinator.clone();
            let result = tokio::task::spawn_blocking(move || {
                let matches = c.expire_stale(now)?;
                let requests = c.expire_help_requests(now)?;
                Ok::<_, circle_match::MatchError>((matches, requests))
            })
            .await;

            match result {
                Ok(Ok((matches, requests))) => {
                    if !matches.expired.is_empty() {
                        info!("expired {} stale match(es)", matches.expired.len());
                    }
                    if !requests.expired.is_empty() {
                        info!("expired {} overdue help request(s)", requests.expired.len());
                    }
                    for (user_id, event) in
                        matches.notifications.into_iter().chain(requests.notifications)
                    {
                        dispatcher.send_to_user(user_id, event).await;
                    }
                }
                Ok(Err(e)) => error!("expiry sweep failed: {}", e),
                Err(e) => error!("expiry sweep panicked: {}", e),
            }
        }
    });
}
