use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    extract::{Path, State, WebSocketUpgrade},
    response::IntoResponse,
    routing::get,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use reclaim_api::{AppState, AppStateInner};
use reclaim_db::Database;
use reclaim_gateway::connection;
use reclaim_gateway::dispatcher::Dispatcher;
use reclaim_match::mailer::{LogMailer, Mailer, SmtpConfig, SmtpMailer};
use reclaim_match::matcher::Matcher;
use reclaim_match::monitor::ChangeMonitor;
use reclaim_match::notifier::Notifier;
use reclaim_match::oracle::{GeminiConfig, GeminiOracle};

struct Config {
    host: String,
    port: u16,
    db_path: String,
    public_base_url: String,
    monitor_enabled: bool,
    monitor_interval_secs: u64,
    gemini: GeminiConfig,
    smtp: Option<SmtpConfig>,
}

impl Config {
    fn from_env() -> anyhow::Result<Self> {
        let gemini_defaults = GeminiConfig::default();
        let gemini = GeminiConfig {
            api_key: std::env::var("GEMINI_API_KEY").unwrap_or_default(),
            model: std::env::var("GEMINI_MODEL").unwrap_or(gemini_defaults.model),
            api_base: std::env::var("GEMINI_API_BASE").unwrap_or(gemini_defaults.api_base),
            timeout: std::env::var("RECLAIM_ORACLE_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(gemini_defaults.timeout),
        };

        // The mail leg is optional: without credentials the notifier still
        // runs its durable and live legs.
        let smtp = match (std::env::var("SMTP_EMAIL"), std::env::var("SMTP_PASSWORD")) {
            (Ok(username), Ok(password)) => Some(SmtpConfig {
                host: std::env::var("SMTP_HOST").unwrap_or_else(|_| "smtp.gmail.com".into()),
                from: std::env::var("SMTP_FROM").unwrap_or_else(|_| username.clone()),
                username,
                password,
            }),
            _ => None,
        };

        Ok(Self {
            host: std::env::var("RECLAIM_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port: std::env::var("RECLAIM_PORT")
                .unwrap_or_else(|_| "3000".into())
                .parse()?,
            db_path: std::env::var("RECLAIM_DB_PATH").unwrap_or_else(|_| "reclaim.db".into()),
            public_base_url: std::env::var("RECLAIM_PUBLIC_BASE_URL")
                .unwrap_or_else(|_| "https://reclaim.example.app".into()),
            monitor_enabled: std::env::var("RECLAIM_MONITOR_ENABLED")
                .map(|v| matches!(v.as_str(), "1" | "true" | "TRUE" | "True"))
                .unwrap_or(true),
            monitor_interval_secs: std::env::var("RECLAIM_MONITOR_INTERVAL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(30),
            gemini,
            smtp,
        })
    }
}

#[derive(Clone)]
struct WsState {
    dispatcher: Dispatcher,
    db: Arc<Database>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "reclaim=debug,tower_http=debug".into()),
        )
        .init();

    let config = Config::from_env()?;

    // Init database
    let db = Arc::new(Database::open(&PathBuf::from(&config.db_path))?);

    // Shared state
    let dispatcher = Dispatcher::new();

    let mailer: Arc<dyn Mailer> = match &config.smtp {
        Some(smtp) => Arc::new(SmtpMailer::new(smtp)?),
        None => {
            info!("SMTP credentials not set, mail leg disabled");
            Arc::new(LogMailer)
        }
    };

    if config.gemini.api_key.is_empty() {
        warn!("GEMINI_API_KEY not set; oracle judgments will fail soft and no matches will be made");
    }
    let oracle = Arc::new(GeminiOracle::new(config.gemini.clone())?);

    let notifier = Arc::new(Notifier::new(db.clone(), dispatcher.clone(), mailer));
    let matcher = Arc::new(Matcher::new(
        db.clone(),
        oracle,
        notifier,
        config.public_base_url.clone(),
    ));

    // The change monitor drives the pipeline; /matching/run remains as the
    // operator hatch.
    if config.monitor_enabled {
        let monitor = ChangeMonitor::new(db.clone(), matcher.clone());
        tokio::spawn(monitor.run(Duration::from_secs(config.monitor_interval_secs)));
    }

    let app_state: AppState = Arc::new(AppStateInner {
        db: db.clone(),
        dispatcher: dispatcher.clone(),
        matcher,
    });

    // Routes
    let ws_route = Router::new()
        .route("/ws/{user_id}", get(ws_upgrade))
        .with_state(WsState { dispatcher, db });

    let app = Router::new()
        .merge(reclaim_api::router(app_state))
        .merge(ws_route)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("Reclaim server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn ws_upgrade(
    State(state): State<WsState>,
    Path(user_id): Path<String>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| {
        connection::handle_connection(socket, state.dispatcher, state.db, user_id)
    })
}
