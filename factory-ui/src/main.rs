//! Factory UI server - web front end for driving the multi-persona workflow.

mod routes;
mod runs;
mod sse;
mod state;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use clap::Parser;
use factory::io::backend::{GeminiBackend, ModelBackend};
use factory::io::config::{DEFAULT_CONFIG_FILE, load_config};
use factory::io::credentials::ApiKey;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tracing::info;

use crate::state::{AppState, BackendFactory};

#[derive(Parser)]
#[command(name = "factory-ui")]
#[command(about = "Web UI for the multi-persona code factory")]
struct Args {
    /// Address to bind the server to
    #[arg(long, default_value = "127.0.0.1")]
    bind: String,

    /// Port to listen on
    #[arg(long, default_value = "3001")]
    port: u16,

    /// Path to the factory config file
    #[arg(long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Serve UI files from this directory instead of the embedded page
    #[arg(long)]
    ui_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("factory_ui=info".parse()?)
                .add_directive("factory=info".parse()?),
        )
        .init();

    let args = Args::parse();

    let config = load_config(&args.config)?;
    let api_key = ApiKey::from_env(&config.api_key_env);
    api_key.warn_if_missing(&config.api_key_env);
    info!(model = %config.model, "starting factory-ui");

    let key_configured = api_key.is_configured();
    let api_base = config.api_base.clone();
    let timeout = config.request_timeout();
    let backend_factory: BackendFactory = Arc::new(move || {
        let backend = GeminiBackend::new(&api_base, api_key.clone(), timeout)?;
        Ok(Box::new(backend) as Box<dyn ModelBackend + Send>)
    });
    let state = AppState::new(config, key_configured, backend_factory);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let mut app = Router::new()
        .nest("/api", routes::api_router())
        .route("/events", get(sse::events_handler));

    match args.ui_dir {
        Some(ui_dir) if ui_dir.exists() => {
            info!(ui_dir = %ui_dir.display(), "serving static UI files");
            app = app.fallback_service(ServeDir::new(ui_dir).append_index_html_on_directories(true));
        }
        Some(ui_dir) => {
            info!(ui_dir = %ui_dir.display(), "UI directory not found, using embedded page");
            app = app.route("/", get(routes::index));
        }
        None => app = app.route("/", get(routes::index)),
    }

    let app = app.layer(cors).with_state(state);

    let addr: SocketAddr = format!("{}:{}", args.bind, args.port).parse()?;
    info!(addr = %addr, "listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
