use std::sync::Arc;

use questline::catalog::JourneyCatalog;
use questline::chat::{StreamOrchestrator, create_backend};
use questline::config::{BackendMode, ServiceConfig};
use questline::context::ContextSynchronizer;
use questline::llm::create_provider;
use questline::progress::ProgressionEngine;
use questline::server::{AppState, api_routes};
use questline::store::{Database, LibSqlBackend};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing. With QUESTLINE_LOG_DIR set, logs roll daily into
    // that directory; otherwise they go to stderr.
    let env_filter = || {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
    };
    let _log_guard = match std::env::var("QUESTLINE_LOG_DIR") {
        Ok(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "questline.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::fmt()
                .with_env_filter(env_filter())
                .with_target(false)
                .with_ansi(false)
                .with_writer(writer)
                .init();
            Some(guard)
        }
        Err(_) => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter())
                .with_target(false)
                .init();
            None
        }
    };

    let config = ServiceConfig::from_env().unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        eprintln!("  export QUESTLINE_API_KEY=sk-ant-...");
        std::process::exit(1);
    });

    let backend_label = match config.backend_mode {
        BackendMode::Threaded => "threaded",
        BackendMode::Stateless => "stateless",
    };

    eprintln!("🧭 Questline v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Model: {}", config.model);
    eprintln!("   Backend: {}", backend_label);
    eprintln!("   Chat API: http://0.0.0.0:{}/api/chat", config.port);
    eprintln!("   Journey API: http://0.0.0.0:{}/api/journey/init", config.port);

    // ── Journey catalog ──────────────────────────────────────────────────
    let catalog = Arc::new(JourneyCatalog::load(config.catalog_path.as_deref())?);
    eprintln!("   Catalog: {} steps", catalog.steps().count());

    // ── Database ─────────────────────────────────────────────────────────
    let db: Arc<dyn Database> = Arc::new(
        LibSqlBackend::new_local(&config.db_path)
            .await
            .unwrap_or_else(|e| {
                eprintln!(
                    "Error: Failed to open database at {}: {}",
                    config.db_path.display(),
                    e
                );
                std::process::exit(1);
            }),
    );
    eprintln!("   Database: {}", config.db_path.display());

    // ── Core services ────────────────────────────────────────────────────
    let llm = create_provider(&config);
    let backend = create_backend(&config, Arc::clone(&llm));
    let orchestrator = Arc::new(StreamOrchestrator::new(backend, config.turn_timeout));
    let synchronizer = Arc::new(ContextSynchronizer::new(Arc::clone(&db), Arc::clone(&llm)));
    let engine = Arc::new(ProgressionEngine::new(Arc::clone(&db), Arc::clone(&catalog)));

    let state = AppState {
        db,
        orchestrator,
        synchronizer,
        engine,
        catalog,
        fallback_identity: config.fallback_identity.clone(),
    };
    let app = api_routes(state);

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.port)).await?;
    tracing::info!("Questline listening on port {}", config.port);
    axum::serve(listener, app).await?;

    Ok(())
}
