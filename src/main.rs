use std::sync::Arc;

use exam_prep_backend::config::Config;
use exam_prep_backend::db::config::DbConfig;
use exam_prep_backend::db::{ContentSnapshot, MemoryStore, SqliteStore, TopicStore};
use exam_prep_backend::logging;
use exam_prep_backend::seed;
use exam_prep_backend::services::domain_classifier::DomainTaxonomies;
use exam_prep_backend::services::topic_aggregator::AggregationOptions;
use exam_prep_backend::state::AppState;

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    let config = Config::from_env();
    let _log_guard = logging::init_tracing(&config.log_level);

    let db_config = DbConfig::from_env();
    let snapshot = match config.seed_file.as_deref() {
        Some(path) => match seed::load_seed_file(path) {
            Ok(snapshot) => Some(snapshot),
            Err(err) => {
                tracing::warn!(error = %err, "seed content not loaded");
                None
            }
        },
        None => None,
    };

    let store = open_store(&db_config, snapshot).await;
    let state = AppState::new(store, Arc::new(DomainTaxonomies::builtin()))
        .with_aggregation(AggregationOptions {
            mapping_chunk_size: db_config.mapping_chunk_size,
        })
        .with_selection_seed(config.selection_seed);

    let app = exam_prep_backend::create_app(state);

    let addr = config.bind_addr();
    tracing::info!(%addr, "exam-prep-backend listening");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("bind listener failed");

    let server = axum::serve(listener, app).with_graceful_shutdown(shutdown_signal());

    if let Err(e) = server.await {
        tracing::error!(error = %e, "server error");
    }

    tracing::info!("Graceful shutdown complete");
}

async fn open_store(db_config: &DbConfig, snapshot: Option<ContentSnapshot>) -> Arc<dyn TopicStore> {
    if let Some(url) = db_config.database_url.as_deref() {
        match SqliteStore::connect(url, &db_config.sqlite).await {
            Ok(store) => {
                if let Some(snapshot) = snapshot.as_ref() {
                    if let Err(err) = store.import_snapshot(snapshot).await {
                        tracing::warn!(error = %err, "failed to import seed content");
                    }
                }
                return Arc::new(store);
            }
            Err(err) => {
                tracing::warn!(error = %err, "sqlite store not initialized, using in-memory store");
            }
        }
    }

    Arc::new(MemoryStore::from_snapshot(snapshot.unwrap_or_default()))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        sigterm.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
