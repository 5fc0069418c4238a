use actix_web::middleware::NormalizePath;
use actix_web::web::Data;
use actix_web::{App, HttpServer, Responder, get};
use std::sync::Arc;

use hrm_attendance::clock::SystemClock;
use hrm_attendance::config::{Config, StorageBackend};
use hrm_attendance::db::init_db;
use hrm_attendance::directory::Directory;
use hrm_attendance::directory::mysql::MySqlDirectory;
use hrm_attendance::directory::static_file::{DirectorySnapshot, StaticDirectory};
use hrm_attendance::docs::ApiDoc;
use hrm_attendance::engine::{Engine, Stores};
use hrm_attendance::notifier::webhook::WebhookNotifier;
use hrm_attendance::notifier::{LogNotifier, Notifier};
use hrm_attendance::routes;
use hrm_attendance::store::memory::MemoryStore;
use hrm_attendance::store::mysql::MySqlStore;
use hrm_attendance::utils::area_cache::{AreaCache, warmup_area_cache};
use tracing::{error, info, warn};
use tracing_appender::rolling;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[get("/")]
async fn index() -> impl Responder {
    "HRM attendance engine"
}

fn io_error(msg: impl Into<String>) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::Other, msg.into())
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // also loads .env
    let config = Config::from_env();

    // Rolling daily log
    let file_appender = rolling::daily("logs", "app.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    let level = config
        .log_level
        .parse::<tracing::Level>()
        .unwrap_or(tracing::Level::DEBUG);

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_max_level(level)
        .with_ansi(false)
        .with_target(false) // removes module path
        .with_level(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .pretty()
        .init();

    info!(backend = ?config.storage_backend, "Server starting...");

    if config.jwt_secret.is_empty() {
        warn!("JWT_SECRET is empty, every bearer token will be rejected");
    }

    let (stores, directory): (Stores, Arc<dyn Directory>) = match config.storage_backend {
        StorageBackend::MySql => {
            let url = config
                .database_url
                .as_deref()
                .ok_or_else(|| io_error("DATABASE_URL must be set for the mysql backend"))?;
            let pool = init_db(url).await.map_err(|e| {
                error!(error = %e, "Failed to connect to database");
                io_error(e.to_string())
            })?;

            let area_cache = AreaCache::new(config.area_cache_ttl);
            let pool_for_cache_warmup = pool.clone();
            let cache_for_warmup = area_cache.clone();

            actix_web::rt::spawn(async move {
                // Preload area assignments in batches of 250 employees
                if let Err(e) =
                    warmup_area_cache(&pool_for_cache_warmup, &cache_for_warmup, 250).await
                {
                    warn!(error = ?e, "Failed to warmup area cache");
                }
            });

            (
                Stores::shared(Arc::new(MySqlStore::new(pool.clone()))),
                Arc::new(MySqlDirectory::new(pool, area_cache)),
            )
        }
        StorageBackend::Memory => {
            let directory = match config.directory_file.as_deref() {
                Some(path) => StaticDirectory::from_file(path).map_err(|e| {
                    error!(path, error = ?e, "Failed to load directory snapshot");
                    io_error(e.to_string())
                })?,
                None => {
                    warn!("DIRECTORY_FILE not set, starting with an empty directory");
                    StaticDirectory::new(DirectorySnapshot::default())
                }
            };
            (
                Stores::shared(Arc::new(MemoryStore::new())),
                Arc::new(directory),
            )
        }
    };

    let notifier: Arc<dyn Notifier> = match config.notify_webhook_url.as_deref() {
        Some(url) => Arc::new(
            WebhookNotifier::new(url, config.notify_timeout).map_err(|e| io_error(e.to_string()))?,
        ),
        None => Arc::new(LogNotifier),
    };

    let engine = Data::new(Engine::new(
        stores,
        directory,
        notifier,
        Arc::new(SystemClock),
        config.policy.clone(),
        config.notify_timeout,
    ));

    let server_addr = config.server_addr.clone();
    let config_data = config.clone();

    HttpServer::new(move || {
        App::new()
            .wrap(actix_web::middleware::Logger::default())
            .wrap(NormalizePath::trim())
            .service(
                // wildcard {_:.*} so the UI's JS/CSS assets resolve
                SwaggerUi::new("/swagger-ui/{_:.*}")
                    .url("/api-doc/openapi.json", ApiDoc::openapi()),
            )
            .app_data(engine.clone())
            .app_data(Data::new(config.clone()))
            .service(index)
            .configure(|cfg| routes::configure(cfg, config_data.clone()))
    })
    .bind(server_addr)?
    .run()
    .await
}
