use std::path::PathBuf;
use std::sync::Arc;

use actix_web::middleware::Logger;
use actix_web::{web, App, HttpServer};

use certgen::appwrite_client::AppwriteClient;
use certgen::backend::{DocumentStore, FileStore, MemoryBackend};
use certgen::certificate::CertificateRenderer;
use certgen::config::{AppConfig, BackendKind};
use certgen::db::CertGenDb;
use certgen::error::AppError;
use certgen::server::handlers;
use certgen::state::{AdminAccount, AdminStateManager};
use certgen::templates::{load_templates, watch_templates, TEMPLATE_DIR};

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt::init();
    tracing::info!("Starting certificate admin console");

    let config = AppConfig::from_env()?;

    let (documents, files): (Arc<dyn DocumentStore>, Arc<dyn FileStore>) = match config.backend {
        BackendKind::Appwrite => {
            let appwrite = config
                .appwrite
                .clone()
                .ok_or_else(|| AppError::Config("Appwrite settings missing".to_string()))?;
            tracing::info!("Using Appwrite backend at {}", appwrite.endpoint);
            let client = Arc::new(AppwriteClient::new(appwrite));
            let documents: Arc<dyn DocumentStore> = client.clone();
            let files: Arc<dyn FileStore> = client;
            (documents, files)
        }
        BackendKind::Memory => {
            tracing::warn!("Using in-memory backend; data is lost on restart");
            let backend = Arc::new(MemoryBackend::new());
            let documents: Arc<dyn DocumentStore> = backend.clone();
            let files: Arc<dyn FileStore> = backend;
            (documents, files)
        }
    };
    let db = CertGenDb::new(documents, files);

    // Font discovery is slow, do it once
    let renderer = Arc::new(CertificateRenderer::new(config.fonts_dir.as_deref()));

    // --- Load Templates ---
    let template_dir = PathBuf::from(TEMPLATE_DIR);
    let template_cache = load_templates(&template_dir)?;
    let template_cache_clone = template_cache.clone();

    // --- Spawn Template Watcher Task ---
    tokio::spawn(async move {
        if let Err(e) = watch_templates(template_cache_clone, template_dir).await {
            tracing::error!("Template watcher failed: {}", e);
        }
    });

    let state_manager = Arc::new(AdminStateManager::new(
        db,
        renderer,
        AdminAccount {
            email: config.admin_email.clone(),
            password_hash: config.admin_password_hash.clone(),
            session_hours: config.session_hours,
        },
    ));

    let state_data = web::Data::new(state_manager);
    let template_data = web::Data::new(template_cache);

    tracing::info!("Starting HTTP server on {}", config.bind);
    HttpServer::new(move || {
        App::new()
            .app_data(state_data.clone())
            .app_data(template_data.clone())
            .wrap(Logger::default())
            .configure(handlers::configure)
    })
    .bind(&config.bind)?
    .run()
    .await?;

    Ok(())
}
