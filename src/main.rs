use std::sync::Arc;

use assignment_helper::api::api_routes;
use assignment_helper::channels::email::EmailConfig;
use assignment_helper::channels::{spawn_email_poller, spawn_inbound_worker};
use assignment_helper::config::AppConfig;
use assignment_helper::pipeline::EmailProcessor;
use assignment_helper::store::{Database, LibSqlBackend};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider before any TLS usage
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = AppConfig::from_env();

    eprintln!("📚 Assignment Helper v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   API: http://{}/api/process-email", config.bind_addr);
    eprintln!("   Database: {}", config.db_path);

    // ── Database ─────────────────────────────────────────────────────
    let db_path_ref = std::path::Path::new(&config.db_path);
    let db: Arc<dyn Database> = Arc::new(
        LibSqlBackend::new_local(db_path_ref)
            .await
            .unwrap_or_else(|e| {
                eprintln!("Error: Failed to open database at {}: {}", config.db_path, e);
                std::process::exit(1);
            }),
    );

    let processor = Arc::new(EmailProcessor::new(Arc::clone(&db)));

    // ── Email channel (optional) ─────────────────────────────────────
    if let Some(email_config) = EmailConfig::from_env() {
        let senders = &email_config.allowed_senders;
        eprintln!(
            "   Email: enabled (IMAP: {}, SMTP: {}, allowed: {})",
            email_config.imap_host,
            email_config.smtp_host,
            if senders.iter().any(|s| s == "*") {
                "everyone".to_string()
            } else if senders.is_empty() {
                "none (deny all)".to_string()
            } else {
                senders.join(", ")
            }
        );

        let (_poller_handle, _poller_shutdown) =
            spawn_email_poller(email_config.clone(), Arc::clone(&db));
        let (_worker_handle, _worker_shutdown) =
            spawn_inbound_worker(email_config, Arc::clone(&db), Arc::clone(&processor), None);
    } else {
        eprintln!("   Email: disabled (EMAIL_IMAP_HOST not set) — HTTP only");
    }

    // ── HTTP API ─────────────────────────────────────────────────────
    let app = api_routes(Arc::clone(&db), processor);
    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, "HTTP server started");
    axum::serve(listener, app).await?;

    Ok(())
}
