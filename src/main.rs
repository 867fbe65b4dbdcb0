use std::sync::Arc;

use anyhow::Context;

use poquotator::api::{AppState, quote_routes};
use poquotator::channels::{MailHogSource, SmtpNotifier};
use poquotator::config::AppConfig;
use poquotator::erp::ErpClient;
use poquotator::metrics::MetricsAggregator;
use poquotator::pipeline::QuoteProcessor;
use poquotator::store::{EventStore, LibSqlEventStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider before any TLS usage
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    let config = AppConfig::from_env().context("Failed to load configuration")?;
    let _log_guard = poquotator::logging::init(config.log_dir.as_deref());

    let addr = config.server.socket_addr()?;

    eprintln!("📨 POQuotator v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   API: http://{}", addr);
    eprintln!("   ERP: {}", config.erp.base_url);
    eprintln!("   Mail: {}", config.mail.api_url);
    eprintln!(
        "   SMTP: {}:{} (triage → {})",
        config.smtp.host, config.smtp.port, config.smtp.triage_recipient
    );

    // ── Event store ─────────────────────────────────────────────────────
    let store = Arc::new(
        LibSqlEventStore::new_local(&config.store)
            .await
            .with_context(|| {
                format!("Failed to open database at {}", config.store.path.display())
            })?,
    );
    eprintln!(
        "   Database: {} (max {} connections)",
        config.store.path.display(),
        config.store.max_connections
    );

    // ── Collaborators ───────────────────────────────────────────────────
    let erp = Arc::new(ErpClient::new(config.erp.clone()).context("Failed to build ERP client")?);
    let mail = Arc::new(
        MailHogSource::new(config.mail.clone()).context("Failed to build mail source client")?,
    );
    let notifier = Arc::new(SmtpNotifier::new(config.smtp.clone()));
    let event_store: Arc<dyn EventStore> = store.clone();

    let processor = QuoteProcessor::new(
        mail,
        erp.clone(),
        erp,
        notifier,
        Arc::clone(&event_store),
        config.smtp.triage_recipient.clone(),
    )
    .with_max_concurrency(config.processing.max_concurrency);

    let app = quote_routes(AppState {
        processor: Arc::new(processor),
        metrics: Arc::new(MetricsAggregator::new(Arc::clone(&event_store))),
        store: event_store,
    });

    // ── Server ──────────────────────────────────────────────────────────
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    tracing::info!(%addr, "POQuotator API started");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for shutdown signal");
            }
            tracing::info!("Shutdown requested");
        })
        .await
        .context("API server failed")?;

    store.close().await;
    Ok(())
}
