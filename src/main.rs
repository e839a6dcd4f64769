use std::sync::Arc;

use chem_intake::api::{self, AppState};
use chem_intake::config::AppConfig;
use chem_intake::ingest::EmailIngestor;
use chem_intake::llm::create_provider;
use chem_intake::notify::AckMailer;
use chem_intake::pipeline::{BatchProcessor, EnquiryAssembler};
use chem_intake::store::{Database, LibSqlBackend};

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

    let config = AppConfig::from_env()?;

    eprintln!("Chem Intake v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Bind: http://{}", config.bind_addr);
    eprintln!("   Database: {}", config.db_path);

    // ── Database ─────────────────────────────────────────────────────
    let db: Arc<dyn Database> = Arc::new(
        LibSqlBackend::new_local(std::path::Path::new(&config.db_path))
            .await
            .unwrap_or_else(|e| {
                eprintln!("Error: Failed to open database at {}: {}", config.db_path, e);
                std::process::exit(1);
            }),
    );

    // ── Pipeline ─────────────────────────────────────────────────────
    let assembler = Arc::new(EnquiryAssembler::new(Arc::clone(&db)));
    let batch = Arc::new(BatchProcessor::new(
        Arc::clone(&db),
        Arc::clone(&assembler),
    ));

    let ingestor = match &config.llm {
        Some(llm_config) => {
            let provider = create_provider(llm_config)?;
            eprintln!("   Extraction: {}", provider.model_name());

            let mailer = config
                .mailer
                .clone()
                .map(|m| AckMailer::new(m, config.enquiry_base_url.clone()));
            if mailer.is_none() {
                eprintln!("   Acknowledgments: disabled (no SMTP configured)");
            }

            Some(Arc::new(EmailIngestor::new(
                Arc::clone(&db),
                Arc::clone(&assembler),
                provider,
                mailer,
            )))
        }
        None => {
            eprintln!("   Extraction: disabled (no API key configured)");
            None
        }
    };

    // ── HTTP server ──────────────────────────────────────────────────
    let state = AppState {
        db,
        assembler,
        batch,
        ingestor,
    };
    let app = api::router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, "Intake server started");
    axum::serve(listener, app).await?;

    Ok(())
}
