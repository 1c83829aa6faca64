use market_brief_orchestrator::{
    agents::AgentSet, api::start_server, audio::AudioStore, audit::AuditLog, AppConfig,
    Orchestrator, PipelineSettings,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// How often expired audio is swept
const AUDIO_PURGE_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = AppConfig::from_env()?;

    info!("Market Brief Orchestrator - API Server");
    info!(
        port = config.port,
        confidence_threshold = config.confidence_threshold,
        voice_output_enabled = config.voice_output_enabled,
        "Configuration loaded"
    );

    // Create components
    let agents = AgentSet::from_config(&config).await?;
    let audio = Arc::new(AudioStore::new(config.audio_retention));
    let audit = Arc::new(AuditLog::new());

    let orchestrator = Arc::new(Orchestrator::new(
        agents,
        PipelineSettings::from(&config),
        audio.clone(),
        audit,
    ));

    // Expire uncollected audio in the background
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(AUDIO_PURGE_INTERVAL);
        loop {
            interval.tick().await;
            audio.purge_expired().await;
        }
    });

    info!("Orchestrator initialized, starting API server");

    start_server(orchestrator, config.port).await?;

    Ok(())
}
