//! One-shot command line query
//!
//! Usage: orchestrator [--voice-output] <question...>

use market_brief_orchestrator::{
    agents::AgentSet,
    audio::{AudioPoll, AudioStore},
    audit::AuditLog,
    AppConfig, Orchestrator, PipelineSettings, Request,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

const AUDIO_WAIT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let mut voice_output = false;
    let mut words = Vec::new();
    for arg in std::env::args().skip(1) {
        if arg == "--voice-output" {
            voice_output = true;
        } else {
            words.push(arg);
        }
    }

    let query = words.join(" ");
    if query.trim().is_empty() {
        eprintln!("usage: orchestrator [--voice-output] <question>");
        std::process::exit(2);
    }

    let config = AppConfig::from_env()?;
    let agents = AgentSet::from_config(&config).await?;
    let audio = Arc::new(AudioStore::new(config.audio_retention));

    let orchestrator = Orchestrator::new(
        agents,
        PipelineSettings::from(&config),
        audio.clone(),
        Arc::new(AuditLog::new()),
    );

    info!(query = %query, "Running query");

    let response = orchestrator
        .handle(Request::text(query).with_voice_output(voice_output))
        .await?;

    println!("\n=== MARKET BRIEF ===");
    println!("Route: {}", response.route_taken.kind);
    if let Some(instrument) = &response.route_taken.instrument {
        println!("Instrument: {}", instrument);
    }
    if response.degraded {
        println!("Degraded: yes");
    }
    println!("\n{}", response.text);

    if let Some(audio_ref) = response.audio_ref {
        let deadline = tokio::time::Instant::now() + AUDIO_WAIT;
        loop {
            match audio.poll(audio_ref).await {
                AudioPoll::Pending if tokio::time::Instant::now() < deadline => {
                    tokio::time::sleep(Duration::from_millis(200)).await;
                }
                AudioPoll::Ready(clip) => {
                    let path = format!("{}.audio", audio_ref);
                    std::fs::write(&path, &clip.bytes)?;
                    println!("\nAudio ({}) written to {}", clip.content_type, path);
                    break;
                }
                other => {
                    println!("\nAudio {}", other.label());
                    break;
                }
            }
        }
    }

    Ok(())
}
