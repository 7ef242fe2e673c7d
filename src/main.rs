use anyhow::{Context, Result};
use clap::Parser;
use maestro_live::audio::AudioSink;
use maestro_live::{
    create_router, AppState, AudioBackendFactory, AudioOutput, Config, NatsTransport,
    SessionController, VirtualSink,
};
use std::sync::Arc;
use tracing::{info, warn};

/// Maestro voice coach: live duplex audio sessions with a remote model
#[derive(Parser)]
#[command(name = "maestro-live")]
#[command(about = "Serve the voice coaching session API", long_about = None)]
struct Args {
    /// Config file (extension optional)
    #[arg(short, long, default_value = "config/maestro-live")]
    config: String,

    /// Override the HTTP bind address
    #[arg(long)]
    bind: Option<String>,

    /// Override the HTTP port
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let cfg = Config::load(&args.config)?;

    info!("Maestro Live v{}", env!("CARGO_PKG_VERSION"));
    info!("Loaded config: {}", cfg.service.name);

    let transport = NatsTransport::connect(&cfg.nats.url, cfg.handshake_timeout())
        .await
        .context("Live transport unavailable")?;

    let microphone = AudioBackendFactory::new(cfg.audio_source()?, cfg.backend());

    let controller = SessionController::new(
        cfg.session(),
        Arc::new(transport),
        Arc::new(microphone),
        output_sink(cfg.audio_output()?)?,
    );

    let bind = args.bind.unwrap_or_else(|| cfg.service.http.bind.clone());
    let port = args.port.unwrap_or(cfg.service.http.port);
    let addr = format!("{}:{}", bind, port);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("HTTP API listening on {}", addr);

    let app = create_router(AppState::new(controller.clone()));
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for shutdown signal: {}", e);
            }
        })
        .await
        .context("HTTP server failed")?;

    info!("Shutting down");
    controller.stop().await?;

    Ok(())
}

fn output_sink(output: AudioOutput) -> Result<Arc<dyn AudioSink>> {
    match output {
        AudioOutput::Virtual => Ok(Arc::new(VirtualSink::new())),

        #[cfg(feature = "audio-device")]
        AudioOutput::Speaker => Ok(Arc::new(maestro_live::audio::SpeakerSink::open()?)),

        #[cfg(not(feature = "audio-device"))]
        AudioOutput::Speaker => {
            anyhow::bail!("Built without speaker support (enable the `audio-device` feature)")
        }
    }
}
