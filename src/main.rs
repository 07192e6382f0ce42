use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use vox_assistant::api::ApiServerBuilder;
use vox_assistant::config::{Overrides, VoiceConfig};
use vox_assistant::session::{
    AssistantFactory, Outbox, SessionController, VoiceAssistantFactory, run_console,
};
use vox_assistant::voice::{
    AudioCapture, SpeechCommand, SpeechPlayer, VoiceGate, input_device_names, rms,
};
use vox_assistant::{Config, config::DEFAULT_VOICE};

/// Vox - voice assistant with a browser control page
#[derive(Parser)]
#[command(name = "vox", version, about)]
struct Cli {
    /// Config file (defaults to the platform config directory)
    #[arg(short, long, env = "VOX_CONFIG")]
    config: Option<PathBuf>,

    /// Address to bind the HTTP server to
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on (overrides PORT)
    #[arg(long)]
    port: Option<u16>,

    /// Voice used when a session does not choose one
    #[arg(long)]
    voice: Option<String>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the control page and API (default)
    Serve,
    /// Talk to the assistant directly from this terminal
    Run,
    /// Test microphone input
    TestMic {
        /// Duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
    },
    /// Speak text through the synthesizer
    Say {
        /// Text to speak
        #[arg(default_value = "Hello! This is a test of the text to speech system.")]
        text: String,
        /// Synthesizer command template
        #[arg(long, env = "VOX_SPEECH_COMMAND")]
        command: Option<SpeechCommand>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "info,vox_assistant=info",
        1 => "info,vox_assistant=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

#[allow(clippy::future_not_send)]
async fn run(cli: Cli) -> anyhow::Result<()> {
    let overrides = Overrides {
        config_path: cli.config,
        host: cli.host,
        port: cli.port,
        voice: cli.voice,
    };

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(&overrides).await,
        Command::Run => console(&overrides).await,
        Command::TestMic { duration } => test_mic(duration).await,
        Command::Say { text, command } => say(overrides.voice.as_deref(), command, &text).await,
    }
}

/// Serve the control page until interrupted
async fn serve(overrides: &Overrides) -> anyhow::Result<()> {
    let config = Config::load(overrides)?;
    tracing::debug!(?config, "loaded configuration");

    let factory = VoiceAssistantFactory::from_config(&config)?;
    let sessions = Arc::new(SessionController::new(
        Arc::new(factory),
        Arc::new(Outbox::new()),
        config.voice.default_voice.clone(),
        config.server.stop_grace,
    ));

    tracing::info!(
        host = %config.server.host,
        port = config.server.port,
        "starting voice assistant server"
    );

    let server = ApiServerBuilder::new(Arc::clone(&sessions))
        .host(config.server.host.clone())
        .port(config.server.port)
        .static_dir(config.server.static_dir.clone())
        .build();

    server.run(shutdown_signal()).await?;

    sessions.stop().await;
    tracing::info!("server stopped");
    Ok(())
}

/// Standalone conversation in the terminal
async fn console(overrides: &Overrides) -> anyhow::Result<()> {
    let config = Config::load(overrides)?;
    tracing::debug!(?config, "loaded configuration");

    let factory = VoiceAssistantFactory::from_config(&config)?;
    let assistant = Arc::new(factory.create(&config.voice.default_voice)?);

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        on_signal.cancel();
    });

    tracing::info!("say \"goodbye\" or press Ctrl-C to quit");
    run_console(assistant, cancel).await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown requested");
}

/// Test microphone input
#[allow(clippy::future_not_send)]
async fn test_mic(duration: u64) -> anyhow::Result<()> {
    println!("Input devices:");
    for name in input_device_names()? {
        println!("  - {name}");
    }

    println!("\nTesting microphone for {duration} seconds...");
    println!("Speak into your microphone!\n");

    let mut capture = AudioCapture::new()?;
    capture.start()?;

    println!("Device: {}", capture.device_name());
    println!("Sample rate: {} Hz", capture.sample_rate());
    println!("---");

    for i in 0..duration {
        tokio::time::sleep(Duration::from_secs(1)).await;

        let samples = capture.take_buffer();
        let energy = rms(&samples);
        let peak = samples.iter().map(|s| s.abs()).fold(0.0f32, f32::max);

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let meter_len = (energy * 100.0).min(50.0) as usize;
        let meter: String = "#".repeat(meter_len) + &" ".repeat(50 - meter_len);

        println!(
            "[{:2}s] RMS: {:.4} | Peak: {:.4} | [{}]",
            i + 1,
            energy,
            peak,
            meter
        );
    }

    capture.stop();

    println!("\n---");
    println!("If you saw movement in the meter, your mic is working!");
    println!("If RMS stayed near 0, check your input device and its levels.");

    Ok(())
}

/// Speak `text` once and wait for it to finish
async fn say(voice: Option<&str>, command: Option<SpeechCommand>, text: &str) -> anyhow::Result<()> {
    let config = VoiceConfig {
        default_voice: voice.unwrap_or(DEFAULT_VOICE).to_string(),
        command: command.unwrap_or_else(SpeechCommand::platform_default),
        rate: 175,
        trailing_silence: Duration::ZERO,
    };

    if !config.command.is_available() {
        anyhow::bail!("speech synthesizer '{}' not found", config.command.program());
    }

    let player = SpeechPlayer::new(
        Arc::new(VoiceGate::new()),
        config.default_voice.clone(),
        &config,
    );
    if !player.speak(text, true) {
        anyhow::bail!("failed to start speech synthesizer");
    }
    player.wait_until_done().await;
    Ok(())
}
