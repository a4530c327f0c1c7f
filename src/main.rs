use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use wavelet_relay::{server, Config};

/// Wavelet - real-time voice relay for AI hardware companions
#[derive(Parser)]
#[command(name = "wavelet", version, about)]
struct Cli {
    /// Port to listen on (overrides config)
    #[arg(long, env = "WAVELET_PORT")]
    port: Option<u16>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Validate the resolved configuration and print a summary
    CheckConfig,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,wavelet_relay=info",
        1 => "info,wavelet_relay=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = Config::load()?;
    if let Some(port) = cli.port {
        config.server.port = port;
    }

    if let Some(Command::CheckConfig) = cli.command {
        return check_config(&config);
    }

    tracing::info!(
        port = config.server.port,
        sample_rate = config.audio.sample_rate,
        channels = config.audio.channels,
        "starting wavelet relay"
    );

    server::serve(config).await?;

    Ok(())
}

/// Print the resolved configuration with secrets elided
fn check_config(config: &Config) -> anyhow::Result<()> {
    println!("server.port            = {}", config.server.port);
    println!(
        "websocket.ping_interval = {:?}",
        config.websocket.ping_interval
    );
    println!("websocket.pong_wait     = {:?}", config.websocket.pong_wait);
    println!("websocket.write_wait    = {:?}", config.websocket.write_wait);
    println!(
        "websocket.max_message_queue = {}",
        config.websocket.max_message_queue
    );
    println!("audio.sample_rate      = {}", config.audio.sample_rate);
    println!("audio.channels         = {}", config.audio.channels);
    println!("audio.format           = {:?}", config.audio.format);
    println!("azure.service_url      = {}", config.azure.service_url);
    println!(
        "azure.openai_key       = {}",
        if config.azure.openai_key.is_empty() {
            "(unset)"
        } else {
            "(set)"
        }
    );
    println!(
        "ai.system_prompt       = {}",
        match &config.ai.system_prompt {
            Some(prompt) => format!("{} chars", prompt.len()),
            None => "(none)".to_string(),
        }
    );
    println!(
        "wake_word.model        = {}",
        config.wake_word.porcupine.keyword_model_path.display()
    );
    println!(
        "wake_word.sensitivity  = {}",
        config.wake_word.porcupine.sensitivity
    );
    println!(
        "wake_word.silence_threshold = {}",
        config.wake_word.silence_threshold
    );
    println!("wake_word.arm_timeout  = {:?}", config.wake_word.arm_timeout);
    println!("\nConfiguration OK");
    Ok(())
}
