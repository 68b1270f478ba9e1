//! audioscribe binary: wires the production clients together and runs the bot.

use audioscribe::clients::{FalWhisperTranscriber, TransferShUploader};
use audioscribe::formatting::OpenRouterBackend;
use audioscribe::pipeline::Collaborators;
use audioscribe::transport::{TelegramTransport, spawn_polling};
use audioscribe::{Config, TranscriptionBot, probe, run_with_shutdown};
use secrecy::ExposeSecret;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let config = Config::from_env()?;

    let transport = Arc::new(TelegramTransport::new(
        config.telegram.token.expose_secret(),
        config.telegram.poll_timeout,
        config.jobs.max_chunk_size,
    )?);
    let username = transport.prepare_polling().await?;
    tracing::info!(username = %username, "connected to telegram");

    let collaborators = Collaborators {
        transport: transport.clone(),
        uploader: Arc::new(TransferShUploader::new(&config.upload)?),
        transcriber: Arc::new(FalWhisperTranscriber::new(&config.transcription)?),
        primary: Arc::new(OpenRouterBackend::new(
            &config.formatting,
            config.formatting.primary_model.clone(),
        )?),
        secondary: Arc::new(OpenRouterBackend::new(
            &config.formatting,
            config.formatting.secondary_model.clone(),
        )?),
        probe: probe::default_probe(),
    };
    let bot = TranscriptionBot::new(&config, collaborators)?;

    let cancel = CancellationToken::new();
    let polling = spawn_polling(
        transport.bot().clone(),
        bot.clone(),
        config.telegram.poll_timeout,
        cancel.clone(),
    );

    run_with_shutdown(bot, cancel).await?;
    if let Err(e) = polling.await {
        tracing::error!(error = %e, "polling task ended abnormally");
    }
    Ok(())
}
