mod ai;
mod analysis;
mod audio;
mod capture;
mod config;
mod detection;
mod error;
mod pipeline;
mod report;
#[cfg(test)]
mod testing;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};

use crate::ai::OpenAiBackend;
use crate::config::Config;
use crate::pipeline::Pipeline;

#[derive(Parser, Debug)]
#[command(name = "vidsight")]
#[command(about = "Transcribe, tag and summarise a video using OpenAI", long_about = None)]
pub(crate) struct Cli {
    /// OpenAI API key
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub(crate) api_key: Option<String>,
    /// Video file to analyse
    #[arg(long, env = "VIDEO_PATH", value_name = "FILE")]
    pub(crate) video: Option<PathBuf>,
    /// Frames sampled per second of video for object detection
    #[arg(long, env = "SAMPLE_RATE", default_value_t = 0.5)]
    pub(crate) sample_rate: f64,
    /// Model used for object detection, sentiment and Q&A
    #[arg(long, env = "OPENAI_MODEL", default_value = "gpt-4.1")]
    pub(crate) model: String,
    #[arg(long, default_value = "whisper-1")]
    pub(crate) transcription_model: String,
    /// Spoken language of the video, ISO-639-1
    #[arg(long, default_value = "en")]
    pub(crate) language: String,
    /// Timeout for each OpenAI request
    #[arg(long, default_value_t = 300)]
    pub(crate) timeout_secs: u64,
    /// Upload the whole video for transcription instead of its audio track
    #[arg(long)]
    pub(crate) upload_video: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt::init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("Fatal error: execution terminated unexpectedly: {err:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> anyhow::Result<()> {
    // before parsing, so the `env` fallbacks see variables from `.env`
    config::load_env_file();
    let config = Config::try_from(Cli::parse())?;
    info!("Parsing video {}", config.video_path.display());

    let backend = OpenAiBackend::new(&config.api_key, config.timeout);
    let pipeline = Pipeline::new(backend, config.pipeline);

    let report = pipeline.run(&config.video_path).await?;
    println!("{}", report.to_pretty_json()?);

    Ok(())
}
