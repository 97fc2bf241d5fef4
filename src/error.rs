use std::path::PathBuf;
use std::time::Duration;

use async_openai::error::OpenAIError;
use thiserror::Error;

/// Boxed cause carried by the wrapping error variants.
pub(crate) type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Error)]
pub(crate) enum SampleError {
    #[error("sample rate must be greater than 0, got {0}")]
    InvalidArgument(f64),
    #[error("cannot open the video file {}: {source}", path.display())]
    StreamOpen {
        path: PathBuf,
        #[source]
        source: BoxError,
    },
    #[error("invalid video metadata: frame_rate={frame_rate}, frame_count={frame_count}")]
    InvalidMetadata { frame_rate: f64, frame_count: i64 },
    #[error("failed to sample frames from {}: {source}", path.display())]
    Processing {
        path: PathBuf,
        #[source]
        source: BoxError,
    },
}

#[derive(Debug, Error)]
pub(crate) enum DetectError {
    #[error("no frames were extracted from {}", path.display())]
    EmptyInput { path: PathBuf },
    #[error("object detection for {} failed: {source}", path.display())]
    RemoteCall {
        path: PathBuf,
        #[source]
        source: AiError,
    },
}

#[derive(Debug, Error)]
pub(crate) enum AiError {
    #[error("OpenAI error: {0}")]
    OpenAi(#[from] OpenAIError),
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("model refused the request: {0}")]
    Refusal(String),
    #[error("no content in response from OpenAI")]
    EmptyResponse,
}

#[derive(Debug, Error)]
pub(crate) enum AudioError {
    #[error("FFmpeg error: {0}")]
    Ffmpeg(#[from] ffmpeg_next::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("no audio track in {}", .0.display())]
    NoAudioTrack(PathBuf),
    #[error("filter graph error: {0}")]
    Filter(&'static str),
}

#[derive(Debug, Error)]
pub(crate) enum ConfigError {
    #[error("missing OpenAI API key, pass --api-key or set OPENAI_API_KEY")]
    MissingApiKey,
    #[error("missing video path, pass --video or set VIDEO_PATH")]
    MissingVideoPath,
    #[error("video file not found: {}", .0.display())]
    VideoNotFound(PathBuf),
    #[error("cannot read video file {}: {source}", path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("unsupported file type for {}: {}", path.display(), media_type.unwrap_or("unknown"))]
    UnsupportedType {
        path: PathBuf,
        media_type: Option<&'static str>,
    },
}

#[derive(Debug, Error)]
pub(crate) enum PipelineError {
    #[error("audio extraction failed: {0}")]
    AudioExtraction(#[from] AudioError),
    #[error("transcription failed: {0}")]
    Transcription(#[source] AiError),
    #[error("frame sampling failed: {0}")]
    Sampling(#[from] SampleError),
    #[error(transparent)]
    Detection(#[from] DetectError),
    #[error("mode and sentiment analysis failed: {0}")]
    Sentiment(#[source] AiError),
    #[error("Q&A generation failed: {0}")]
    QuestionAnswer(#[source] AiError),
    #[error("cannot merge {stage} output: {source}")]
    Merge {
        stage: &'static str,
        #[source]
        source: serde_json::Error,
    },
}
