use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::ConfigError;
use crate::pipeline::PipelineOptions;
use crate::Cli;

const MEDIA_TYPES: &[(&str, &str)] = &[
    ("3gp", "video/3gpp"),
    ("avi", "video/x-msvideo"),
    ("flv", "video/x-flv"),
    ("m4v", "video/x-m4v"),
    ("mkv", "video/x-matroska"),
    ("mov", "video/quicktime"),
    ("mp4", "video/mp4"),
    ("mpeg", "video/mpeg"),
    ("mpg", "video/mpeg"),
    ("ogv", "video/ogg"),
    ("ts", "video/mp2t"),
    ("webm", "video/webm"),
    ("wmv", "video/x-ms-wmv"),
    ("aac", "audio/aac"),
    ("flac", "audio/flac"),
    ("m4a", "audio/mp4"),
    ("mp3", "audio/mpeg"),
    ("ogg", "audio/ogg"),
    ("wav", "audio/x-wav"),
    ("gif", "image/gif"),
    ("jpeg", "image/jpeg"),
    ("jpg", "image/jpeg"),
    ("png", "image/png"),
    ("json", "application/json"),
    ("txt", "text/plain"),
];

/// Loads `.env` from the working directory or one of its parents into the
/// process environment. Variables that are already set keep their value.
pub(crate) fn load_env_file() -> Option<PathBuf> {
    env_file_loaded(dotenvy::dotenv())
}

fn env_file_loaded(result: Result<PathBuf, dotenvy::Error>) -> Option<PathBuf> {
    match result {
        Ok(path) => {
            debug!("loaded environment from {}", path.display());
            Some(path)
        }
        Err(err) if err.not_found() => None,
        Err(err) => {
            warn!("ignoring .env file: {err}");
            None
        }
    }
}

/// Guesses a media type from the file extension.
pub(crate) fn guess_media_type(path: &Path) -> Option<&'static str> {
    let extension = path.extension()?.to_str()?.to_ascii_lowercase();
    MEDIA_TYPES
        .iter()
        .find(|(ext, _)| *ext == extension)
        .map(|(_, media_type)| *media_type)
}

#[derive(Debug, Clone)]
pub(crate) struct Config {
    pub(crate) api_key: String,
    pub(crate) video_path: PathBuf,
    pub(crate) timeout: Duration,
    pub(crate) pipeline: PipelineOptions,
}

impl TryFrom<Cli> for Config {
    type Error = ConfigError;

    fn try_from(cli: Cli) -> Result<Self, Self::Error> {
        Ok(Self {
            api_key: validate_api_key(cli.api_key)?,
            video_path: validate_video_path(cli.video)?,
            timeout: Duration::from_secs(cli.timeout_secs),
            pipeline: PipelineOptions {
                sample_rate: cli.sample_rate,
                model: cli.model,
                transcription_model: cli.transcription_model,
                language: cli.language,
                extract_audio: !cli.upload_video,
            },
        })
    }
}

fn validate_api_key(api_key: Option<String>) -> Result<String, ConfigError> {
    api_key
        .filter(|key| !key.trim().is_empty())
        .ok_or(ConfigError::MissingApiKey)
}

fn validate_video_path(video: Option<PathBuf>) -> Result<PathBuf, ConfigError> {
    let path = video
        .filter(|path| !path.as_os_str().is_empty())
        .ok_or(ConfigError::MissingVideoPath)?;
    if !path.is_file() {
        return Err(ConfigError::VideoNotFound(path));
    }

    let media_type = guess_media_type(&path);
    if !media_type.is_some_and(|media_type| media_type.starts_with("video/")) {
        return Err(ConfigError::UnsupportedType { path, media_type });
    }

    if let Err(source) = File::open(&path) {
        return Err(ConfigError::Unreadable { path, source });
    }

    Ok(path)
}
