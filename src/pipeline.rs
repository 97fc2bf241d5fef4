use std::path::Path;

use tracing::info;

use crate::ai::{self, InferenceBackend};
use crate::analysis;
use crate::audio;
use crate::capture;
use crate::detection;
use crate::error::PipelineError;
use crate::report::Report;

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct PipelineOptions {
    pub(crate) sample_rate: f64,
    pub(crate) model: String,
    pub(crate) transcription_model: String,
    pub(crate) language: String,
    /// Upload only the extracted audio track instead of the whole video.
    pub(crate) extract_audio: bool,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            sample_rate: 0.5,
            model: "gpt-4.1".to_owned(),
            transcription_model: "whisper-1".to_owned(),
            language: "en".to_owned(),
            extract_audio: true,
        }
    }
}

pub(crate) struct Pipeline<B> {
    backend: B,
    options: PipelineOptions,
}

impl<B: InferenceBackend> Pipeline<B> {
    pub(crate) fn new(backend: B, options: PipelineOptions) -> Self {
        Self { backend, options }
    }

    /// Runs every stage in order. The first failing stage ends the run.
    pub(crate) async fn run(&self, video_path: &Path) -> Result<Report, PipelineError> {
        info!("Step 1/4: Getting video transcription...");
        let transcription = self.transcribe(video_path).await?;

        info!("Step 2/4: Detecting objects in video...");
        let sampled = capture::sample_video(video_path, self.options.sample_rate)?;
        info!(
            "Sampled {} frames, one every {} frames ({} advisories)",
            sampled.frames.len(),
            sampled.interval,
            sampled.advisories.len()
        );
        let objects = detection::detect_objects(
            &self.backend,
            &sampled.frames,
            &self.options.model,
            video_path,
        )
        .await?;

        info!("Step 3/4: Analysing mode and sentiment...");
        let mode_and_sentiment =
            analysis::sentiment_analysis(&self.backend, &transcription, &self.options.model)
                .await
                .map_err(PipelineError::Sentiment)?;

        info!("Step 4/4: Generating Q&A pairs...");
        let qa_pairs = analysis::question_answer(&self.backend, &transcription, &self.options.model)
            .await
            .map_err(PipelineError::QuestionAnswer)?;

        Report::merge(transcription, &objects, &mode_and_sentiment, &qa_pairs)
    }

    async fn transcribe(&self, video_path: &Path) -> Result<String, PipelineError> {
        let options = &self.options;
        let transcription = if options.extract_audio {
            let audio_path = audio::extract_to_temp(video_path)?;
            ai::transcribe(
                &self.backend,
                &audio_path,
                &options.transcription_model,
                &options.language,
            )
            .await
        } else {
            ai::transcribe(
                &self.backend,
                video_path,
                &options.transcription_model,
                &options.language,
            )
            .await
        };
        transcription.map_err(PipelineError::Transcription)
    }
}
