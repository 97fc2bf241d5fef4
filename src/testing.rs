use std::collections::VecDeque;
use std::sync::Mutex;

use async_openai::types::{CreateChatCompletionRequest, CreateTranscriptionRequest};
use serde_json::Value;

use crate::ai::InferenceBackend;
use crate::error::AiError;

/// Records every request and replays canned replies in order. Runs out as
/// `AiError::EmptyResponse`.
#[derive(Default)]
pub(crate) struct StubBackend {
    replies: Mutex<VecDeque<Result<String, AiError>>>,
    transcript: Mutex<Option<Result<String, AiError>>>,
    requests: Mutex<Vec<CreateChatCompletionRequest>>,
    transcriptions: Mutex<Vec<CreateTranscriptionRequest>>,
}

impl StubBackend {
    pub(crate) fn with_replies(replies: impl IntoIterator<Item = Result<String, AiError>>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().collect()),
            ..Self::default()
        }
    }

    pub(crate) fn with_transcript(transcript: Result<String, AiError>) -> Self {
        Self::default().transcript(transcript)
    }

    pub(crate) fn transcript(self, transcript: Result<String, AiError>) -> Self {
        *self.transcript.lock().unwrap() = Some(transcript);
        self
    }

    pub(crate) fn requests(&self) -> Vec<Value> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|request| serde_json::to_value(request).unwrap())
            .collect()
    }

    pub(crate) fn transcriptions(&self) -> Vec<CreateTranscriptionRequest> {
        self.transcriptions.lock().unwrap().clone()
    }
}

impl InferenceBackend for StubBackend {
    async fn complete(&self, request: CreateChatCompletionRequest) -> Result<String, AiError> {
        self.requests.lock().unwrap().push(request);
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Err(AiError::EmptyResponse))
    }

    async fn transcribe(&self, request: CreateTranscriptionRequest) -> Result<String, AiError> {
        self.transcriptions.lock().unwrap().push(request);
        self.transcript
            .lock()
            .unwrap()
            .take()
            .unwrap_or(Err(AiError::EmptyResponse))
    }
}
