use std::path::Path;
use std::time::Duration;

use async_openai::config::OpenAIConfig;
use async_openai::error::OpenAIError;
use async_openai::types::{
    AudioResponseFormat, ChatCompletionRequestMessage,
    ChatCompletionRequestMessageContentPartImageArgs,
    ChatCompletionRequestMessageContentPartTextArgs, ChatCompletionRequestSystemMessageArgs,
    ChatCompletionRequestUserMessageArgs, ChatCompletionRequestUserMessageContent,
    ChatCompletionRequestUserMessageContentPart, CreateChatCompletionRequest,
    CreateChatCompletionRequestArgs, CreateTranscriptionRequest, CreateTranscriptionRequestArgs,
    ImageDetail, ImageUrlArgs, ResponseFormat, ResponseFormatJsonSchema,
};
use async_openai::Client;
use serde_json::Value;
use tracing::debug;

use crate::error::AiError;

/// Remote model calls used by the pipeline stages.
pub(crate) trait InferenceBackend {
    /// Runs a chat completion and returns the text content of the first choice.
    async fn complete(&self, request: CreateChatCompletionRequest) -> Result<String, AiError>;

    /// Runs a transcription and returns the transcript text.
    async fn transcribe(&self, request: CreateTranscriptionRequest) -> Result<String, AiError>;
}

pub(crate) struct OpenAiBackend {
    client: Client<OpenAIConfig>,
    timeout: Duration,
}

impl OpenAiBackend {
    pub(crate) fn new(api_key: &str, timeout: Duration) -> Self {
        Self {
            client: Client::with_config(OpenAIConfig::new().with_api_key(api_key)),
            timeout,
        }
    }
}

impl InferenceBackend for OpenAiBackend {
    async fn complete(&self, request: CreateChatCompletionRequest) -> Result<String, AiError> {
        let response = tokio::time::timeout(self.timeout, self.client.chat().create(request))
            .await
            .map_err(|_| AiError::Timeout(self.timeout))??;
        debug!(id = %response.id, usage = ?response.usage, "chat completion finished");

        let message = response
            .choices
            .into_iter()
            .next()
            .ok_or(AiError::EmptyResponse)?
            .message;
        match (message.content, message.refusal) {
            (Some(content), _) => Ok(content),
            (None, Some(refusal)) => Err(AiError::Refusal(refusal)),
            (None, None) => Err(AiError::EmptyResponse),
        }
    }

    async fn transcribe(&self, request: CreateTranscriptionRequest) -> Result<String, AiError> {
        let response = tokio::time::timeout(self.timeout, self.client.audio().transcribe(request))
            .await
            .map_err(|_| AiError::Timeout(self.timeout))??;
        Ok(response.text)
    }
}

#[derive(Debug, Clone)]
pub(crate) struct ImageAttachment {
    pub(crate) url: String,
    pub(crate) detail: ImageDetail,
}

/// A system instruction, a user message with optional images, and the JSON
/// schema the reply must follow.
#[derive(Debug, Clone)]
pub(crate) struct StructuredPrompt {
    pub(crate) system: String,
    pub(crate) user: String,
    pub(crate) images: Vec<ImageAttachment>,
    pub(crate) schema_name: &'static str,
    pub(crate) schema: Value,
}

impl StructuredPrompt {
    pub(crate) fn to_request(&self, model: &str) -> Result<CreateChatCompletionRequest, OpenAIError> {
        let system = ChatCompletionRequestSystemMessageArgs::default()
            .content(self.system.as_str())
            .build()?;

        let content = [
            vec![ChatCompletionRequestUserMessageContentPart::Text(
                ChatCompletionRequestMessageContentPartTextArgs::default()
                    .text(self.user.as_str())
                    .build()?,
            )],
            self.images
                .iter()
                .map(|image| -> Result<_, OpenAIError> {
                    Ok(ChatCompletionRequestUserMessageContentPart::ImageUrl(
                        ChatCompletionRequestMessageContentPartImageArgs::default()
                            .image_url(
                                ImageUrlArgs::default()
                                    .url(image.url.as_str())
                                    .detail(image.detail.clone())
                                    .build()?,
                            )
                            .build()?,
                    ))
                })
                .collect::<Result<_, _>>()?,
        ]
        .concat();

        CreateChatCompletionRequestArgs::default()
            .model(model)
            .messages([
                ChatCompletionRequestMessage::System(system),
                ChatCompletionRequestMessage::User(
                    ChatCompletionRequestUserMessageArgs::default()
                        .content(ChatCompletionRequestUserMessageContent::Array(content))
                        .build()?,
                ),
            ])
            .response_format(ResponseFormat::JsonSchema {
                json_schema: ResponseFormatJsonSchema {
                    description: None,
                    name: self.schema_name.to_owned(),
                    schema: Some(self.schema.clone()),
                    strict: Some(true),
                },
            })
            .build()
    }
}

/// Transcribes an audio or video file and returns the plain transcript.
pub(crate) async fn transcribe<B: InferenceBackend>(
    backend: &B,
    media_path: &Path,
    model: &str,
    language: &str,
) -> Result<String, AiError> {
    let request = CreateTranscriptionRequestArgs::default()
        .file(media_path)
        .model(model)
        .language(language)
        .response_format(AudioResponseFormat::Json)
        .build()?;
    backend.transcribe(request).await
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::testing::StubBackend;

    fn prompt(images: usize) -> StructuredPrompt {
        StructuredPrompt {
            system: "Return JSON.".to_owned(),
            user: "Describe.".to_owned(),
            images: (0..images)
                .map(|i| ImageAttachment {
                    url: format!("data:image/jpeg;base64,{i}"),
                    detail: ImageDetail::Auto,
                })
                .collect(),
            schema_name: "example",
            schema: json!({
                "type": "object",
                "properties": {"value": {"type": "string"}},
                "required": ["value"],
                "additionalProperties": false
            }),
        }
    }

    #[test]
    fn request_uses_system_then_user_message() {
        let request = serde_json::to_value(prompt(0).to_request("gpt-4.1").unwrap()).unwrap();
        assert_eq!(request["model"], "gpt-4.1");
        assert_eq!(request["messages"][0]["role"], "system");
        assert_eq!(request["messages"][0]["content"], "Return JSON.");
        assert_eq!(request["messages"][1]["role"], "user");
        assert_eq!(
            request["messages"][1]["content"],
            json!([{"type": "text", "text": "Describe."}])
        );
    }

    #[test]
    fn request_declares_strict_json_schema() {
        let request = serde_json::to_value(prompt(0).to_request("gpt-4.1").unwrap()).unwrap();
        let format = &request["response_format"];
        assert_eq!(format["type"], "json_schema");
        assert_eq!(format["json_schema"]["name"], "example");
        assert_eq!(format["json_schema"]["strict"], true);
        assert_eq!(format["json_schema"]["schema"]["required"], json!(["value"]));
    }

    #[test]
    fn images_follow_the_text_part() {
        let request = serde_json::to_value(prompt(2).to_request("gpt-4.1").unwrap()).unwrap();
        let content = request["messages"][1]["content"].as_array().unwrap();
        assert_eq!(content.len(), 3);
        assert_eq!(content[1]["type"], "image_url");
        assert_eq!(content[1]["image_url"]["url"], "data:image/jpeg;base64,0");
        assert_eq!(content[1]["image_url"]["detail"], "auto");
        assert_eq!(content[2]["image_url"]["url"], "data:image/jpeg;base64,1");
    }

    #[tokio::test]
    async fn transcribe_returns_backend_text() {
        let backend = StubBackend::with_transcript(Ok("hello there".to_owned()));
        let text = transcribe(&backend, Path::new("talk.m4a"), "whisper-1", "en")
            .await
            .unwrap();
        assert_eq!(text, "hello there");

        let requests = backend.transcriptions();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].model, "whisper-1");
        assert_eq!(requests[0].language.as_deref(), Some("en"));
    }
}
