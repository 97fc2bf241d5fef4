use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::ai::{InferenceBackend, StructuredPrompt};
use crate::detection::STRICT_JSON_INSTRUCTION;
use crate::error::AiError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct MoodSentiment {
    pub(crate) mode: String,
    pub(crate) sentiment: String,
    pub(crate) explanation: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct QaPair {
    #[serde(rename = "Q")]
    pub(crate) question: String,
    #[serde(rename = "A")]
    pub(crate) answer: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct QaPairs {
    #[serde(rename = "QA_pairs")]
    pub(crate) pairs: Vec<QaPair>,
}

fn sentiment_prompt(transcription: &str) -> StructuredPrompt {
    StructuredPrompt {
        system: STRICT_JSON_INSTRUCTION.to_owned(),
        user: format!(
            "Analyse the given video transcription and return:\n\
             What is the overall mode of the video?\n\
             What is the sentiment of the video?\n\
             Briefly explain the reasons for choosing these labels.\n\
             Transcription: {transcription}"
        ),
        images: Vec::new(),
        schema_name: "content_analysis",
        schema: sentiment_schema(),
    }
}

fn sentiment_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "mode": {
                "type": "string",
                "description": "The overall mode or style of the video."
            },
            "sentiment": {
                "type": "string",
                "description": "The overall emotional tone of the video."
            },
            "explanation": {
                "type": "string",
                "description": "Brief explanation for the mode and sentiment."
            }
        },
        "required": ["mode", "sentiment", "explanation"],
        "additionalProperties": false
    })
}

fn question_answer_prompt(transcription: &str) -> StructuredPrompt {
    StructuredPrompt {
        system: format!(
            "Each QA pair should be relevant to the video transcription content and provide a concise answer. {STRICT_JSON_INSTRUCTION}"
        ),
        user: format!(
            "Based on the given video transcription, generate a list of 5 to 10 useful Question-Answer (QA) pairs.\n\
             Transcription: {transcription}"
        ),
        images: Vec::new(),
        schema_name: "Question_Answer",
        schema: question_answer_schema(),
    }
}

fn question_answer_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "QA_pairs": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "Q": {"type": "string"},
                        "A": {"type": "string"}
                    },
                    "required": ["Q", "A"],
                    "additionalProperties": false
                }
            }
        },
        "required": ["QA_pairs"],
        "additionalProperties": false
    })
}

/// Classifies the overall mode and sentiment of a transcript. Returns the
/// reply text, expected to parse as [`MoodSentiment`].
pub(crate) async fn sentiment_analysis<B: InferenceBackend>(
    backend: &B,
    transcription: &str,
    model: &str,
) -> Result<String, AiError> {
    let request = sentiment_prompt(transcription).to_request(model)?;
    backend.complete(request).await
}

/// Generates question-answer pairs about a transcript. Returns the reply
/// text, expected to parse as [`QaPairs`].
pub(crate) async fn question_answer<B: InferenceBackend>(
    backend: &B,
    transcription: &str,
    model: &str,
) -> Result<String, AiError> {
    let request = question_answer_prompt(transcription).to_request(model)?;
    backend.complete(request).await
}
