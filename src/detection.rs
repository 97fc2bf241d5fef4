use std::path::Path;

use async_openai::types::ImageDetail;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::ai::{ImageAttachment, InferenceBackend, StructuredPrompt};
use crate::capture::EncodedFrame;
use crate::error::{AiError, DetectError};

pub(crate) const STRICT_JSON_INSTRUCTION: &str =
    "Return results that strictly match the given JSON format.";
const DETECTION_INSTRUCTION: &str =
    "List as many distinct objects as possible that appear in these images.";

/// The reply shape requested from the model.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct DetectionResult {
    pub(crate) objects: Vec<String>,
}

/// Object listing request for a sequence of sampled frames, one image
/// attachment per frame in sampling order.
#[derive(Debug, Clone)]
pub(crate) struct DetectionRequest {
    attachments: Vec<ImageAttachment>,
}

impl DetectionRequest {
    pub(crate) fn new(frames: &[EncodedFrame]) -> Self {
        Self {
            attachments: frames
                .iter()
                .map(|frame| ImageAttachment {
                    url: frame.data_url(),
                    detail: ImageDetail::Auto,
                })
                .collect(),
        }
    }

    pub(crate) fn attachments(&self) -> &[ImageAttachment] {
        &self.attachments
    }

    pub(crate) fn into_prompt(self) -> StructuredPrompt {
        StructuredPrompt {
            system: STRICT_JSON_INSTRUCTION.to_owned(),
            user: DETECTION_INSTRUCTION.to_owned(),
            images: self.attachments,
            schema_name: "object_detection",
            schema: schema(),
        }
    }
}

fn schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "objects": {
                "type": "array",
                "items": {"type": "string"}
            }
        },
        "required": ["objects"],
        "additionalProperties": false
    })
}

/// Asks `model` which distinct objects appear in `frames`.
///
/// Returns the reply text as sent by the service; it is expected to parse as
/// [`DetectionResult`] but is not checked here. `video_path` only labels
/// errors.
pub(crate) async fn detect_objects<B: InferenceBackend>(
    backend: &B,
    frames: &[EncodedFrame],
    model: &str,
    video_path: &Path,
) -> Result<String, DetectError> {
    if frames.is_empty() {
        return Err(DetectError::EmptyInput {
            path: video_path.to_path_buf(),
        });
    }

    let remote_call = |source: AiError| DetectError::RemoteCall {
        path: video_path.to_path_buf(),
        source,
    };

    let request = DetectionRequest::new(frames);
    info!(
        "Sending {} frames to {} for object detection",
        request.attachments().len(),
        model
    );
    debug!(
        "frame indices: {:?}",
        frames.iter().map(|frame| frame.index).collect::<Vec<_>>()
    );

    let request = request
        .into_prompt()
        .to_request(model)
        .map_err(|err| remote_call(err.into()))?;
    backend.complete(request).await.map_err(remote_call)
}
