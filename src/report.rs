use serde::Serialize;

use crate::analysis::{MoodSentiment, QaPair, QaPairs};
use crate::detection::DetectionResult;
use crate::error::PipelineError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub(crate) struct Report {
    #[serde(rename = "Transcription")]
    pub(crate) transcription: String,
    #[serde(rename = "Objects")]
    pub(crate) objects: Vec<String>,
    #[serde(rename = "Mode and sentiment")]
    pub(crate) mode_and_sentiment: MoodSentiment,
    #[serde(rename = "Q&A pairs")]
    pub(crate) qa_pairs: Vec<QaPair>,
}

impl Report {
    /// Combines the transcript with the raw JSON replies of the other stages.
    pub(crate) fn merge(
        transcription: String,
        objects: &str,
        mode_and_sentiment: &str,
        qa_pairs: &str,
    ) -> Result<Self, PipelineError> {
        let merge_error = |stage| move |source| PipelineError::Merge { stage, source };

        let objects: DetectionResult =
            serde_json::from_str(objects).map_err(merge_error("object detection"))?;
        let mode_and_sentiment: MoodSentiment =
            serde_json::from_str(mode_and_sentiment).map_err(merge_error("mode and sentiment"))?;
        let qa_pairs: QaPairs = serde_json::from_str(qa_pairs).map_err(merge_error("Q&A"))?;

        Ok(Self {
            transcription,
            objects: objects.objects,
            mode_and_sentiment,
            qa_pairs: qa_pairs.pairs,
        })
    }

    /// Four-space indented JSON with a blank line between top-level entries.
    pub(crate) fn to_pretty_json(&self) -> Result<String, serde_json::Error> {
        let mut buffer = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut serializer = serde_json::Serializer::with_formatter(&mut buffer, formatter);
        self.serialize(&mut serializer)?;

        // serde_json only ever writes valid UTF-8
        let json = String::from_utf8_lossy(&buffer);
        Ok(json.replace(",\n    \"", ",\n\n    \""))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report() -> Report {
        Report::merge(
            "transcript text".to_owned(),
            r#"{"objects":["cat","cup"]}"#,
            r#"{"mode":"info","sentiment":"neutral","explanation":"ok"}"#,
            r#"{"QA_pairs":[{"Q":"What?","A":"This."}]}"#,
        )
        .unwrap()
    }

    #[test]
    fn merge_extracts_stage_fields() {
        let report = report();
        assert_eq!(report.transcription, "transcript text");
        assert_eq!(report.objects, vec!["cat", "cup"]);
        assert_eq!(report.mode_and_sentiment.sentiment, "neutral");
        assert_eq!(report.qa_pairs[0].question, "What?");
    }

    #[test]
    fn merge_rejects_malformed_payload() {
        let result = Report::merge(
            "t".to_owned(),
            r#"{"objects":["cat"]}"#,
            "not json",
            r#"{"QA_pairs":[]}"#,
        );
        assert!(matches!(
            result,
            Err(PipelineError::Merge {
                stage: "mode and sentiment",
                ..
            })
        ));

        let result = Report::merge(
            "t".to_owned(),
            r#"{"labels":["cat"]}"#,
            r#"{"mode":"a","sentiment":"b","explanation":"c"}"#,
            r#"{"QA_pairs":[]}"#,
        );
        assert!(matches!(
            result,
            Err(PipelineError::Merge {
                stage: "object detection",
                ..
            })
        ));
    }

    #[test]
    fn pretty_json_keeps_key_order_and_spacing() {
        let json = report().to_pretty_json().unwrap();
        let keys = ["\"Transcription\"", "\"Objects\"", "\"Mode and sentiment\"", "\"Q&A pairs\""];
        let positions: Vec<usize> = keys.iter().map(|key| json.find(key).unwrap()).collect();
        assert!(positions.windows(2).all(|pair| pair[0] < pair[1]));

        assert!(json.contains(",\n\n    \"Objects\""));
        assert!(json.contains(",\n\n    \"Q&A pairs\""));
        assert!(json.contains("\n        \"cat\",\n        \"cup\""));

        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["Q&A pairs"][0]["A"], "This.");
    }

    #[test]
    fn pretty_json_keeps_non_ascii() {
        let mut report = report();
        report.transcription = "café ☕".to_owned();
        assert!(report.to_pretty_json().unwrap().contains("café ☕"));
    }
}
