//! Type definitions for the Bito chat API (`/ai/v2/chat/`).
//!
//! Bito takes a single prompt plus a list of prior question/answer pairs, and
//! always streams back newline-delimited JSON events whose text lives in
//! `choices[0].text`, terminated by a literal `[DONE]`.

use serde::{Deserialize, Serialize};

/// Literal that ends a Bito stream. Also used as the OpenAI SSE terminator.
pub const DONE_SENTINEL: &str = "[DONE]";

// ---------------------------------------------------------------------------
// Request types (what we send TO Bito)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BitoRequest {
    #[serde(rename = "aiModelType")]
    pub ai_model_type: String,
    #[serde(rename = "ideId")]
    pub ide_id: i64,
    pub prompt: String,
    #[serde(rename = "modelId")]
    pub model_id: u64,
    #[serde(rename = "ideName")]
    pub ide_name: String,
    pub context: Vec<ContextPair>,
    #[serde(rename = "Type")]
    pub request_type: i64,
    #[serde(rename = "Stream")]
    pub stream: bool,
    #[serde(rename = "topN")]
    pub top_n: i64,
    #[serde(rename = "topNThreshold")]
    pub top_n_threshold: f64,
    #[serde(rename = "folderPath")]
    pub folder_path: String,
    #[serde(rename = "customllmconfig")]
    pub custom_llm_config: CustomLlmConfig,
}

/// One resolved user question and the assistant answer that followed it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextPair {
    pub question: String,
    pub answer: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CustomLlmConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u64>,
    /// Always present on the wire: an unset value is sent as `null`.
    pub top_p: Option<f64>,
}

// ---------------------------------------------------------------------------
// Stream event types (what Bito sends BACK)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BitoEvent {
    #[serde(default)]
    pub choices: Option<Vec<BitoChoice>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BitoChoice {
    #[serde(default)]
    pub text: Option<String>,
}

impl BitoEvent {
    /// Text of the first choice, or an empty string when there is none.
    pub fn text(&self) -> &str {
        self.choices
            .as_deref()
            .and_then(<[BitoChoice]>::first)
            .and_then(|c| c.text.as_deref())
            .unwrap_or("")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_uses_bito_field_names() {
        let req = BitoRequest {
            ai_model_type: "ADVANCED".to_string(),
            ide_id: 0,
            prompt: "hi".to_string(),
            model_id: 42,
            ide_name: "CLI".to_string(),
            context: vec![],
            request_type: 1,
            stream: true,
            top_n: 0,
            top_n_threshold: 0.0,
            folder_path: String::new(),
            custom_llm_config: CustomLlmConfig {
                temperature: Some(0.7),
                max_tokens: None,
                top_p: None,
            },
        };
        let v = serde_json::to_value(&req).unwrap();

        assert_eq!(v["aiModelType"], "ADVANCED");
        assert_eq!(v["modelId"], 42);
        assert_eq!(v["Type"], 1);
        assert_eq!(v["Stream"], true);
        assert_eq!(
            v["customllmconfig"],
            serde_json::json!({"temperature": 0.7, "top_p": null})
        );
    }

    #[test]
    fn test_event_text_defaults_to_empty() {
        let ev: BitoEvent = serde_json::from_str(r#"{"choices":[{"text":"abc"}]}"#).unwrap();
        assert_eq!(ev.text(), "abc");

        let ev: BitoEvent = serde_json::from_str(r#"{"choices":[]}"#).unwrap();
        assert_eq!(ev.text(), "");

        let ev: BitoEvent = serde_json::from_str(r#"{"usage":{}}"#).unwrap();
        assert_eq!(ev.text(), "");

        let ev: BitoEvent = serde_json::from_str(r#"{"choices":null}"#).unwrap();
        assert_eq!(ev.text(), "");

        let ev: BitoEvent = serde_json::from_str(r#"{"choices":[{"text":null}]}"#).unwrap();
        assert_eq!(ev.text(), "");
    }
}
