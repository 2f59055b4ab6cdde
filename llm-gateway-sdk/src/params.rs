//! # Parameter Converter
//!
//! Centralizes the sampling-parameter clamping rules every adapter applies
//! before forwarding a normalized [`ChatRequest`](crate::models::ChatRequest)
//! upstream (SPEC_FULL §4.6's "Parameter converter"). Each adapter still
//! picks its own bounds — Anthropic and Gemini clamp temperature and top_p
//! to a narrower range than the OpenAI-compatible default — but the
//! clamping and conversion logic itself lives here once.

use crate::models::ChatRequest;
use std::collections::HashMap;

/// Default OpenAI-compatible temperature range.
pub const DEFAULT_TEMPERATURE_RANGE: (f32, f32) = (0.0, 2.0);
/// Anthropic's and Gemini's narrower temperature range.
pub const UNIT_TEMPERATURE_RANGE: (f32, f32) = (0.0, 1.0);
/// `top_p` is `[0, 1]` across every dialect.
pub const TOP_P_RANGE: (f32, f32) = (0.0, 1.0);

/// Clamps an optional value into `range`, leaving `None` untouched.
pub fn clamp(value: Option<f32>, range: (f32, f32)) -> Option<f32> {
    value.map(|v| v.clamp(range.0, range.1))
}

/// Converts a normalized integer-keyed `logit_bias` map to the
/// float-valued shape the OpenAI-compatible wire format expects.
pub fn logit_bias_to_float(bias: &HashMap<String, i32>) -> HashMap<String, f32> {
    bias.iter().map(|(k, v)| (k.clone(), *v as f32)).collect()
}

/// Caps a stop-sequence list at `max`, dropping any beyond it. Used by
/// Anthropic, which rejects requests with more than 5 stop sequences.
pub fn cap_stop_sequences(sequences: Vec<String>, max: usize) -> Vec<String> {
    let mut sequences = sequences;
    sequences.truncate(max);
    sequences
}

/// Serializes a [`ChatRequest`] to the OpenAI-compatible wire shape,
/// converting `logit_bias` values from the normalized integer form to the
/// floats the wire format expects. Used in place of serializing `ChatRequest`
/// directly wherever an adapter forwards it to an OpenAI-wire-compatible
/// endpoint (OpenAI, Azure, Groq, Mistral, OpenRouter, and other custom
/// OpenAI-shaped backends).
pub fn openai_wire_body(request: &ChatRequest) -> Result<serde_json::Value, serde_json::Error> {
    let mut body = serde_json::to_value(request)?;
    if let Some(bias) = &request.logit_bias {
        body["logit_bias"] = serde_json::json!(logit_bias_to_float(bias));
    }
    Ok(body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamps_within_range() {
        assert_eq!(clamp(Some(3.5), UNIT_TEMPERATURE_RANGE), Some(1.0));
        assert_eq!(clamp(Some(-1.0), UNIT_TEMPERATURE_RANGE), Some(0.0));
        assert_eq!(clamp(Some(0.5), UNIT_TEMPERATURE_RANGE), Some(0.5));
        assert_eq!(clamp(None, UNIT_TEMPERATURE_RANGE), None);
    }

    #[test]
    fn converts_logit_bias_ints_to_floats() {
        let mut bias = HashMap::new();
        bias.insert("1234".to_string(), -100);
        let converted = logit_bias_to_float(&bias);
        assert_eq!(converted.get("1234"), Some(&-100.0));
    }

    #[test]
    fn caps_stop_sequences_at_limit() {
        let sequences = vec!["a", "b", "c", "d", "e", "f"]
            .into_iter()
            .map(String::from)
            .collect();
        let capped = cap_stop_sequences(sequences, 5);
        assert_eq!(capped.len(), 5);
    }
}
