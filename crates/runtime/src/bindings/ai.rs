//! Model-runner binding operations.

use super::{req_str, OpResult};
use outpost_platform::Platform;
use serde_json::{json, Value as JsonValue};

pub(super) fn handle(platform: &dyn Platform, op: &str, payload: &JsonValue) -> OpResult {
    if op != "run" {
        return Err(format!("unknown ai operation: {op}"));
    }
    let model = req_str(payload, "model")?;
    let inputs = payload.get("inputs").cloned().unwrap_or(JsonValue::Null);
    let options = payload.get("options").cloned().unwrap_or(JsonValue::Null);

    // `inputs.text` routes to embeddings; everything else is treated as a
    // text-generation request.
    if let Some(text) = inputs.get("text") {
        let texts: Vec<String> = match text {
            JsonValue::String(single) => vec![single.clone()],
            JsonValue::Array(many) => many
                .iter()
                .filter_map(JsonValue::as_str)
                .map(str::to_owned)
                .collect(),
            _ => return Err(String::from("inputs.text must be a string or string array")),
        };
        let vectors = platform
            .generate_embeddings(model, &texts)
            .map_err(|error| error.to_string())?;
        let dim = vectors.first().map(Vec::len).unwrap_or(0);
        return Ok(json!({
            "shape": [vectors.len(), dim],
            "data": vectors,
        }));
    }

    let prompt = match inputs.get("prompt").and_then(JsonValue::as_str) {
        Some(prompt) => prompt.to_owned(),
        None => inputs
            .get("messages")
            .and_then(JsonValue::as_array)
            .map(|messages| {
                messages
                    .iter()
                    .filter_map(|message| message.get("content").and_then(JsonValue::as_str))
                    .collect::<Vec<_>>()
                    .join("\n")
            })
            .ok_or_else(|| String::from("inputs require text, prompt, or messages"))?,
    };
    let response = platform
        .generate_text(model, &prompt, &options)
        .map_err(|error| error.to_string())?;
    Ok(json!({ "response": response }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use outpost_platform::MemoryPlatform;

    #[test]
    fn text_inputs_route_to_embeddings() {
        let platform = MemoryPlatform::new();
        let result = handle(
            &platform,
            "run",
            &json!({ "model": "@emb/base", "inputs": { "text": ["a", "b"] } }),
        )
        .unwrap();
        assert_eq!(result["shape"][0], json!(2));
        assert_eq!(
            result["data"].as_array().unwrap().len(),
            2,
        );
    }

    #[test]
    fn messages_compose_a_prompt_for_generation() {
        let platform = MemoryPlatform::new();
        let result = handle(
            &platform,
            "run",
            &json!({
                "model": "@llm/chat",
                "inputs": { "messages": [
                    { "role": "system", "content": "be brief" },
                    { "role": "user", "content": "hello" },
                ] },
            }),
        )
        .unwrap();
        let response = result["response"].as_str().unwrap();
        assert!(response.contains("be brief\nhello"));
    }

    #[test]
    fn inputs_without_any_prompt_shape_are_rejected() {
        let platform = MemoryPlatform::new();
        assert!(handle(&platform, "run", &json!({ "model": "m", "inputs": {} })).is_err());
    }
}
