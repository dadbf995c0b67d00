// Shared prompt fragments for providers that cannot constrain decoding to a schema.
// Task prompts live with the assessment pipeline in `assessment::prompts`.

use serde_json::Value;

/// Appended after the images when the provider only guarantees syntactically valid JSON.
pub const JSON_ONLY_INSTRUCTION: &str = "\
    You MUST respond with a single valid JSON object only. \
    Do NOT include any text outside the JSON object. \
    Do NOT use markdown code fences. \
    Do NOT include explanations or apologies.";

/// Precedes the JSON Schema rendering of the response contract.
pub const SCHEMA_PREAMBLE: &str = "\
    The JSON object MUST conform exactly to the following JSON Schema. \
    Every listed property is required. Severity values must be one of the enumerated values. \
    Use null for a numeric value that cannot be measured, never omit the key.";

/// Full instruction text for post-validated providers: JSON-only rules plus the schema.
pub fn schema_instruction(json_schema: &Value) -> String {
    let rendered = serde_json::to_string_pretty(json_schema).unwrap_or_else(|_| json_schema.to_string());
    format!("{JSON_ONLY_INSTRUCTION}\n\n{SCHEMA_PREAMBLE}\n\n{rendered}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_schema_instruction_embeds_schema() {
        let schema = json!({"type": "object", "required": ["spine"]});
        let text = schema_instruction(&schema);
        assert!(text.starts_with("You MUST respond"));
        assert!(text.contains("\"required\": [\n    \"spine\"\n  ]"));
    }
}
