//! Prompt templating and the initial analysis prompt.

use crate::error::Result;
use crate::schema::Schema;
use serde_json::Value;

/// Closing instruction shared by the initial and the corrective prompts.
pub const JSON_ONLY_INSTRUCTION: &str = "Respond ONLY with valid JSON. Do not include any explanations or other text or formatting before or after the JSON object.";

const ANALYSIS_TEMPLATE: &str = "Please analyze this user query\n {input}:\n\n\
Return your analysis as a JSON object matching this exact structure and data types:\n\
{structure}\n\n{instruction}";

/// Build a prompt string with variable substitution.
///
/// Replaces `{key}` placeholders in the template with the matching value
/// from `vars`. Placeholders without a value are left untouched.
/// Substituted values are inserted verbatim and never re-scanned, so they
/// may contain braces (JSON, code) freely.
///
/// Use `{{` to insert a literal `{` and `}}` to insert a literal `}`.
///
/// # Example
///
/// ```
/// use llm_repair_loop::prompt::render;
///
/// let result = render("Hello {name}, here is JSON: {{\"key\": \"val\"}}", &[("name", "Alice")]);
/// assert_eq!(result, r#"Hello Alice, here is JSON: {"key": "val"}"#);
/// ```
pub fn render(template: &str, vars: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(pos) = rest.find(['{', '}']) {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos..];

        if tail.starts_with("{{") {
            out.push('{');
            rest = &tail[2..];
        } else if tail.starts_with("}}") {
            out.push('}');
            rest = &tail[2..];
        } else if tail.starts_with('{') {
            let value = tail[1..].find('}').and_then(|end| {
                let key = &tail[1..1 + end];
                vars.iter()
                    .find(|(k, _)| *k == key)
                    .map(|(_, v)| (*v, end + 2))
            });
            match value {
                Some((v, consumed)) => {
                    out.push_str(v);
                    rest = &tail[consumed..];
                }
                None => {
                    out.push('{');
                    rest = &tail[1..];
                }
            }
        } else {
            out.push('}');
            rest = &tail[1..];
        }
    }

    out.push_str(rest);
    out
}

/// How the target structure is shown to the model.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StructureHint {
    /// An example object built from each field's example value.
    #[default]
    Example,
    /// The schema's JSON Schema document.
    JsonSchema,
}

/// Render the structure description for `schema`.
pub fn structure(schema: &Schema, hint: StructureHint) -> Result<String> {
    let value = match hint {
        StructureHint::Example => schema.example_value(),
        StructureHint::JsonSchema => schema.to_json_schema(),
    };
    Ok(serde_json::to_string_pretty(&value)?)
}

/// Build the first prompt of a loop: the caller's input, the exact target
/// structure, and the JSON-only instruction.
///
/// # Example
///
/// ```
/// use llm_repair_loop::prompt::{analysis_prompt, StructureHint};
/// use llm_repair_loop::schema::customer;
/// use serde_json::json;
///
/// let input = json!({"name": "Joe User", "query": "I forgot my password."});
/// let prompt = analysis_prompt(&input, &customer::customer_query(), StructureHint::Example).unwrap();
/// assert!(prompt.contains("\"is_complaint\""));
/// assert!(prompt.ends_with("after the JSON object."));
/// ```
pub fn analysis_prompt(input: &Value, schema: &Schema, hint: StructureHint) -> Result<String> {
    let input = serde_json::to_string(input)?;
    let structure = structure(schema, hint)?;
    Ok(render(
        ANALYSIS_TEMPLATE,
        &[
            ("input", &input),
            ("structure", &structure),
            ("instruction", JSON_ONLY_INSTRUCTION),
        ],
    ))
}
