//! Corrective prompts built from a failed attempt.
//!
//! [`RepairPromptBuilder`] wraps the previous prompt, the model's raw answer
//! and the validation error in tagged sections and asks the model to fix
//! its answer. The output is a pure function of the three inputs.

use crate::prompt::{render, JSON_ONLY_INSTRUCTION};

const REPAIR_TEMPLATE: &str = "This is a request to fix an error in the structure of an llm_response.
Here is the original request:
<original_prompt>
{original_prompt}
</original_prompt>

Here is the original llm_response:
<llm_response>
{llm_response}
</llm_response>

This response generated an error:
<error_message>
{error_message}
</error_message>

Compare the error message and the llm_response and identify what needs to be fixed or removed in the llm_response to resolve this error.

{format_rule}";

/// Builds the follow-up prompt sent after an invalid attempt.
///
/// # Example
///
/// ```
/// use llm_repair_loop::repair::RepairPromptBuilder;
///
/// let builder = RepairPromptBuilder::new();
/// let prompt = builder.build(
///     "Analyze the query",
///     r#"{"order_id": 5}"#,
///     "order_id: value 5 below minimum 10000",
/// );
/// assert!(prompt.contains("<llm_response>\n{\"order_id\": 5}\n</llm_response>"));
/// ```
#[derive(Debug, Clone)]
pub struct RepairPromptBuilder {
    format_rule: String,
}

impl RepairPromptBuilder {
    pub fn new() -> Self {
        Self {
            format_rule: JSON_ONLY_INSTRUCTION.to_string(),
        }
    }

    /// Replace the closing output-format instruction.
    pub fn with_format_rule(mut self, rule: impl Into<String>) -> Self {
        self.format_rule = rule.into();
        self
    }

    pub fn format_rule(&self) -> &str {
        &self.format_rule
    }

    /// Render the corrective prompt. All three inputs are embedded verbatim.
    pub fn build(&self, original_prompt: &str, bad_response: &str, error_description: &str) -> String {
        render(
            REPAIR_TEMPLATE,
            &[
                ("original_prompt", original_prompt),
                ("llm_response", bad_response),
                ("error_message", error_description),
                ("format_rule", &self.format_rule),
            ],
        )
    }
}

impl Default for RepairPromptBuilder {
    fn default() -> Self {
        Self::new()
    }
}
