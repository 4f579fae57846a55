//! Successful tool output: a readable summary plus the structured result.

use rmcp::model::{CallToolResult, Content};
use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub summary: String,
    pub data: Value,
}

impl ToolOutput {
    pub fn new<T: Serialize>(summary: impl Into<String>, data: &T) -> Self {
        Self {
            summary: summary.into(),
            data: serde_json::to_value(data).unwrap_or(Value::Null),
        }
    }

    /// Two text blocks: the summary, then the data as pretty JSON.
    pub fn into_call_result(self) -> CallToolResult {
        let json = serde_json::to_string_pretty(&self.data).unwrap_or_else(|_| self.data.to_string());
        CallToolResult::success(vec![Content::text(self.summary), Content::text(json)])
    }
}

/// Build a summary from `label: value` lines under a heading.
pub fn summary(heading: &str, lines: &[(&str, String)]) -> String {
    let mut out = heading.to_string();
    for (label, value) in lines {
        out.push('\n');
        out.push_str(label);
        out.push_str(": ");
        out.push_str(value);
    }
    out
}
