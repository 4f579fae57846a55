//! Typed view of `GET /history/{prompt_id}` responses.
//!
//! The endpoint returns `{}` while a prompt is queued or running and
//! `{ "<prompt_id>": { "status": .., "outputs": .. } }` once it has
//! finished. Fields ComfyUI may omit are defaulted so partial entries
//! still parse.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::Value;

/// History of one prompt.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HistoryEntry {
    #[serde(default)]
    pub status: Option<HistoryStatus>,
    #[serde(default)]
    pub outputs: BTreeMap<String, NodeOutput>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HistoryStatus {
    #[serde(default)]
    pub status_str: Option<String>,
    #[serde(default)]
    pub completed: bool,
    /// `[event_name, payload]` pairs recorded during execution.
    #[serde(default)]
    pub messages: Vec<Value>,
}

/// Outputs produced by one node.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NodeOutput {
    #[serde(default)]
    pub images: Vec<ImageRecord>,
}

/// An image written by a `SaveImage` node.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ImageRecord {
    pub filename: String,
    #[serde(default)]
    pub subfolder: String,
    #[serde(rename = "type", default)]
    pub kind: String,
}

/// Where a prompt stands according to its history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobState {
    Running,
    Succeeded,
    /// Execution failed; carries the backend's exception message if any.
    Failed(Option<String>),
}

impl HistoryEntry {
    pub fn state(&self) -> JobState {
        let Some(status) = &self.status else {
            return JobState::Running;
        };
        match status.status_str.as_deref() {
            Some("success") => JobState::Succeeded,
            Some("error") => JobState::Failed(status.execution_error()),
            _ if status.completed => JobState::Succeeded,
            _ => JobState::Running,
        }
    }

    /// First image of the first output node that produced any, in
    /// numeric node-id order.
    pub fn first_image(&self) -> Option<&ImageRecord> {
        let mut nodes: Vec<(&String, &NodeOutput)> = self.outputs.iter().collect();
        nodes.sort_by(|(a, _), (b, _)| node_order(a).cmp(&node_order(b)));
        nodes
            .into_iter()
            .find_map(|(_, output)| output.images.first())
    }
}

fn node_order(id: &str) -> (u64, &str) {
    (id.parse().unwrap_or(u64::MAX), id)
}

impl HistoryStatus {
    /// `exception_message` of the first `execution_error` message.
    pub fn execution_error(&self) -> Option<String> {
        self.messages.iter().find_map(|msg| {
            let pair = msg.as_array()?;
            if pair.first()?.as_str()? != "execution_error" {
                return None;
            }
            pair.get(1)?
                .get("exception_message")?
                .as_str()
                .map(|s| s.trim().to_string())
        })
    }
}

/// Pull the entry for `prompt_id` out of a history response body.
///
/// `Ok(None)` means the prompt has no history yet.
pub fn parse_history(prompt_id: &str, mut body: Value) -> Result<Option<HistoryEntry>, serde_json::Error> {
    match body.get_mut(prompt_id).map(Value::take) {
        Some(entry) => serde_json::from_value(entry).map(Some),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use serde_json::json;

    use super::*;

    fn entry(value: Value) -> HistoryEntry {
        parse_history("p1", json!({ "p1": value })).unwrap().unwrap()
    }

    #[test]
    fn empty_body_means_not_finished() {
        assert!(parse_history("p1", json!({})).unwrap().is_none());
    }

    #[test]
    fn success_picks_first_image_in_numeric_node_order() {
        let e = entry(json!({
            "status": { "status_str": "success", "completed": true, "messages": [] },
            "outputs": {
                "10": { "images": [{ "filename": "late.png", "subfolder": "", "type": "output" }] },
                "9": { "images": [{ "filename": "early.png", "subfolder": "", "type": "output" }] },
                "3": { "text": ["not an image"] }
            }
        }));
        assert_eq!(e.state(), JobState::Succeeded);
        assert_eq!(e.first_image().unwrap().filename, "early.png");
    }

    #[test]
    fn completed_without_status_str_is_success() {
        let e = entry(json!({ "status": { "completed": true }, "outputs": {} }));
        assert_eq!(e.state(), JobState::Succeeded);
        assert!(e.first_image().is_none());
    }

    #[test]
    fn error_surfaces_exception_message() {
        let e = entry(json!({
            "status": {
                "status_str": "error",
                "completed": false,
                "messages": [
                    ["execution_start", { "prompt_id": "p1" }],
                    ["execution_error", { "exception_message": "Model not found\n" }]
                ]
            },
            "outputs": {}
        }));
        assert_matches!(e.state(), JobState::Failed(Some(ref m)) if m == "Model not found");
    }

    #[test]
    fn error_without_details() {
        let e = entry(json!({ "status": { "status_str": "error", "messages": [] } }));
        assert_eq!(e.state(), JobState::Failed(None));
    }

    #[test]
    fn missing_status_is_running() {
        let e = entry(json!({ "outputs": {} }));
        assert_eq!(e.state(), JobState::Running);
    }
}
