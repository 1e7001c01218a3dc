use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Outcome of one tool invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ToolStatus {
    /// Fully completed; nothing further required.
    Success,
    /// Ran, but did not achieve its goal.
    Failure,
    /// Could not run, e.g. bad input.
    Error,
    /// Found one actionable item among possibly more.
    Continue,
    /// Unexpected internal failure.
    Exception,
}

impl ToolStatus {
    /// Rank used when several results collapse into one; higher is worse.
    pub fn severity(self) -> u8 {
        match self {
            ToolStatus::Success => 0,
            ToolStatus::Continue => 1,
            ToolStatus::Failure => 2,
            ToolStatus::Error => 3,
            ToolStatus::Exception => 4,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ToolStatus::Success => "Success",
            ToolStatus::Failure => "Failure",
            ToolStatus::Error => "Error",
            ToolStatus::Continue => "Continue",
            ToolStatus::Exception => "Exception",
        }
    }
}

impl fmt::Display for ToolStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ToolStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "success" => Ok(ToolStatus::Success),
            "failure" => Ok(ToolStatus::Failure),
            "error" => Ok(ToolStatus::Error),
            "continue" => Ok(ToolStatus::Continue),
            "exception" => Ok(ToolStatus::Exception),
            _ => Err(format!("Unknown tool status: {}", s)),
        }
    }
}

fn default_instructions() -> String {
    "Call the mcp tool.".to_string()
}

/// The operation a caller is expected to invoke next. A hint, not a transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NextAction {
    pub mcp_tool: String,
    #[serde(default = "default_instructions")]
    pub instructions: String,
}

impl NextAction {
    pub fn new(mcp_tool: impl Into<String>) -> Self {
        Self {
            mcp_tool: mcp_tool.into(),
            instructions: default_instructions(),
        }
    }

    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = instructions.into();
        self
    }
}

/// What a driving loop should do with a [`ToolResult`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    /// Call the named operation again; more items remain.
    Repeat(String),
    /// This step is finished; move on to the named operation.
    Proceed(String),
    /// Terminal success.
    Done,
    /// This step failed but the pipeline may go on to its next stage.
    StageFailed,
    /// Stop and surface to a human.
    Escalate,
}

/// Uniform envelope returned by every tool.
///
/// Serializes to a flat mapping: `status`, `message`, an inline `next_action`
/// when present, and every `data` entry at the top level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub status: ToolStatus,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_action: Option<NextAction>,
    #[serde(flatten)]
    pub data: Map<String, Value>,
}

impl ToolResult {
    pub fn new(status: ToolStatus, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            next_action: None,
            data: Map::new(),
        }
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self::new(ToolStatus::Success, message)
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self::new(ToolStatus::Failure, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(ToolStatus::Error, message)
    }

    /// A `Continue` result; `message` must describe the one item found.
    pub fn continuing(message: impl Into<String>) -> Self {
        Self::new(ToolStatus::Continue, message)
    }

    pub fn exception(message: impl Into<String>) -> Self {
        Self::new(ToolStatus::Exception, message)
    }

    pub fn with_next_action(mut self, next_action: NextAction) -> Self {
        self.next_action = Some(next_action);
        self
    }

    /// Attach a data entry. Reserved keys (`status`, `message`, `next_action`) are ignored.
    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        let key = key.into();
        if !matches!(key.as_str(), "status" | "message" | "next_action") {
            self.data.insert(key, value.into());
        }
        self
    }

    /// Plain mapping form with `next_action` expanded inline.
    pub fn to_value(&self) -> Value {
        let mut map = Map::new();
        map.insert(
            "status".to_string(),
            Value::String(self.status.as_str().to_string()),
        );
        map.insert("message".to_string(), Value::String(self.message.clone()));
        if let Some(next) = &self.next_action {
            let mut action = Map::new();
            action.insert("mcp_tool".to_string(), Value::String(next.mcp_tool.clone()));
            action.insert(
                "instructions".to_string(),
                Value::String(next.instructions.clone()),
            );
            map.insert("next_action".to_string(), Value::Object(action));
        }
        for (key, value) in &self.data {
            map.entry(key.clone()).or_insert_with(|| value.clone());
        }
        Value::Object(map)
    }

    pub fn is_success(&self) -> bool {
        self.status == ToolStatus::Success
    }

    /// Interpret the result for a driving loop.
    pub fn directive(&self) -> Directive {
        let next = self.next_action.as_ref().map(|n| n.mcp_tool.clone());
        match (self.status, next) {
            (ToolStatus::Continue, Some(tool)) => Directive::Repeat(tool),
            // Nothing named to repeat.
            (ToolStatus::Continue, None) => Directive::Escalate,
            (ToolStatus::Success, Some(tool)) => Directive::Proceed(tool),
            (ToolStatus::Success, None) => Directive::Done,
            (ToolStatus::Failure, _) => Directive::StageFailed,
            (ToolStatus::Error, _) | (ToolStatus::Exception, _) => Directive::Escalate,
        }
    }

    /// Collapse the results of a multi-step stage into one.
    ///
    /// The worst status wins. Each step is listed under `steps` in the data.
    pub fn stage(name: &str, results: Vec<(String, ToolResult)>) -> ToolResult {
        let status = results
            .iter()
            .map(|(_, result)| result.status)
            .max_by_key(|status| status.severity())
            .unwrap_or(ToolStatus::Success);

        let succeeded = results.iter().filter(|(_, r)| r.is_success()).count();
        let message = format!(
            "{}: {} of {} steps succeeded",
            name,
            succeeded,
            results.len()
        );

        let steps: Vec<Value> = results
            .iter()
            .map(|(step, result)| {
                let mut entry = Map::new();
                entry.insert("step".to_string(), Value::String(step.clone()));
                entry.insert(
                    "status".to_string(),
                    Value::String(result.status.as_str().to_string()),
                );
                entry.insert("message".to_string(), Value::String(result.message.clone()));
                Value::Object(entry)
            })
            .collect();

        // Hint from the first step carrying the stage status.
        let next_action = results
            .iter()
            .find(|(_, r)| r.status == status)
            .and_then(|(_, r)| r.next_action.clone());

        let mut result = ToolResult::new(status, message).with_data("steps", Value::Array(steps));
        result.next_action = next_action;
        result
    }
}

/// Status-specific suffixes appended to a tool's message.
#[derive(Debug, Clone, Default)]
pub struct StatusMessages {
    messages: HashMap<ToolStatus, String>,
}

impl StatusMessages {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(mut self, status: ToolStatus, message: impl Into<String>) -> Self {
        self.messages.insert(status, message.into());
        self
    }

    /// Append the suffix registered for `result.status`, if any, on a new line.
    pub fn apply(&self, mut result: ToolResult) -> ToolResult {
        if let Some(suffix) = self.messages.get(&result.status) {
            result.message.push('\n');
            result.message.push_str(suffix);
        }
        result
    }
}
