//! Error kinds surfaced at component boundaries.
//!
//! Internal code propagates `color_eyre::Result`; these variants are what a
//! failure turns into once it reaches the user-facing edge of a component.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QaError {
    /// No dataset has been loaded yet.
    #[error("Incident data not loaded")]
    DataUnavailable,

    /// The dispatcher was asked for a tool the catalog does not contain.
    #[error("Unknown tool: {name}. Available tools: {}", available.join(", "))]
    UnknownTool { name: String, available: Vec<String> },

    /// No parseable call could be recovered from model text.
    #[error("Could not parse tool call from response: {raw}")]
    MalformedToolCall { raw: String },

    /// The accessor failed, or an argument had an unusable type.
    #[error("Error executing {tool}: {message}")]
    ToolExecution { tool: String, message: String },

    /// The completion backend failed.
    #[error("Error generating response: {0}")]
    ModelGateway(String),
}

impl QaError {
    pub fn tool_execution(tool: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::ToolExecution { tool: tool.into(), message: message.to_string() }
    }

    /// Short stage name used in logs and traces.
    pub fn stage(&self) -> &'static str {
        match self {
            QaError::DataUnavailable => "data",
            QaError::UnknownTool { .. } => "dispatch",
            QaError::MalformedToolCall { .. } => "extraction",
            QaError::ToolExecution { .. } => "execution",
            QaError::ModelGateway(_) => "model",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_tool_lists_available() {
        let e = QaError::UnknownTool {
            name: "nope".into(),
            available: vec!["a".into(), "b".into()],
        };
        assert_eq!(e.to_string(), "Unknown tool: nope. Available tools: a, b");
        assert_eq!(e.stage(), "dispatch");
    }
}
