//! System prompt variants for tool use.
//!
//! Every variant shares the same `TOOL_CALL:` format line; variants differ only
//! in framing, guidelines and worked examples.

use tracing::warn;

use crate::call::SENTINEL;
use crate::tools::{ToolCatalog, ToolSpec};

pub const DEFAULT_VARIANT: &str = "tool_use_v1";

#[derive(Debug, Clone, Copy)]
pub enum ExampleLead {
    Question(&'static str),
    Reasoning(&'static str),
}

/// One worked example. `arguments` is JSON object text.
#[derive(Debug, Clone, Copy)]
pub struct PromptExample {
    pub lead: ExampleLead,
    pub tool: &'static str,
    pub arguments: &'static str,
}

impl PromptExample {
    pub fn call_line(&self) -> String {
        format!(r#"{SENTINEL} {{"name": "{}", "arguments": {}}}"#, self.tool, self.arguments)
    }

    fn render(&self) -> String {
        let lead = match self.lead {
            ExampleLead::Question(q) => format!("- Question: \"{q}\""),
            ExampleLead::Reasoning(r) => format!("- Reasoning: \"{r}\""),
        };
        format!("{lead}\n  {}", self.call_line())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PromptVariant {
    pub name: &'static str,
    pub preamble: &'static str,
    pub guidelines_heading: &'static str,
    pub closing: &'static str,
    pub guidelines: &'static [&'static str],
    pub examples: &'static [PromptExample],
}

pub static PROMPT_VARIANTS: [PromptVariant; 2] = [
    PromptVariant {
        name: "tool_use_v1",
        preamble: "You are a data analyst assistant for Chicago homicide data.\n\
                   Use the provided tools to ground your answers in factual statistics.",
        guidelines_heading: "Guidelines for tool usage:",
        closing: "If a tool is not required, answer normally.",
        guidelines: &[
            "Prefer `query_incidents_advanced` for any question about counts, trends, rankings, or filtered views.",
            "Use `get_iucr_info` strictly for IUCR code explanations or taxonomy questions.",
            "Always include `start_year`/`end_year` when a user references a specific year or range.",
            "For 'which/what had the most' style questions set `group_by` to ward, district, community_area, or location as appropriate.",
            "Supply integers for numeric parameters and `true`/`false` for booleans.",
        ],
        examples: &[
            PromptExample {
                lead: ExampleLead::Question("How many homicides in 2023?"),
                tool: "query_incidents_advanced",
                arguments: r#"{"start_year": 2023, "end_year": 2023}"#,
            },
            PromptExample {
                lead: ExampleLead::Question("Which district had the most homicides from 2020-2022?"),
                tool: "query_incidents_advanced",
                arguments: r#"{"start_year": 2020, "end_year": 2022, "group_by": "district"}"#,
            },
            PromptExample {
                lead: ExampleLead::Question("What does IUCR mean?"),
                tool: "get_iucr_info",
                arguments: "{}",
            },
        ],
    },
    PromptVariant {
        name: "tool_use_reasoned",
        preamble: "You are an expert homicide data analyst.\n\
                   Before selecting a tool, briefly reflect on the user's goal and required parameters.\n\
                   Keep the reflection concise (one sentence) and then respond with the tool call if needed.",
        guidelines_heading: "Reasoning and tool usage rules:",
        closing: "If a tool is not required, answer normally with a concise explanation.",
        guidelines: &[
            "State the reasoning for the chosen tool before the tool call (e.g., 'Need year-filtered homicide counts so calling ...').",
            "Map user questions about counts or rankings to `query_incidents_advanced` with appropriate filters.",
            "Use `group_by` whenever the user asks for \"which\" entity had the most or for top-N rankings.",
            "Use `get_iucr_info` for definitional IUCR questions and avoid mixing it with quantitative analysis.",
            "Return to natural language answers after executing the tool by summarizing the results.",
        ],
        examples: &[
            PromptExample {
                lead: ExampleLead::Reasoning("Need filtered stats for 2021, use query_incidents_advanced."),
                tool: "query_incidents_advanced",
                arguments: r#"{"start_year": 2021, "end_year": 2021}"#,
            },
            PromptExample {
                lead: ExampleLead::Reasoning("User wants IUCR explanation, call get_iucr_info."),
                tool: "get_iucr_info",
                arguments: "{}",
            },
        ],
    },
];

/// Look up a variant by name, falling back to the default on a miss.
pub fn resolve_variant(name: &str) -> &'static PromptVariant {
    if let Some(v) = PROMPT_VARIANTS.iter().find(|v| v.name == name) {
        return v;
    }
    warn!(target: "prompt", requested = name, fallback = DEFAULT_VARIANT, "unknown_prompt_variant");
    &PROMPT_VARIANTS[0]
}

pub fn variant_names() -> Vec<&'static str> {
    PROMPT_VARIANTS.iter().map(|v| v.name).collect()
}

/// `- name: description` plus a `Parameters:` line listing each parameter hint.
pub fn summarize_tool(tool: &ToolSpec) -> String {
    if tool.parameters.is_empty() {
        return format!("- {}: {}", tool.name, tool.description);
    }
    let params = tool
        .parameters
        .iter()
        .map(|p| {
            let mut hint = p.description.unwrap_or("").to_string();
            if let Some(c) = p.kind.constraint_hint() {
                if hint.is_empty() {
                    hint = c;
                } else if !hint.contains(&c) {
                    hint = format!("{hint} [{c}]");
                }
            }
            if p.required {
                hint = if hint.is_empty() { "required".to_string() } else { format!("{hint} (required)") };
            }
            format!("{}: {}", p.name, hint).trim().to_string()
        })
        .collect::<Vec<_>>()
        .join("; ");
    format!("- {}: {}\n  Parameters: {}", tool.name, tool.description, params)
}

pub fn tool_summaries(catalog: &ToolCatalog) -> String {
    if catalog.is_empty() {
        return "- No tools available".to_string();
    }
    catalog.iter().map(summarize_tool).collect::<Vec<_>>().join("\n")
}

/// Render the system instruction for `variant` over `catalog`. Same inputs, same text.
pub fn build_tool_system_prompt(variant: &str, catalog: &ToolCatalog) -> String {
    let v = resolve_variant(variant);
    let guidelines = v.guidelines.iter().map(|g| format!("- {g}")).collect::<Vec<_>>().join("\n");
    let examples = v.examples.iter().map(PromptExample::render).collect::<Vec<_>>().join("\n");

    format!(
        "{preamble}\n\n\
         Available tools:\n{tools}\n\n\
         {heading}\n{guidelines}\n\n\
         When a tool is required respond ONLY with a JSON object prefixed by '{SENTINEL}' on the same line.\n\
         Format: {SENTINEL} {{\"name\": \"tool_name\", \"arguments\": {{...}}}}\n\n\
         Examples:\n{examples}\n\n\
         {closing}",
        preamble = v.preamble,
        tools = tool_summaries(catalog),
        heading = v.guidelines_heading,
        closing = v.closing,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::call::extract_tool_call;
    use crate::tools::catalog;

    #[test]
    fn prompt_is_deterministic_and_lists_every_tool() {
        let a = build_tool_system_prompt(DEFAULT_VARIANT, catalog());
        let b = build_tool_system_prompt(DEFAULT_VARIANT, catalog());
        assert_eq!(a, b);
        for name in catalog().names() {
            assert!(a.contains(&format!("- {name}: ")), "{name}");
        }
        assert!(a.contains("Parameters: start_year: Start year for date range [2001-2024]"));
        assert!(a.contains(r#"Format: TOOL_CALL: {"name": "tool_name", "arguments": {...}}"#));
    }

    #[test]
    fn unknown_variant_falls_back_to_default() {
        let fallback = build_tool_system_prompt("no_such_variant", catalog());
        assert_eq!(fallback, build_tool_system_prompt(DEFAULT_VARIANT, catalog()));
    }

    #[test]
    fn variants_share_the_format_contract() {
        let v1 = build_tool_system_prompt("tool_use_v1", catalog());
        let reasoned = build_tool_system_prompt("tool_use_reasoned", catalog());
        assert_ne!(v1, reasoned);
        assert!(reasoned.contains("- Reasoning: \"Need filtered stats for 2021"));
        let format_line = |p: &str| p.lines().find(|l| l.starts_with("Format:")).map(str::to_string);
        assert_eq!(format_line(&v1), format_line(&reasoned));
    }

    #[test]
    fn every_example_extracts_to_a_catalog_tool() {
        for v in PROMPT_VARIANTS.iter() {
            assert!(v.examples.len() >= 2, "{}", v.name);
            for ex in v.examples {
                let call = extract_tool_call(&ex.call_line()).expect("example parses");
                assert!(catalog().get(&call.name).is_some(), "{}", call.name);
            }
        }
    }
}
