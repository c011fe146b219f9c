use lazy_static::lazy_static;
use serde_json::{Value, json};

use super::{ToolParameters, ToolParametersBuilder};

pub const ADVANCED_QUERY_TOOL: &str = "query_incidents_advanced";
pub const IUCR_TOOL: &str = "get_iucr_info";

/// Which accessor operation a tool routes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolKind {
    AdvancedQuery,
    ClassificationLookup,
}

/// Name, description and declared parameters of one tool.
#[derive(Debug, Clone)]
pub struct ToolSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub parameters: ToolParameters,
    pub kind: ToolKind,
}

impl ToolSpec {
    /// `{name, description, parameters}` with a JSON Schema for the parameters.
    pub fn schema(&self) -> Value {
        json!({
            "name": self.name,
            "description": self.description,
            "parameters": self.parameters.as_value(),
        })
    }
}

#[derive(Debug, Clone)]
pub struct ToolCatalog {
    tools: Vec<ToolSpec>,
}

impl ToolCatalog {
    pub fn get(&self, name: &str) -> Option<&ToolSpec> {
        self.tools.iter().find(|t| t.name == name)
    }

    pub fn names(&self) -> Vec<String> {
        self.tools.iter().map(|t| t.name.to_string()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ToolSpec> {
        self.tools.iter()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

fn build_advanced_query_tool() -> ToolSpec {
    let parameters = ToolParametersBuilder::new_object()
        .add_integer("start_year", Some("Start year for date range"), Some(2001), Some(2024))
        .add_integer("end_year", Some("End year for date range"), Some(2001), Some(2024))
        .add_integer("ward", Some("Ward number (1-50)"), Some(1), Some(50))
        .add_integer("district", Some("Police district (1-25)"), Some(1), Some(25))
        .add_integer("community_area", Some("Community area (1-77)"), Some(1), Some(77))
        .add_boolean("arrest_status", Some("true for arrests made, false for no arrests"))
        .add_boolean("domestic", Some("true for domestic cases, false otherwise"))
        .add_string("location_type", Some("Location type or keyword (e.g., 'STREET', 'APARTMENT')"))
        .add_string_enum(
            "group_by",
            Some("Focus results on a grouping. Use for 'which X had the most' queries."),
            &["ward", "district", "community_area", "location"],
        )
        .add_integer("top_n", Some("Number of items to show in breakdowns (default 10)"), Some(1), Some(50))
        .with_default("top_n", json!(10))
        .add_integer("limit", Some("Max sample records to include (default 100)"), Some(1), Some(1000))
        .with_default("limit", json!(100))
        .additional_properties(false)
        .build();

    ToolSpec {
        name: ADVANCED_QUERY_TOOL,
        description: "Query incident data with flexible filtering options for all data analysis needs (years, ranges, geography, arrests, domestic, location types).",
        parameters,
        kind: ToolKind::AdvancedQuery,
    }
}

fn build_iucr_tool() -> ToolSpec {
    let parameters = ToolParametersBuilder::new_object()
        .add_string("iucr_code", Some("Specific IUCR code to look up (optional)"))
        .additional_properties(false)
        .build();

    ToolSpec {
        name: IUCR_TOOL,
        description: "Get information about IUCR codes (overview or details for a specific code).",
        parameters,
        kind: ToolKind::ClassificationLookup,
    }
}

lazy_static! {
    /// The fixed tool set, built once on first use.
    pub static ref TOOL_CATALOG: ToolCatalog = ToolCatalog {
        tools: vec![build_advanced_query_tool(), build_iucr_tool()],
    };
}

pub fn catalog() -> &'static ToolCatalog {
    &TOOL_CATALOG
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_has_two_fixed_tools() {
        let c = catalog();
        assert_eq!(c.len(), 2);
        assert_eq!(c.names(), vec![ADVANCED_QUERY_TOOL.to_string(), IUCR_TOOL.to_string()]);
        assert_eq!(c.get(IUCR_TOOL).unwrap().kind, ToolKind::ClassificationLookup);
        assert!(c.get("nonexistent_tool").is_none());
    }

    #[test]
    fn no_parameter_is_required() {
        for tool in catalog().iter() {
            assert_eq!(tool.parameters.required().count(), 0, "{}", tool.name);
        }
    }

    #[test]
    fn advanced_schema_declares_defaults() {
        let s = catalog().get(ADVANCED_QUERY_TOOL).unwrap().schema();
        assert_eq!(s["parameters"]["properties"]["top_n"]["default"], 10);
        assert_eq!(s["parameters"]["properties"]["limit"]["maximum"], 1000);
        assert_eq!(s["parameters"]["properties"]["ward"]["type"], "integer");
    }
}
