use serde_json::{Map, Value, json};

/// Declared type and constraints of one parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamKind {
    Integer { min: Option<i64>, max: Option<i64> },
    Boolean,
    String { allowed: Option<Vec<&'static str>> },
}

impl ParamKind {
    pub fn type_name(&self) -> &'static str {
        match self {
            ParamKind::Integer { .. } => "integer",
            ParamKind::Boolean => "boolean",
            ParamKind::String { .. } => "string",
        }
    }

    /// Constraint text for prompts, e.g. `1-50` or `one of: ward, district`.
    pub fn constraint_hint(&self) -> Option<String> {
        match self {
            ParamKind::Integer { min: Some(lo), max: Some(hi) } => Some(format!("{lo}-{hi}")),
            ParamKind::Integer { min: Some(lo), max: None } => Some(format!(">= {lo}")),
            ParamKind::Integer { min: None, max: Some(hi) } => Some(format!("<= {hi}")),
            ParamKind::String { allowed: Some(vals) } => Some(format!("one of: {}", vals.join(", "))),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParamSpec {
    pub name: &'static str,
    pub description: Option<&'static str>,
    pub kind: ParamKind,
    pub required: bool,
    pub default: Option<Value>,
}

/// Parameter set of a tool. Renders to a JSON Schema object on demand.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ToolParameters {
    params: Vec<ParamSpec>,
    additional_properties: bool,
}

impl ToolParameters {
    pub fn iter(&self) -> impl Iterator<Item = &ParamSpec> {
        self.params.iter()
    }

    pub fn get(&self, name: &str) -> Option<&ParamSpec> {
        self.params.iter().find(|p| p.name == name)
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn required(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.params.iter().filter(|p| p.required).map(|p| p.name)
    }

    pub fn as_value(&self) -> Value {
        let mut properties = Map::new();
        for p in &self.params {
            let mut prop = Map::new();
            prop.insert("type".into(), json!(p.kind.type_name()));
            if let Some(d) = p.description {
                prop.insert("description".into(), json!(d));
            }
            match &p.kind {
                ParamKind::Integer { min, max } => {
                    if let Some(m) = min {
                        prop.insert("minimum".into(), json!(m));
                    }
                    if let Some(m) = max {
                        prop.insert("maximum".into(), json!(m));
                    }
                }
                ParamKind::String { allowed: Some(vals) } => {
                    prop.insert("enum".into(), json!(vals));
                }
                _ => {}
            }
            if let Some(d) = &p.default {
                prop.insert("default".into(), d.clone());
            }
            properties.insert(p.name.to_string(), Value::Object(prop));
        }
        json!({
            "type": "object",
            "properties": properties,
            "required": self.required().collect::<Vec<_>>(),
            "additionalProperties": self.additional_properties,
        })
    }
}

/// Builder for [`ToolParameters`]; `with_default` and `required` refer to
/// parameters already added.
#[derive(Debug, Default)]
pub struct ToolParametersBuilder {
    params: Vec<ParamSpec>,
    additional_properties: bool,
}

impl ToolParametersBuilder {
    pub fn new_object() -> Self {
        Self { params: Vec::new(), additional_properties: true }
    }

    fn push(mut self, name: &'static str, description: Option<&'static str>, kind: ParamKind) -> Self {
        self.params.push(ParamSpec { name, description, kind, required: false, default: None });
        self
    }

    pub fn add_integer(self, name: &'static str, description: Option<&'static str>, min: Option<i64>, max: Option<i64>) -> Self {
        self.push(name, description, ParamKind::Integer { min, max })
    }

    pub fn add_boolean(self, name: &'static str, description: Option<&'static str>) -> Self {
        self.push(name, description, ParamKind::Boolean)
    }

    pub fn add_string(self, name: &'static str, description: Option<&'static str>) -> Self {
        self.push(name, description, ParamKind::String { allowed: None })
    }

    pub fn add_string_enum(self, name: &'static str, description: Option<&'static str>, allowed: &[&'static str]) -> Self {
        self.push(name, description, ParamKind::String { allowed: Some(allowed.to_vec()) })
    }

    pub fn with_default(mut self, name: &str, value: Value) -> Self {
        if let Some(p) = self.params.iter_mut().find(|p| p.name == name) {
            p.default = Some(value);
        }
        self
    }

    pub fn required(mut self, name: &str) -> Self {
        if let Some(p) = self.params.iter_mut().find(|p| p.name == name) {
            p.required = true;
        }
        self
    }

    pub fn additional_properties(mut self, allowed: bool) -> Self {
        self.additional_properties = allowed;
        self
    }

    pub fn build(self) -> ToolParameters {
        ToolParameters { params: self.params, additional_properties: self.additional_properties }
    }
}
