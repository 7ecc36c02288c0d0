//! Tool catalog adapter - wraps tool definitions in the declaration
//! format a model backend expects.

use serde_json::{json, Value};

use super::ToolDefinition;

/// Wire format for tool declarations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatalogFormat {
    /// Gemini `tools: [{functionDeclarations: [...]}]`
    Gemini,
    /// OpenAI `tools: [{type: "function", function: {...}}]`
    OpenAi,
}

/// Provider-ready tool declarations, built once per session.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolDeclarations {
    format: CatalogFormat,
    names: Vec<String>,
    value: Option<Value>,
}

impl ToolDeclarations {
    pub fn format(&self) -> CatalogFormat {
        self.format
    }

    /// The `tools` field for the request body, `None` for an empty catalog.
    pub fn value(&self) -> Option<&Value> {
        self.value.as_ref()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Build the declaration structure for `format`.
///
/// Schemas are passed through verbatim.
pub fn build_declarations(format: CatalogFormat, tools: &[ToolDefinition]) -> ToolDeclarations {
    let names = tools.iter().map(|t| t.name.clone()).collect();

    let value = if tools.is_empty() {
        None
    } else {
        Some(match format {
            CatalogFormat::Gemini => {
                let function_declarations: Vec<Value> = tools
                    .iter()
                    .map(|t| {
                        json!({
                            "name": t.name,
                            "description": t.description,
                            "parametersJsonSchema": t.input_schema
                        })
                    })
                    .collect();

                json!([{ "functionDeclarations": function_declarations }])
            }
            CatalogFormat::OpenAi => Value::Array(
                tools
                    .iter()
                    .map(|t| {
                        json!({
                            "type": "function",
                            "function": {
                                "name": t.name,
                                "description": t.description,
                                "parameters": t.input_schema
                            }
                        })
                    })
                    .collect(),
            ),
        })
    };

    ToolDeclarations { format, names, value }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn weather_tools() -> Vec<ToolDefinition> {
        vec![
            ToolDefinition {
                name: "get_weather".to_string(),
                description: "Returns the weather of the city.".to_string(),
                input_schema: json!({
                    "type": "object",
                    "properties": {"city": {"title": "City", "type": "string"}},
                    "required": ["city"]
                }),
            },
            ToolDefinition {
                name: "get_ip".to_string(),
                description: "Returns the IP address of the device.".to_string(),
                input_schema: json!({"type": "object", "properties": {}}),
            },
        ]
    }

    #[test]
    fn test_gemini_declarations() {
        let tools = weather_tools();
        let decls = build_declarations(CatalogFormat::Gemini, &tools);
        let value = decls.value().unwrap();

        let fns = value[0]["functionDeclarations"].as_array().unwrap();
        assert_eq!(fns.len(), 2);
        assert_eq!(fns[0]["name"], "get_weather");
        assert_eq!(fns[0]["parametersJsonSchema"], tools[0].input_schema);
    }

    #[test]
    fn test_openai_declarations() {
        let tools = weather_tools();
        let decls = build_declarations(CatalogFormat::OpenAi, &tools);
        let value = decls.value().unwrap().as_array().unwrap();

        assert_eq!(value.len(), 2);
        assert_eq!(value[1]["type"], "function");
        assert_eq!(value[1]["function"]["name"], "get_ip");
        assert_eq!(value[0]["function"]["parameters"], tools[0].input_schema);
    }

    #[test]
    fn test_declarations_are_deterministic() {
        let tools = weather_tools();
        for format in [CatalogFormat::Gemini, CatalogFormat::OpenAi] {
            assert_eq!(build_declarations(format, &tools), build_declarations(format, &tools));
        }
    }

    #[test]
    fn test_empty_catalog() {
        let decls = build_declarations(CatalogFormat::OpenAi, &[]);
        assert!(decls.is_empty());
        assert!(decls.value().is_none());
    }
}
