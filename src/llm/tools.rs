use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use validator::Validate;

use super::semantic_search::{SemanticSearch, DEFAULT_MIN_SIMILARITY, DEFAULT_TOP_N};

pub const SEARCH_FROM_SECTION_NAMES: &str = "search_from_section_names";
pub const SEARCH_FROM_TEXT: &str = "search_from_text";

#[derive(Error, Debug)]
pub enum ToolError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),
    #[error("Invalid arguments for {tool}: {reason}")]
    InvalidArguments { tool: String, reason: String },
}

impl ToolError {
    fn invalid(tool: &str, reason: impl ToString) -> Self {
        ToolError::InvalidArguments {
            tool: tool.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// `query` of `search_from_section_names`: a list, or a bare section name.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SectionQuery {
    One(Option<String>),
    Many(Vec<Option<String>>),
}

#[derive(Debug, Deserialize)]
struct SectionNamesArgs {
    #[serde(default)]
    query: Option<SectionQuery>,
}

#[derive(Debug, Deserialize, Validate)]
struct TextSearchArgs {
    #[validate(length(min = 1))]
    query: String,
    #[serde(default = "default_top_n", deserialize_with = "number_as_usize")]
    #[validate(range(min = 1, max = 100))]
    top_n: usize,
    #[serde(default = "default_min_similarity")]
    s: f32,
}

fn default_top_n() -> usize {
    DEFAULT_TOP_N
}

fn default_min_similarity() -> f32 {
    DEFAULT_MIN_SIMILARITY
}

// models send integers as floats (`3.0`)
fn number_as_usize<'de, D: serde::Deserializer<'de>>(deserializer: D) -> Result<usize, D::Error> {
    let value = f64::deserialize(deserializer)?;
    if value < 0.0 || value.fract() != 0.0 {
        return Err(serde::de::Error::custom(format!("expected a whole number, got {}", value)));
    }
    Ok(value as usize)
}

/// A validated request from the model to run one retrieval tool.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolCall {
    SearchFromSectionNames { query: Vec<Option<String>> },
    SearchFromText { query: String, top_n: usize, s: f32 },
}

impl ToolCall {
    pub fn parse(name: &str, args: &Value) -> Result<Self, ToolError> {
        let args = if args.is_null() { json!({}) } else { args.clone() };
        match name {
            SEARCH_FROM_SECTION_NAMES => {
                let parsed: SectionNamesArgs =
                    serde_json::from_value(args).map_err(|e| ToolError::invalid(name, e))?;
                let query = match parsed.query {
                    None => Vec::new(),
                    Some(SectionQuery::One(name)) => vec![name],
                    Some(SectionQuery::Many(names)) => names,
                };
                if query.len() > 3 {
                    return Err(ToolError::invalid(
                        name,
                        format!("expected at most 3 section names, got {}", query.len()),
                    ));
                }
                Ok(ToolCall::SearchFromSectionNames { query })
            }
            SEARCH_FROM_TEXT => {
                let parsed: TextSearchArgs =
                    serde_json::from_value(args).map_err(|e| ToolError::invalid(name, e))?;
                parsed.validate().map_err(|e| ToolError::invalid(name, e))?;
                Ok(ToolCall::SearchFromText {
                    query: parsed.query,
                    top_n: parsed.top_n,
                    s: parsed.s,
                })
            }
            other => Err(ToolError::UnknownTool(other.to_string())),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ToolCall::SearchFromSectionNames { .. } => SEARCH_FROM_SECTION_NAMES,
            ToolCall::SearchFromText { .. } => SEARCH_FROM_TEXT,
        }
    }

    pub fn arguments(&self) -> Value {
        match self {
            ToolCall::SearchFromSectionNames { query } => json!({ "query": query }),
            ToolCall::SearchFromText { query, top_n, s } => json!({ "query": query, "top_n": top_n, "s": s }),
        }
    }

    /// Runs the call and returns its rows as a JSON array string.
    pub async fn execute(&self, search: &SemanticSearch) -> Result<String> {
        let rows = match self {
            ToolCall::SearchFromSectionNames { query } => search.search_from_section_names(query),
            ToolCall::SearchFromText { query, top_n, s } => search.search_from_text(query, *top_n, *s).await?,
        };
        Ok(serde_json::to_string(&rows)?)
    }

    /// Readable code block of the call, e.g. for a transcript.
    pub fn render(&self) -> String {
        render_call(self.name(), &self.arguments())
    }
}

/// Renders `name(\n  key=value\n)` in a fenced block; strings are quoted,
/// other values are shown as JSON.
pub fn render_call(name: &str, args: &Value) -> String {
    let mut block = format!("```python\n{}(\n", name);
    if let Some(map) = args.as_object() {
        for (key, value) in map {
            match value {
                Value::String(s) => block.push_str(&format!("  {}=\"{}\"\n", key, s)),
                other => block.push_str(&format!("  {}={}\n", key, other)),
            }
        }
    }
    block.push_str(")\n```");
    block
}

/// Result of a tool call as handed back to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionResponse {
    pub name: String,
    pub response: FunctionResult,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionResult {
    pub result: String,
}

impl FunctionResponse {
    pub fn new(name: &str, result: String) -> Self {
        Self {
            name: name.to_string(),
            response: FunctionResult { result },
        }
    }
}

/// Parses, runs and wraps one tool call.
pub async fn call_tool(search: &SemanticSearch, name: &str, args: &Value) -> Result<FunctionResponse> {
    let call = ToolCall::parse(name, args)?;
    run_call(search, &call).await
}

/// Runs an already parsed call and wraps its rows.
pub async fn run_call(search: &SemanticSearch, call: &ToolCall) -> Result<FunctionResponse> {
    let result = call.execute(search).await?;
    Ok(FunctionResponse::new(call.name(), result))
}

/// Gemini function declarations for both retrieval tools.
pub fn function_declarations() -> Value {
    json!([
        {
            "name": SEARCH_FROM_SECTION_NAMES,
            "description": "Retrieves LaTeX chunks from the paper using the [section, subsection, subsubsection] names.",
            "parameters": {
                "type": "object",
                "properties": {
                    "query": {
                        "type": "array",
                        "items": {"type": "string"},
                        "description": "A list of up to three strings in the format [section, subsection, subsubsection]."
                    }
                },
                "required": ["query"]
            }
        },
        {
            "name": SEARCH_FROM_TEXT,
            "description": "Retrieves LaTeX chunks from the paper using embedding similarity of text.",
            "parameters": {
                "type": "object",
                "properties": {
                    "query": {"type": "string", "description": "The user's query string."},
                    "top_n": {
                        "type": "integer",
                        "description": "The number of chunks to retrieve. The default value is 5. Start at 3 and increase it if needed."
                    },
                    "s": {"type": "number", "description": "Minimum similarity of returned chunks. Defaults to 0."}
                },
                "required": ["query"]
            }
        }
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::semantic_search::tests::sample_search;
    use crate::llm::semantic_search::SearchResult;

    #[test]
    fn section_query_accepts_lists_strings_and_nulls() {
        let call = ToolCall::parse(SEARCH_FROM_SECTION_NAMES, &json!({"query": ["Methods", null]})).unwrap();
        assert_eq!(
            call,
            ToolCall::SearchFromSectionNames {
                query: vec![Some("Methods".into()), None]
            }
        );

        let bare = ToolCall::parse(SEARCH_FROM_SECTION_NAMES, &json!({"query": "Intro"})).unwrap();
        assert_eq!(
            bare,
            ToolCall::SearchFromSectionNames {
                query: vec![Some("Intro".into())]
            }
        );

        let too_long = ToolCall::parse(SEARCH_FROM_SECTION_NAMES, &json!({"query": ["a", "b", "c", "d"]}));
        assert!(matches!(too_long, Err(ToolError::InvalidArguments { .. })));
    }

    #[test]
    fn text_query_defaults_and_validation() {
        let call = ToolCall::parse(SEARCH_FROM_TEXT, &json!({"query": "loss", "top_n": 3.0})).unwrap();
        assert_eq!(
            call,
            ToolCall::SearchFromText {
                query: "loss".into(),
                top_n: 3,
                s: 0.0
            }
        );

        assert!(ToolCall::parse(SEARCH_FROM_TEXT, &json!({"query": ""})).is_err());
        assert!(ToolCall::parse(SEARCH_FROM_TEXT, &json!({"query": "x", "top_n": 0})).is_err());
        assert!(ToolCall::parse(SEARCH_FROM_TEXT, &json!({"query": "x", "top_n": 2.5})).is_err());
        assert!(matches!(
            ToolCall::parse("delete_everything", &json!({})),
            Err(ToolError::UnknownTool(_))
        ));
    }

    #[test]
    fn render_matches_code_block_layout() {
        let rendered = render_call("search_from_text", &json!({"query": "loss", "top_n": 3}));
        assert_eq!(rendered, "```python\nsearch_from_text(\n  query=\"loss\"\n  top_n=3\n)\n```");
    }

    #[test]
    fn parsed_calls_render_with_defaults_filled_in() {
        let call = ToolCall::parse(SEARCH_FROM_TEXT, &json!({"query": "loss"})).unwrap();
        assert_eq!(
            call.render(),
            "```python\nsearch_from_text(\n  query=\"loss\"\n  s=0.0\n  top_n=5\n)\n```"
        );

        let sections = ToolCall::parse(SEARCH_FROM_SECTION_NAMES, &json!({"query": ["Intro", null]})).unwrap();
        assert_eq!(
            sections.render(),
            "```python\nsearch_from_section_names(\n  query=[\"Intro\",null]\n)\n```"
        );
    }

    #[tokio::test]
    async fn call_tool_wraps_rows_as_result() {
        let search = sample_search();
        let response = call_tool(&search, SEARCH_FROM_SECTION_NAMES, &json!({"query": ["Methods"]}))
            .await
            .unwrap();
        assert_eq!(response.name, SEARCH_FROM_SECTION_NAMES);

        let rows: Vec<SearchResult> = serde_json::from_str(&response.response.result).unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.similarity.is_none()));

        let ranked = call_tool(&search, SEARCH_FROM_TEXT, &json!({"query": "q", "top_n": 1}))
            .await
            .unwrap();
        let rows: Vec<SearchResult> = serde_json::from_str(&ranked.response.result).unwrap();
        assert_eq!(rows[0].section, "Intro");
        assert_eq!(
            serde_json::to_value(&ranked).unwrap()["response"]["result"],
            json!(ranked.response.result)
        );
    }

    #[test]
    fn declarations_name_both_tools() {
        let declarations = function_declarations();
        let names: Vec<&str> = declarations
            .as_array()
            .unwrap()
            .iter()
            .filter_map(|d| d["name"].as_str())
            .collect();
        assert_eq!(names, vec![SEARCH_FROM_SECTION_NAMES, SEARCH_FROM_TEXT]);
    }
}
