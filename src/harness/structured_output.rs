use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

static FENCED_BLOCK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```[A-Za-z]*[ \t]*\r?\n?(.*?)```").expect("valid fence regex"));

/// Which step of the extraction chain produced the JSON value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionStrategy {
    FencedBlock,
    WholeText,
    BalancedBraces,
    OuterBraces,
}

/// Pulls a JSON value out of free-form model output. Strategies run in order
/// and the first one that yields parseable JSON wins.
pub fn extract_json(text: &str) -> Option<(Value, ExtractionStrategy)> {
    let steps: [(ExtractionStrategy, fn(&str) -> Option<Value>); 4] = [
        (ExtractionStrategy::FencedBlock, from_fenced_block),
        (ExtractionStrategy::WholeText, parse_json_value),
        (ExtractionStrategy::BalancedBraces, from_balanced_braces),
        (ExtractionStrategy::OuterBraces, from_outer_braces),
    ];
    steps
        .into_iter()
        .find_map(|(strategy, step)| step(text).map(|value| (value, strategy)))
}

fn parse_json_value(raw: &str) -> Option<Value> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    serde_json::from_str(trimmed).ok()
}

fn from_fenced_block(text: &str) -> Option<Value> {
    FENCED_BLOCK_RE
        .captures_iter(text)
        .filter_map(|captures| captures.get(1))
        .find_map(|block| parse_json_value(block.as_str()))
}

/// Leftmost `{` up to the brace that closes it, ignoring braces inside strings.
fn from_balanced_braces(text: &str) -> Option<Value> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return parse_json_value(&text[start..=start + offset]);
                }
            }
            _ => {}
        }
    }
    None
}

fn from_outer_braces(text: &str) -> Option<Value> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }
    parse_json_value(&text[start..=end])
}

/// Checks `value` against a JSON schema and returns every violation, each
/// prefixed with its instance path when it has one.
pub fn validate_structured_output(value: &Value, schema: &Value) -> Result<(), Vec<String>> {
    let compiled = jsonschema::JSONSchema::compile(schema)
        .map_err(|error| vec![format!("Failed to compile response schema: {}", error)])?;

    let errors: Vec<String> = compiled
        .validate(value)
        .err()
        .map(|errors| {
            errors
                .map(|error| {
                    let path = error.instance_path.to_string();
                    if path.is_empty() {
                        error.to_string()
                    } else {
                        format!("{}: {}", path, error)
                    }
                })
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
