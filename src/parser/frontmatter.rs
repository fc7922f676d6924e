use serde_yaml::Value;
use std::collections::BTreeMap;
use tracing::warn;

const DELIMITER: &str = "---";

/// Split a leading `---` delimited YAML block off `content`.
///
/// Returns the metadata flattened to strings and the remaining text. When the
/// opening or closing delimiter is missing the metadata is empty and the text
/// is returned untouched. A block that is not a YAML mapping is still removed
/// but yields no metadata.
pub fn split_front_matter(content: &str) -> (BTreeMap<String, String>, &str) {
    let mut lines = content.split_inclusive('\n');
    let start = match lines.next() {
        Some(first) if first.trim_end() == DELIMITER => first.len(),
        _ => return (BTreeMap::new(), content),
    };

    let mut consumed = start;
    for line in lines {
        let block_end = consumed;
        consumed += line.len();
        if line.trim_end() == DELIMITER {
            let metadata = parse_block(&content[start..block_end]);
            return (metadata, &content[consumed..]);
        }
    }

    // No closing delimiter: treat the whole file as body.
    (BTreeMap::new(), content)
}

fn parse_block(block: &str) -> BTreeMap<String, String> {
    let mapping = match serde_yaml::from_str::<Value>(block) {
        Ok(Value::Mapping(mapping)) => mapping,
        Ok(_) => return BTreeMap::new(),
        Err(e) => {
            warn!("Ignoring malformed front matter: {}", e);
            return BTreeMap::new();
        }
    };

    mapping
        .into_iter()
        .filter_map(|(key, value)| Some((scalar(&key)?, flatten(&value))))
        .collect()
}

/// Lists become `[a, b]`, the same shape as an inline YAML list.
fn flatten(value: &Value) -> String {
    match value {
        Value::Sequence(items) => {
            let items: Vec<String> = items.iter().map(flatten).collect();
            format!("[{}]", items.join(", "))
        }
        Value::Mapping(_) => serde_yaml::to_string(value)
            .map(|s| s.trim_end().to_string())
            .unwrap_or_default(),
        Value::Tagged(tagged) => flatten(&tagged.value),
        other => scalar(other).unwrap_or_default(),
    }
}

fn scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Null => Some(String::new()),
        _ => None,
    }
}
