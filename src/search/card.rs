//! Text cards for single search results

use serde_json::{Map, Value};

pub const DEFAULT_CHAR_LIMIT: i64 = 500;
pub const ELLIPSIS: &str = "...";

/// Render the selected fields of one entity.
///
/// The first field becomes a `### ` heading, each following field its own
/// paragraph. Values longer than `char_limit` characters are cut and get
/// [`ELLIPSIS`] appended; `char_limit <= 0` turns truncation off.
pub fn render_entity_card<S: AsRef<str>>(fields: &Map<String, Value>, selected: &[S], char_limit: i64) -> String {
    let mut parts = selected.iter().map(|name| {
        let text = stringify(fields.get(name.as_ref()));
        truncate(&text, char_limit)
    });

    let Some(heading) = parts.next() else {
        return String::new();
    };

    let mut card = format!("### {}", heading);
    for paragraph in parts {
        card.push_str("\n\n");
        card.push_str(&paragraph);
    }
    card
}

fn stringify(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

fn truncate(text: &str, char_limit: i64) -> String {
    if char_limit <= 0 {
        return text.to_string();
    }
    let limit = char_limit as usize;
    match text.char_indices().nth(limit) {
        Some((cut, _)) => format!("{}{}", &text[..cut], ELLIPSIS),
        None => text.to_string(),
    }
}
