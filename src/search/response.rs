//! Response Flattener
//!
//! Decodes the universal-search JSON (`response.modules[*]`) into one
//! [`SearchVerticalResponse`] per vertical. Any deviation from the expected
//! shape is an error naming the offending path.

use crate::error::{Result, SqiError};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeSet;

pub const LINKS_VERTICAL: &str = "links";
const BUSINESS_ID_KEY: &str = "businessId";
const DATA_KEY: &str = "data";

/// One result entity: a field map exactly as the API returned it, minus
/// the business identifier.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntityResult(Map<String, Value>);

impl EntityResult {
    pub fn new(mut fields: Map<String, Value>) -> Self {
        fields.remove(BUSINESS_ID_KEY);
        Self(fields)
    }

    pub fn raw(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Displayable fields: nested under `data` for entity verticals.
    pub fn data(&self) -> Option<&Map<String, Value>> {
        self.0.get(DATA_KEY).and_then(Value::as_object)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchVerticalResponse {
    pub vertical_id: String,
    pub results: Vec<EntityResult>,
}

impl SearchVerticalResponse {
    pub fn is_links(&self) -> bool {
        self.vertical_id.eq_ignore_ascii_case(LINKS_VERTICAL)
    }

    pub fn field_names(&self) -> BTreeSet<String> {
        if self.is_links() {
            extract_link_field_names(&self.results)
        } else {
            extract_field_names(&self.results)
        }
    }

    /// Per-entity displayable field maps; entities without a `data` object
    /// yield an empty map.
    pub fn display_fields(&self) -> Vec<Map<String, Value>> {
        self.results
            .iter()
            .map(|entity| {
                if self.is_links() {
                    entity.raw().clone()
                } else {
                    entity.data().cloned().unwrap_or_default()
                }
            })
            .collect()
    }
}

/// Decode `response.modules` of a raw universal-search response.
pub fn flatten_response(raw: &Value) -> Result<Vec<SearchVerticalResponse>> {
    let response = raw
        .get("response")
        .ok_or_else(|| SqiError::shape("response", "missing"))?
        .as_object()
        .ok_or_else(|| SqiError::shape("response", "expected an object"))?;

    let modules = match response.get("modules") {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::Array(modules)) => modules,
        Some(_) => return Err(SqiError::shape("response.modules", "expected a list")),
    };

    modules
        .iter()
        .enumerate()
        .map(|(idx, module)| decode_module(idx, module))
        .collect()
}

fn decode_module(idx: usize, module: &Value) -> Result<SearchVerticalResponse> {
    let path = format!("response.modules[{}]", idx);
    let module = module
        .as_object()
        .ok_or_else(|| SqiError::shape(&path, "expected an object"))?;

    let vertical_id = module
        .get("verticalConfigId")
        .and_then(Value::as_str)
        .ok_or_else(|| SqiError::shape(format!("{}.verticalConfigId", path), "missing or not a string"))?
        .to_string();

    let results = match module.get("results") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items
            .iter()
            .enumerate()
            .map(|(result_idx, item)| {
                item.as_object()
                    .cloned()
                    .map(EntityResult::new)
                    .ok_or_else(|| {
                        SqiError::shape(format!("{}.results[{}]", path, result_idx), "expected an object")
                    })
            })
            .collect::<Result<Vec<_>>>()?,
        Some(_) => return Err(SqiError::shape(format!("{}.results", path), "expected a list")),
    };

    Ok(SearchVerticalResponse { vertical_id, results })
}

/// Copy of the raw response with the business identifier removed, for display.
pub fn redact_business_id(raw: &Value) -> Value {
    let mut redacted = raw.clone();
    if let Some(response) = redacted.get_mut("response").and_then(Value::as_object_mut) {
        response.remove(BUSINESS_ID_KEY);
        if let Some(Value::Array(modules)) = response.get_mut("modules") {
            for module in modules.iter_mut().filter_map(Value::as_object_mut) {
                module.remove(BUSINESS_ID_KEY);
                if let Some(Value::Array(results)) = module.get_mut("results") {
                    for result in results.iter_mut().filter_map(Value::as_object_mut) {
                        result.remove(BUSINESS_ID_KEY);
                    }
                }
            }
        }
    }
    redacted
}

/// Field names of an entity vertical, read from the first entity's `data`.
///
/// Later entities are not consulted; a vertical is assumed to share one
/// schema.
pub fn extract_field_names(results: &[EntityResult]) -> BTreeSet<String> {
    results
        .first()
        .and_then(EntityResult::data)
        .map(|data| data.keys().cloned().collect())
        .unwrap_or_default()
}

/// Field names of the Links vertical: top-level keys of the first entity.
pub fn extract_link_field_names(results: &[EntityResult]) -> BTreeSet<String> {
    results
        .first()
        .map(|entity| entity.raw().keys().cloned().collect())
        .unwrap_or_default()
}

pub fn union_fields<I, L, S>(lists: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = L>,
    L: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    lists
        .into_iter()
        .flatten()
        .map(|name| name.as_ref().to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_response() -> Value {
        json!({
            "meta": {"uuid": "abc"},
            "response": {
                "businessId": 3350634,
                "modules": [
                    {
                        "verticalConfigId": "locations",
                        "resultsCount": 2,
                        "results": [
                            {"businessId": 3350634, "data": {"name": "Acme Downtown", "address": "1 Main St"}},
                            {"data": {"name": "Acme Uptown", "hours": "9-5"}}
                        ]
                    },
                    {
                        "verticalConfigId": "LINKS",
                        "results": [
                            {"htmlTitle": "Acme | Home", "link": "https://acme.example"}
                        ]
                    }
                ]
            }
        })
    }

    #[test]
    fn test_flatten_response() {
        let verticals = flatten_response(&sample_response()).unwrap();
        assert_eq!(verticals.len(), 2);
        assert_eq!(verticals[0].vertical_id, "locations");
        assert_eq!(verticals[0].results.len(), 2);
        assert!(!verticals[0].results[0].raw().contains_key("businessId"));
        assert!(verticals[1].is_links());
    }

    #[test]
    fn test_field_names_use_first_entity_only() {
        let verticals = flatten_response(&sample_response()).unwrap();
        let names: Vec<String> = verticals[0].field_names().into_iter().collect();
        assert_eq!(names, vec!["address", "name"]);
    }

    #[test]
    fn test_link_field_names_are_top_level() {
        let verticals = flatten_response(&sample_response()).unwrap();
        let names: Vec<String> = extract_link_field_names(&verticals[1].results).into_iter().collect();
        assert_eq!(names, vec!["htmlTitle", "link"]);
    }

    #[test]
    fn test_union_fields() {
        let union = union_fields(vec![vec!["a", "b"], vec!["b", "c"]]);
        let expected: BTreeSet<String> = ["a", "b", "c"].iter().map(|s| s.to_string()).collect();
        assert_eq!(union, expected);
    }

    #[test]
    fn test_empty_vertical_has_no_fields() {
        assert!(extract_field_names(&[]).is_empty());
        assert!(extract_link_field_names(&[]).is_empty());
        let no_data = vec![EntityResult::new(json!({"id": 1}).as_object().cloned().unwrap())];
        assert!(extract_field_names(&no_data).is_empty());
    }

    #[test]
    fn test_display_fields() {
        let verticals = flatten_response(&sample_response()).unwrap();
        let entities = verticals[0].display_fields();
        assert_eq!(entities[1].get("hours"), Some(&json!("9-5")));
        let links = verticals[1].display_fields();
        assert_eq!(links[0].get("htmlTitle"), Some(&json!("Acme | Home")));
    }

    #[test]
    fn test_shape_errors_name_the_path() {
        let err = flatten_response(&json!({"meta": {}})).unwrap_err();
        assert!(err.to_string().contains("response"));

        let err = flatten_response(&json!({"response": {"modules": {}}})).unwrap_err();
        assert!(err.to_string().contains("response.modules"));

        let err = flatten_response(&json!({"response": {"modules": [{"results": []}]}})).unwrap_err();
        assert!(err.to_string().contains("response.modules[0].verticalConfigId"));

        let err = flatten_response(&json!({
            "response": {"modules": [{"verticalConfigId": "faqs", "results": [1]}]}
        }))
        .unwrap_err();
        assert!(err.to_string().contains("response.modules[0].results[0]"));
    }

    #[test]
    fn test_no_modules_is_empty() {
        assert!(flatten_response(&json!({"response": {}})).unwrap().is_empty());
        let verticals = flatten_response(&json!({"response": {"modules": [{"verticalConfigId": "faqs"}]}})).unwrap();
        assert!(verticals[0].results.is_empty());
    }

    #[test]
    fn test_redact_business_id() {
        let redacted = redact_business_id(&sample_response());
        assert!(redacted["response"].get("businessId").is_none());
        assert!(redacted["response"]["modules"][0]["results"][0].get("businessId").is_none());
        assert_eq!(redacted["meta"]["uuid"], json!("abc"));
    }
}
