//! Normalise the many upload response envelopes into a flat list of document ids.
//!
//! Server versions wrap the created document differently (`{"id":..}`, `{"documents":[..]}`,
//! `{"data":{"result":..}}`, bare arrays...). Each shape has a matcher; matchers run in order and
//! the first one that claims the body decides the result. The function is total: unknown shapes
//! give an empty list.

use serde_json::{Map, Value};

use crate::contract::DocumentId;

/// A matcher returns `Some` when it recognises the shape, even if the list it produces is empty.
type Matcher = fn(&Value) -> Option<Vec<String>>;

const ID_LIST_KEYS: [&str; 3] = ["ids", "document_ids", "documents_ids"];
const ID_KEYS: [&str; 3] = ["id", "document_id", "documentId"];

const MATCHERS: [Matcher; 6] = [
    id_list,
    single_id,
    document_objects,
    nested_result,
    nested_data,
    bare_list,
];

/// Extract document ids from an upload response body. `None` means the body was not JSON.
pub fn extract_ids(body: Option<&Value>) -> Vec<DocumentId> {
    body.map(extract_strings)
        .unwrap_or_default()
        .into_iter()
        .map(DocumentId::from)
        .collect()
}

fn extract_strings(body: &Value) -> Vec<String> {
    MATCHERS
        .iter()
        .find_map(|matcher| matcher(body))
        .unwrap_or_default()
}

/// `{"ids": [..]}` and friends: elements are objects with `id` or plain values.
fn id_list(body: &Value) -> Option<Vec<String>> {
    let map = body.as_object()?;
    ID_LIST_KEYS.iter().find_map(|key| {
        map.get(*key)
            .and_then(Value::as_array)
            .map(|items| items.iter().map(element_id).collect())
    })
}

/// `{"id": ..}`, `{"document_id": ..}`, `{"documentId": ..}`.
fn single_id(body: &Value) -> Option<Vec<String>> {
    let map = body.as_object()?;
    ID_KEYS
        .iter()
        .find_map(|key| map.get(*key))
        .map(|id| vec![string_form(id)])
}

/// `{"documents": [{"id": ..}, ..]}`. Only claims the body when at least one id was found.
fn document_objects(body: &Value) -> Option<Vec<String>> {
    let documents = body.get("documents")?.as_array()?;
    let ids: Vec<String> = documents
        .iter()
        .filter_map(Value::as_object)
        .filter_map(|doc| doc.get("id"))
        .map(string_form)
        .collect();
    (!ids.is_empty()).then_some(ids)
}

fn nested_result(body: &Value) -> Option<Vec<String>> {
    nested(body.as_object()?, "result")
}

fn nested_data(body: &Value) -> Option<Vec<String>> {
    nested(body.as_object()?, "data")
}

fn nested(map: &Map<String, Value>, key: &str) -> Option<Vec<String>> {
    map.get(key).map(extract_strings)
}

fn bare_list(body: &Value) -> Option<Vec<String>> {
    body.as_array()
        .map(|items| items.iter().map(element_id).collect())
}

fn element_id(element: &Value) -> String {
    match element.as_object().and_then(|obj| obj.get("id")) {
        Some(id) => string_form(id),
        None => string_form(element),
    }
}

/// Strings keep their raw contents; everything else is rendered as compact JSON.
fn string_form(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
