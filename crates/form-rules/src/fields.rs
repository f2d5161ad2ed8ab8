use reunion_common::{flag_value, Section};
use serde_json::Value;

pub(crate) fn flag(section: &Section, key: &str) -> Option<bool> {
    section.get(key).and_then(flag_value)
}

pub(crate) fn text<'a>(section: &'a Section, key: &str) -> Option<&'a str> {
    match section.get(key)? {
        Value::String(s) => Some(s.trim()),
        Value::Null => Some(""),
        _ => None,
    }
}

/// String list; a lone string counts as a one-element list.
pub(crate) fn list(section: &Section, key: &str) -> Option<Vec<String>> {
    match section.get(key)? {
        Value::Array(items) => Some(
            items
                .iter()
                .filter_map(Value::as_str)
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
        ),
        Value::String(s) if s.trim().is_empty() => Some(Vec::new()),
        Value::String(s) => Some(vec![s.trim().to_string()]),
        Value::Null => Some(Vec::new()),
        _ => None,
    }
}

pub(crate) fn reset(section: &mut Section, defaults: Vec<(&str, Value)>) {
    for (key, value) in defaults {
        section.insert(key.to_string(), value);
    }
}

pub(crate) fn object(value: Value) -> Section {
    match value {
        Value::Object(map) => map,
        _ => Section::new(),
    }
}
