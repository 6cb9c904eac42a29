//! Conversions from domain types into template [`Value`]s. Keys are
//! snake_case.

use crate::document::{Attributes, RenderedDocument};
use gtmpl_value::Value;
use std::collections::HashMap;

/// Builds an object value from key/value pairs.
pub fn object<I>(pairs: I) -> Value
where
    I: IntoIterator<Item = (&'static str, Value)>,
{
    let m: HashMap<String, Value> = pairs.into_iter().map(|(k, v)| (k.to_owned(), v)).collect();
    Value::Object(m)
}

/// Adds `pairs` to an object value, replacing existing keys. Anything other
/// than an object is returned unchanged.
pub fn extend<I>(value: Value, pairs: I) -> Value
where
    I: IntoIterator<Item = (&'static str, Value)>,
{
    match value {
        Value::Object(mut m) => {
            m.extend(pairs.into_iter().map(|(k, v)| (k.to_owned(), v)));
            Value::Object(m)
        }
        other => other,
    }
}

/// Converts an optional string to a string or [`Value::Nil`], which
/// templates treat as false in `{{if}}`.
pub fn optional(value: Option<&str>) -> Value {
    match value {
        Some(s) => Value::String(s.to_owned()),
        None => Value::Nil,
    }
}

/// Converts front matter YAML into template values. Mapping keys which
/// aren't strings are rendered as YAML.
pub fn from_yaml(yaml: &serde_yaml::Value) -> Value {
    use serde_yaml::Value as Yaml;
    match yaml {
        Yaml::Null => Value::Nil,
        Yaml::Bool(b) => Value::Bool(*b),
        Yaml::Number(n) => match (n.as_i64(), n.as_u64(), n.as_f64()) {
            (Some(i), _, _) => Value::from(i),
            (None, Some(u), _) => Value::from(u),
            (None, None, Some(f)) => Value::from(f),
            _ => Value::Nil,
        },
        Yaml::String(s) => Value::String(s.clone()),
        Yaml::Sequence(items) => Value::Array(items.iter().map(from_yaml).collect()),
        Yaml::Mapping(mapping) => Value::Object(
            mapping
                .iter()
                .map(|(k, v)| {
                    let key = match k {
                        Yaml::String(s) => s.clone(),
                        other => serde_yaml::to_string(other)
                            .map(|s| s.trim_end().to_owned())
                            .unwrap_or_default(),
                    };
                    (key, from_yaml(v))
                })
                .collect(),
        ),
        Yaml::Tagged(tagged) => from_yaml(&tagged.value),
    }
}

impl From<&Attributes> for Value {
    /// Converts front matter into an object with `title`, `datetime`, `tags`
    /// and every other attribute under its own key.
    fn from(attributes: &Attributes) -> Value {
        let mut m: HashMap<String, Value> = attributes
            .extra
            .iter()
            .map(|(k, v)| (k.clone(), from_yaml(v)))
            .collect();
        m.insert("title".to_owned(), Value::String(attributes.title.clone()));
        m.insert("datetime".to_owned(), optional(attributes.datetime.as_deref()));
        m.insert("tags".to_owned(), tags(&attributes.tags));
        Value::Object(m)
    }
}

impl From<&RenderedDocument> for Value {
    /// Converts a document into the object post, list, feed and sitemap
    /// templates iterate over. `date` is RFC 3339 so the `humanDate` and
    /// `isoDate` helpers can format it.
    fn from(document: &RenderedDocument) -> Value {
        object([
            ("slug", Value::String(document.slug.clone())),
            ("url", Value::String(document.path())),
            ("canonical", Value::String(document.canonical.clone())),
            ("title", Value::String(document.title.clone())),
            ("date", Value::String(document.date.to_rfc3339())),
            ("content", Value::String(document.content.clone())),
            ("snippet", Value::String(document.snippet.clone())),
            ("tags", tags(&document.attributes.tags)),
            ("attributes", Value::from(&document.attributes)),
            ("author_handle", optional(document.author_handle.as_deref())),
            ("is_blog_entry", Value::Bool(true)),
        ])
    }
}

fn tags(tags: &[String]) -> Value {
    Value::Array(tags.iter().map(|t| Value::String(t.clone())).collect())
}
