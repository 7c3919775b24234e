//! JSON helpers shared by the request, response and execution layers.

use std::fmt;

use serde::Deserialize;
use serde::Serialize;
pub use serde_json::Value;

/// A JSON object.
pub type Object = serde_json::Map<String, Value>;

/// Extension trait for [`serde_json::Value`].
pub(crate) trait ValueExt {
    /// Returns a human readable name of the JSON type, used in error messages.
    fn json_type_name(&self) -> &'static str;

    /// Returns whether this value can be coerced as a GraphQL `Int` input.
    ///
    /// Spec: https://spec.graphql.org/October2021/#sec-Int.Input-Coercion
    fn is_valid_int_input(&self) -> bool;

    /// Returns whether this value can be coerced as a GraphQL `Float` input.
    ///
    /// Spec: https://spec.graphql.org/October2021/#sec-Float.Input-Coercion
    fn is_valid_float_input(&self) -> bool;
}

impl ValueExt for Value {
    fn json_type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
        }
    }

    fn is_valid_int_input(&self) -> bool {
        // Int must be a 32-bit signed integer
        self.as_i64()
            .and_then(|x| i32::try_from(x).ok())
            .is_some()
    }

    fn is_valid_float_input(&self) -> bool {
        // Integers are accepted and widened to floats
        self.is_f64() || self.is_i64() || self.is_u64()
    }
}

/// A GraphQL path element, either a response key or a list index.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathElement {
    /// A list index.
    Index(usize),

    /// A response key (field name or alias).
    Key(String),
}

impl fmt::Display for PathElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathElement::Index(index) => write!(f, "{index}"),
            PathElement::Key(key) => write!(f, "{key}"),
        }
    }
}

impl From<&str> for PathElement {
    fn from(key: &str) -> Self {
        PathElement::Key(key.to_string())
    }
}

impl From<String> for PathElement {
    fn from(key: String) -> Self {
        PathElement::Key(key)
    }
}

impl From<usize> for PathElement {
    fn from(index: usize) -> Self {
        PathElement::Index(index)
    }
}

/// The path of a value within a GraphQL response, e.g. `/topic/relatedTopics/1/name`.
#[derive(Clone, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Path(pub Vec<PathElement>);

impl Path {
    /// The path of the response root.
    pub fn empty() -> Path {
        Path(Vec::new())
    }

    /// Returns a new path with `element` appended.
    pub fn join(&self, element: impl Into<PathElement>) -> Path {
        let mut elements = self.0.clone();
        elements.push(element.into());
        Path(elements)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PathElement> {
        self.0.iter()
    }

    /// The last response key of this path, skipping list indexes.
    pub fn last_key(&self) -> Option<&str> {
        self.0.iter().rev().find_map(|element| match element {
            PathElement::Key(key) => Some(key.as_str()),
            PathElement::Index(_) => None,
        })
    }
}

impl<T> From<Vec<T>> for Path
where
    T: Into<PathElement>,
{
    fn from(elements: Vec<T>) -> Self {
        Path(elements.into_iter().map(Into::into).collect())
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for element in &self.0 {
            write!(f, "/{element}")?;
        }
        Ok(())
    }
}
