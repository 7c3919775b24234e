//! Leaf types and their wire codecs.

use std::sync::Arc;

use derivative::Derivative;
use displaydoc::Display;
use thiserror::Error;
use url::Url;

use crate::json_ext::Value;
use crate::json_ext::ValueExt;

/// {0}
#[derive(Error, Display, Debug, Clone, PartialEq, Eq)]
pub struct ScalarError(pub String);

/// Maps a scalar between its internal representation and its wire representation.
///
/// For every `x` that [`ScalarCodec::parse`] accepts, `parse(serialize(x)) == x`.
pub trait ScalarCodec: Send + Sync + 'static {
    /// Internal value to response value.
    fn serialize(&self, value: &Value) -> Result<Value, ScalarError>;

    /// Input value (variable or literal) to internal value.
    fn parse(&self, value: &Value) -> Result<Value, ScalarError>;
}

/// A scalar type descriptor.
#[derive(Clone, Derivative)]
#[derivative(Debug)]
pub struct ScalarType {
    pub(crate) name: String,
    pub(crate) description: Option<String>,
    pub(crate) specified_by_url: Option<String>,
    #[derivative(Debug = "ignore")]
    codec: Arc<dyn ScalarCodec>,
}

impl ScalarType {
    pub fn new(name: impl Into<String>, codec: impl ScalarCodec) -> Self {
        Self {
            name: name.into(),
            description: None,
            specified_by_url: None,
            codec: Arc::new(codec),
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn specified_by_url(mut self, url: impl Into<String>) -> Self {
        self.specified_by_url = Some(url.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn serialize(&self, value: &Value) -> Result<Value, ScalarError> {
        self.codec.serialize(value)
    }

    pub fn parse(&self, value: &Value) -> Result<Value, ScalarError> {
        self.codec.parse(value)
    }

    pub(crate) fn is_builtin(&self) -> bool {
        BUILTIN_SCALARS.contains(&self.name.as_str())
    }
}

pub(crate) const BUILTIN_SCALARS: [&str; 5] = ["String", "Int", "Float", "Boolean", "ID"];

/// The scalars every schema starts with.
pub(crate) fn builtin_scalars() -> Vec<ScalarType> {
    vec![
        ScalarType::new("String", StringCodec).description(
            "The `String` scalar type represents textual data, represented as UTF-8 character sequences.",
        ),
        ScalarType::new("Int", IntCodec)
            .description("The `Int` scalar type represents non-fractional signed whole numeric values between -2^31 and 2^31 - 1."),
        ScalarType::new("Float", FloatCodec)
            .description("The `Float` scalar type represents signed double-precision fractional values."),
        ScalarType::new("Boolean", BooleanCodec)
            .description("The `Boolean` scalar type represents `true` or `false`."),
        ScalarType::new("ID", IdCodec).description(
            "The `ID` scalar type represents a unique identifier, serialized as a String.",
        ),
    ]
}

fn invalid(type_name: &str, value: &Value) -> ScalarError {
    ScalarError(format!(
        "{type_name} cannot represent a non {} value: {value}",
        type_name.to_lowercase()
    ))
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct StringCodec;

impl ScalarCodec for StringCodec {
    // Result coercion is lenient: numbers and booleans are stringified
    fn serialize(&self, value: &Value) -> Result<Value, ScalarError> {
        match value {
            Value::String(_) => Ok(value.clone()),
            Value::Bool(b) => Ok(Value::String(b.to_string())),
            Value::Number(n) => Ok(Value::String(n.to_string())),
            _ => Err(invalid("String", value)),
        }
    }

    fn parse(&self, value: &Value) -> Result<Value, ScalarError> {
        match value {
            Value::String(_) => Ok(value.clone()),
            _ => Err(invalid("String", value)),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct IntCodec;

impl ScalarCodec for IntCodec {
    fn serialize(&self, value: &Value) -> Result<Value, ScalarError> {
        match value {
            Value::Bool(b) => Ok(Value::from(i32::from(*b))),
            Value::Number(n) => {
                let int = n
                    .as_i64()
                    .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64))
                    .and_then(|i| i32::try_from(i).ok());
                int.map(Value::from).ok_or_else(|| invalid("Int", value))
            }
            _ => Err(invalid("Int", value)),
        }
    }

    fn parse(&self, value: &Value) -> Result<Value, ScalarError> {
        if value.is_valid_int_input() {
            Ok(value.clone())
        } else {
            Err(invalid("Int", value))
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct FloatCodec;

impl ScalarCodec for FloatCodec {
    fn serialize(&self, value: &Value) -> Result<Value, ScalarError> {
        match value {
            Value::Number(_) => Ok(value.clone()),
            Value::Bool(b) => Ok(Value::from(if *b { 1.0 } else { 0.0 })),
            _ => Err(invalid("Float", value)),
        }
    }

    fn parse(&self, value: &Value) -> Result<Value, ScalarError> {
        if value.is_valid_float_input() {
            Ok(value.clone())
        } else {
            Err(invalid("Float", value))
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct BooleanCodec;

impl ScalarCodec for BooleanCodec {
    fn serialize(&self, value: &Value) -> Result<Value, ScalarError> {
        match value {
            Value::Bool(_) => Ok(value.clone()),
            _ => Err(invalid("Boolean", value)),
        }
    }

    fn parse(&self, value: &Value) -> Result<Value, ScalarError> {
        self.serialize(value)
    }
}

/// IDs are strings on the wire; integer inputs are accepted and stringified.
#[derive(Debug, Clone, Copy)]
pub(crate) struct IdCodec;

impl ScalarCodec for IdCodec {
    fn serialize(&self, value: &Value) -> Result<Value, ScalarError> {
        match value {
            Value::String(_) => Ok(value.clone()),
            Value::Number(n) if n.is_i64() || n.is_u64() => Ok(Value::String(n.to_string())),
            _ => Err(invalid("ID", value)),
        }
    }

    fn parse(&self, value: &Value) -> Result<Value, ScalarError> {
        self.serialize(value)
    }
}

/// RFC 3986 URIs. Values are checked with [`Url::parse`] and kept as written.
#[derive(Debug, Clone, Copy)]
pub struct UriCodec;

impl UriCodec {
    fn validate(value: &Value) -> Result<Value, ScalarError> {
        let raw = value
            .as_str()
            .ok_or_else(|| ScalarError(format!("URI must be a string, got {}", value.json_type_name())))?;
        Url::parse(raw).map_err(|e| ScalarError(format!("invalid URI '{raw}': {e}")))?;
        Ok(value.clone())
    }
}

impl ScalarCodec for UriCodec {
    fn serialize(&self, value: &Value) -> Result<Value, ScalarError> {
        Self::validate(value)
    }

    fn parse(&self, value: &Value) -> Result<Value, ScalarError> {
        Self::validate(value)
    }
}
