use async_trait::async_trait;

use crate::error::DataSourceError;
use crate::json_ext::Object;
use crate::json_ext::Value;
use crate::spec::Schema;

/// What a resolver gets to work with.
#[derive(Debug, Clone, Copy)]
pub struct ResolverContext<'a> {
    pub schema: &'a Schema,
    /// The type declaring the field being resolved.
    pub parent_type: &'a str,
    pub field_name: &'a str,
    /// The parent value: an empty object for root fields.
    pub parent: &'a Value,
    /// Coerced field arguments, defaults applied.
    pub arguments: &'a Object,
}

impl ResolverContext<'_> {
    /// Returns a string argument.
    pub fn string_argument(&self, name: &str) -> Result<&str, DataSourceError> {
        self.arguments
            .get(name)
            .and_then(Value::as_str)
            .ok_or_else(|| DataSourceError::InvalidArguments {
                field: format!("{}.{}", self.parent_type, self.field_name),
                reason: format!("expected a string for argument '{name}'"),
            })
    }

    /// The value of the field on the parent object, if any.
    pub fn parent_property(&self) -> Option<&Value> {
        self.parent.get(self.field_name)
    }
}

/// Produces the value of a field.
///
/// `Ok(None)` means the field has no value: it completes as `null` when the
/// field is nullable and as a non-null violation otherwise.
#[async_trait]
pub trait Resolver: Send + Sync + 'static {
    async fn resolve(&self, context: ResolverContext<'_>)
    -> Result<Option<Value>, DataSourceError>;
}
