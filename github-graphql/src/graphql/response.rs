use serde::Deserialize;
use serde::Serialize;
use serde_json::Map as JsonMap;

use crate::graphql::Error;
use crate::json_ext::Object;
use crate::json_ext::Value;

/// A GraphQL response.
///
/// `data` is absent when the request failed before execution started, and
/// `null` when a non-null root field could not be resolved.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct Response {
    /// The response data.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub data: Option<Value>,

    /// The optional graphql errors encountered.
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub errors: Vec<Error>,

    /// The optional graphql extensions.
    #[serde(skip_serializing_if = "Object::is_empty", default)]
    pub extensions: Object,
}

#[buildstructor::buildstructor]
impl Response {
    /// Constructor
    #[builder(visibility = "pub")]
    fn new(data: Option<Value>, errors: Vec<Error>, extensions: JsonMap<String, Value>) -> Self {
        Self {
            data,
            errors,
            extensions,
        }
    }

    /// A response for a request that was rejected before execution.
    pub fn from_errors(errors: Vec<Error>) -> Self {
        Self::builder().errors(errors).build()
    }

    /// Whether execution started, i.e. whether the response carries a `data` member.
    pub fn is_executed(&self) -> bool {
        self.data.is_some()
    }
}
