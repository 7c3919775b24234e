//! The type registry, scalars, and request parsing and validation.

#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::panic))]

mod field_type;
mod fragments;
pub(crate) mod query;
mod scalar;
mod schema;
pub(crate) mod selection;

use displaydoc::Display;
pub use field_type::FieldType;
pub(crate) use fragments::*;
pub(crate) use query::Query;
pub use scalar::ScalarCodec;
pub use scalar::ScalarError;
pub use scalar::ScalarType;
pub use scalar::UriCodec;
pub use schema::*;
pub(crate) use selection::*;
use thiserror::Error;

use crate::graphql::ErrorExtension;
use crate::graphql::Location;
use crate::json_ext::Object;

/// Errors rejecting a request before execution starts.
#[derive(Error, Debug, Display, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SpecError {
    /// Must provide query string.
    MissingQuery,
    /// {message}
    ParsingError {
        /// The parser message.
        message: String,
        /// Where the syntax error is.
        locations: Vec<Location>,
    },
    /// Unknown operation named "{0}".
    UnknownOperation(String),
    /// Must provide operation name if query contains multiple operations.
    MissingOperationName,
    /// Must provide an operation.
    NoOperation,
    /// Schema is not configured to execute {0} operation.
    UnsupportedOperation(String),
    /// {message}
    ValidationError {
        /// The validation message.
        message: String,
        /// The offending selections.
        locations: Vec<Location>,
    },
    /// GraphQL introspection has been disabled, but the query contained '{0}'.
    IntrospectionDisabled(String),
    /// Query is nested {depth} levels deep, which exceeds the maximum depth of {max_depth}.
    MaxDepthExceeded {
        /// The depth of the query.
        depth: usize,
        /// The configured limit.
        max_depth: usize,
    },
    /// Variable "${name}" {reason}
    InvalidVariable {
        /// The variable name.
        name: String,
        /// Why the value was rejected.
        reason: String,
        /// The variable definition.
        locations: Vec<Location>,
    },
}

impl SpecError {
    pub(crate) fn validation(message: impl Into<String>, location: Option<Location>) -> Self {
        SpecError::ValidationError {
            message: message.into(),
            locations: location.into_iter().collect(),
        }
    }

    pub(crate) fn locations(&self) -> Vec<Location> {
        match self {
            SpecError::ParsingError { locations, .. }
            | SpecError::ValidationError { locations, .. }
            | SpecError::InvalidVariable { locations, .. } => locations.clone(),
            _ => Vec::new(),
        }
    }

    /// Converts into the GraphQL error reported to the client.
    pub fn to_error(&self) -> crate::graphql::Error {
        self.to_graphql_error(None, self.locations())
    }
}

impl ErrorExtension for SpecError {
    fn extension_code(&self) -> String {
        match self {
            SpecError::MissingQuery => "MISSING_QUERY_STRING",
            SpecError::ParsingError { .. } => "GRAPHQL_PARSING_FAILED",
            SpecError::UnknownOperation(_)
            | SpecError::MissingOperationName
            | SpecError::NoOperation
            | SpecError::ValidationError { .. } => "GRAPHQL_VALIDATION_FAILED",
            SpecError::UnsupportedOperation(_) => "OPERATION_NOT_SUPPORTED",
            SpecError::IntrospectionDisabled(_) => "INTROSPECTION_DISABLED",
            SpecError::MaxDepthExceeded { .. } => "MAX_DEPTH_LIMIT",
            SpecError::InvalidVariable { .. } => "VALIDATION_INVALID_TYPE_VARIABLE",
        }
        .to_string()
    }

    fn custom_extension_details(&self) -> Option<Object> {
        let mut obj = Object::new();
        match self {
            SpecError::MaxDepthExceeded { depth, max_depth } => {
                obj.insert("depth".to_string(), (*depth).into());
                obj.insert("maxDepth".to_string(), (*max_depth).into());
            }
            SpecError::InvalidVariable { name, .. } => {
                obj.insert("variable".to_string(), name.clone().into());
            }
            _ => (),
        }

        (!obj.is_empty()).then_some(obj)
    }
}
