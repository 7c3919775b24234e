//! Schema construction and execution errors.
use displaydoc::Display;
use serde::Serialize;
use thiserror::Error;

pub use crate::configuration::ConfigurationError;
pub use crate::graphql::Error;
use crate::graphql::ErrorExtension;
use crate::json_ext::Object;

/// Errors raised while building the type registry.
///
/// These are fatal: the schema is closed before the server starts, so they
/// never happen at request time.
#[derive(Error, Display, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SchemaError {
    /// type '{0}' is already registered
    DuplicateType(String),

    /// unknown type '{name}' referenced by {referenced_by}
    UnknownType {
        /// The missing type.
        name: String,
        /// Where the type was referenced.
        referenced_by: String,
    },

    /// type '{type_name}' has no field '{field}'
    UnknownField {
        /// The type that was searched.
        type_name: String,
        /// The missing field.
        field: String,
    },

    /// {location} has type '{ty}', which is not {expected}
    InvalidFieldType {
        /// The field or argument coordinate.
        location: String,
        /// The declared type.
        ty: String,
        /// What kind of type was expected.
        expected: &'static str,
    },

    /// type '{object}' does not conform to interface '{interface}': {reason}
    InterfaceConformance {
        /// The object type.
        object: String,
        /// The interface type.
        interface: String,
        /// The failure reason.
        reason: String,
    },

    /// no resolver bound to root field 'Query.{0}'
    MissingResolver(String),

    /// the schema has no 'Query' object type
    MissingQueryType,
}

/// Invalid arguments for a field.
#[derive(Error, Display, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
#[non_exhaustive]
pub enum ArgumentValidationError {
    /// Field "{field}" argument "{argument}" of type "{ty}" is required, but it was not provided.
    Missing {
        /// The field coordinate.
        field: String,
        /// The argument name.
        argument: String,
        /// The argument type.
        ty: String,
    },

    /// Unknown argument "{argument}" on field "{field}".
    Unknown {
        /// The field coordinate.
        field: String,
        /// The argument name.
        argument: String,
    },

    /// Argument "{argument}" on field "{field}" has an invalid value: {reason}
    Invalid {
        /// The field coordinate.
        field: String,
        /// The argument name.
        argument: String,
        /// Why the value was rejected.
        reason: String,
    },
}

impl ErrorExtension for ArgumentValidationError {
    fn extension_code(&self) -> String {
        "ARGUMENT_VALIDATION_FAILED".to_string()
    }

    fn custom_extension_details(&self) -> Option<Object> {
        let mut details = Object::new();
        match self {
            ArgumentValidationError::Missing { argument, .. }
            | ArgumentValidationError::Unknown { argument, .. }
            | ArgumentValidationError::Invalid { argument, .. } => {
                details.insert("argument".to_string(), argument.clone().into());
            }
        }
        Some(details)
    }
}

/// Failures of the external collaborators that produce field data.
#[derive(Error, Display, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
#[non_exhaustive]
pub enum DataSourceError {
    /// fetch from '{service}' failed: {reason}
    Fetch {
        /// The data source.
        service: String,
        /// The failure reason.
        reason: String,
        /// The upstream HTTP status, if any.
        #[serde(skip)]
        status: Option<u16>,
    },

    /// resolver for '{field}' timed out after {timeout_ms}ms
    Timeout {
        /// The field coordinate.
        field: String,
        /// The configured timeout.
        timeout_ms: u128,
    },

    /// '{service}' returned malformed data: {reason}
    Malformed {
        /// The data source.
        service: String,
        /// The reason the data was rejected.
        reason: String,
    },

    /// invalid arguments for '{field}': {reason}
    InvalidArguments {
        /// The field coordinate.
        field: String,
        /// The reason.
        reason: String,
    },
}

impl ErrorExtension for DataSourceError {
    fn extension_code(&self) -> String {
        match self {
            DataSourceError::Fetch { .. } => "DATA_SOURCE_FETCH_FAILED",
            DataSourceError::Timeout { .. } => "DATA_SOURCE_TIMEOUT",
            DataSourceError::Malformed { .. } => "DATA_SOURCE_MALFORMED_RESPONSE",
            DataSourceError::InvalidArguments { .. } => "DATA_SOURCE_INVALID_ARGUMENTS",
        }
        .to_string()
    }

    fn custom_extension_details(&self) -> Option<Object> {
        match self {
            DataSourceError::Fetch {
                status: Some(status),
                ..
            } => {
                let mut details = Object::new();
                details.insert(
                    "http".to_string(),
                    serde_json::json!({ "status": status }),
                );
                Some(details)
            }
            _ => None,
        }
    }
}

/// Field-level execution errors.
///
/// Each one nulls the field it happened on (or its nearest nullable ancestor)
/// and adds an entry to the response `errors`.
#[derive(Error, Display, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum FieldError {
    /// {0}
    ArgumentValidation(#[from] ArgumentValidationError),

    /// {0}
    DataSource(#[from] DataSourceError),

    /// Abstract type "{interface}" must resolve to an Object type at runtime. Either the data is missing a "type" discriminator or "{tag}" is not a possible type.
    UnresolvableType {
        /// The interface being resolved.
        interface: String,
        /// The discriminator found in the data.
        tag: String,
    },

    /// Cannot return null for non-nullable field {parent}.{field}.
    NonNullViolation {
        /// The parent type.
        parent: String,
        /// The field name.
        field: String,
    },

    /// {ty} cannot represent value: {reason}
    Serialization {
        /// The leaf type.
        ty: String,
        /// Why serialization failed.
        reason: String,
    },

    /// Expected a list for field "{parent}.{field}" but received a(n) {found}.
    NotAList {
        /// The parent type.
        parent: String,
        /// The field name.
        field: String,
        /// The JSON type received.
        found: &'static str,
    },

    /// Cannot query field "{field}" on type "{parent}".
    UnknownField {
        /// The parent type.
        parent: String,
        /// The field name.
        field: String,
    },
}

impl ErrorExtension for FieldError {
    fn extension_code(&self) -> String {
        match self {
            FieldError::ArgumentValidation(error) => error.extension_code(),
            FieldError::DataSource(error) => error.extension_code(),
            FieldError::UnresolvableType { .. } => "UNRESOLVABLE_TYPE".to_string(),
            FieldError::NonNullViolation { .. } => "NON_NULL_VIOLATION".to_string(),
            FieldError::Serialization { .. } => "SERIALIZATION_FAILED".to_string(),
            FieldError::NotAList { .. } => "RESPONSE_VALIDATION_FAILED".to_string(),
            FieldError::UnknownField { .. } => "INVALID_FIELD".to_string(),
        }
    }

    fn custom_extension_details(&self) -> Option<Object> {
        match self {
            FieldError::ArgumentValidation(error) => error.custom_extension_details(),
            FieldError::DataSource(error) => error.custom_extension_details(),
            FieldError::UnresolvableType { interface, tag } => {
                let mut details = Object::new();
                details.insert("interface".to_string(), interface.clone().into());
                details.insert("discriminator".to_string(), tag.clone().into());
                Some(details)
            }
            _ => None,
        }
    }
}

/// Errors raised by the HTTP server lifecycle.
#[derive(Error, Display, Debug)]
#[non_exhaustive]
pub enum ServerError {
    /// could not create the HTTP server: {0}
    ServerCreationError(std::io::Error),

    /// failed to stop HTTP Server
    HttpServerLifecycleError,
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;
    use crate::json_ext::Path;

    #[test]
    fn unresolvable_type_converts_to_graphql_error() {
        let error = FieldError::UnresolvableType {
            interface: "RepositoryOwner".to_string(),
            tag: "Bot".to_string(),
        }
        .to_graphql_error(Some(Path::from(vec!["repositoryOwner"])), vec![]);

        assert_eq!(
            serde_json::to_value(&error).unwrap(),
            json!({
                "message": "Abstract type \"RepositoryOwner\" must resolve to an Object type at runtime. Either the data is missing a \"type\" discriminator or \"Bot\" is not a possible type.",
                "path": ["repositoryOwner"],
                "extensions": {
                    "interface": "RepositoryOwner",
                    "discriminator": "Bot",
                    "code": "UNRESOLVABLE_TYPE"
                }
            })
        );
    }

    #[test]
    fn fetch_error_carries_http_status() {
        let error = FieldError::from(DataSourceError::Fetch {
            service: "github".to_string(),
            reason: "bad gateway".to_string(),
            status: Some(502),
        })
        .to_graphql_error(None, vec![]);
        assert_eq!(error.message, "fetch from 'github' failed: bad gateway");
        assert_eq!(error.extensions.get("http"), Some(&json!({ "status": 502 })));
        assert_eq!(
            error.extension_code().as_deref(),
            Some("DATA_SOURCE_FETCH_FAILED")
        );
    }
}
