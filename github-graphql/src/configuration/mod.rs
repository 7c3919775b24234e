//! Logic for loading configuration in to an object model

mod server;

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use derivative::Derivative;
use displaydoc::Display;
use schemars::JsonSchema;
use schemars::r#gen::SchemaSettings;
use schemars::schema::RootSchema;
use serde::Deserialize;
use serde::Serialize;
pub(crate) use server::Server;
use thiserror::Error;
use url::Url;

use crate::execution::DEFAULT_MAX_DEPTH;
use crate::execution::DEFAULT_RESOLVER_TIMEOUT;

/// Configuration error.
#[derive(Debug, Error, Display)]
#[non_exhaustive]
pub enum ConfigurationError {
    /// could not read '{path}': {error}
    CannotReadFile {
        /// The file that could not be read.
        path: PathBuf,
        /// The I/O failure.
        error: std::io::Error,
    },
    /// {message}: {error}
    InvalidConfiguration {
        /// What was being done.
        message: &'static str,
        /// The underlying error.
        error: String,
    },
    /// invalid {kind} fixture: {reason}
    InvalidFixture {
        /// The kind of record.
        kind: &'static str,
        /// What is wrong with it.
        reason: String,
    },
}

/// The configuration for the server.
///
/// Can be created through `serde::Deserialize` from various formats,
/// or inline in Rust code with `serde_json::json!` and `serde_json::from_value`.
#[derive(Clone, Derivative, Deserialize, Serialize, JsonSchema, Default)]
#[derivative(Debug)]
#[serde(deny_unknown_fields)]
pub struct Configuration {
    /// Configuration options pertaining to the http server component.
    #[serde(default)]
    pub(crate) server: Server,

    /// Query execution limits.
    #[serde(default)]
    pub(crate) execution: Execution,

    /// Where field data comes from.
    #[serde(default)]
    pub(crate) data_source: DataSource,
}

#[cfg(test)]
#[buildstructor::buildstructor]
impl Configuration {
    #[builder]
    pub(crate) fn new(
        server: Option<Server>,
        execution: Option<Execution>,
        data_source: Option<DataSource>,
    ) -> Self {
        Self {
            server: server.unwrap_or_default(),
            execution: execution.unwrap_or_default(),
            data_source: data_source.unwrap_or_default(),
        }
    }
}

/// Parse configuration from a string in YAML syntax
impl FromStr for Configuration {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        validate_configuration(s)
    }
}

fn default_resolver_timeout() -> Duration {
    DEFAULT_RESOLVER_TIMEOUT
}

fn default_max_depth() -> usize {
    DEFAULT_MAX_DEPTH
}

/// Query execution limits.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub(crate) struct Execution {
    /// Time allowed to each resolver call in human-readable format; defaults to 10s
    #[serde(
        with = "humantime_serde",
        default = "default_resolver_timeout"
    )]
    #[schemars(with = "String", default = "default_resolver_timeout")]
    pub(crate) resolver_timeout: Duration,

    /// Maximum nesting of selection sets in a query
    /// default: 32
    #[serde(default = "default_max_depth")]
    pub(crate) max_depth: usize,
}

#[buildstructor::buildstructor]
impl Execution {
    #[builder]
    pub(crate) fn new(resolver_timeout: Option<Duration>, max_depth: Option<usize>) -> Self {
        Self {
            resolver_timeout: resolver_timeout.unwrap_or_else(default_resolver_timeout),
            max_depth: max_depth.unwrap_or_else(default_max_depth),
        }
    }
}

impl Default for Execution {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Where field data comes from.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[serde(deny_unknown_fields, rename_all = "snake_case")]
pub(crate) enum DataSource {
    /// Serve records from a YAML or JSON fixture file.
    Fixture {
        /// The fixture file.
        path: PathBuf,
    },
    /// Query the GitHub REST API.
    Rest(Rest),
}

impl Default for DataSource {
    fn default() -> Self {
        DataSource::Rest(Rest::default())
    }
}

fn default_endpoint() -> Url {
    // A constant, valid URL
    Url::parse("https://api.github.com").unwrap_or_else(|_| unreachable!())
}

fn default_token_env() -> String {
    String::from("GITHUB_TOKEN")
}

fn default_rest_timeout() -> Duration {
    Duration::from_secs(5)
}

/// GitHub REST API settings.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub(crate) struct Rest {
    /// The API root
    /// default: "https://api.github.com"
    #[serde(default = "default_endpoint")]
    #[schemars(with = "String")]
    pub(crate) endpoint: Url,

    /// Environment variable holding a bearer token; requests are anonymous when unset
    /// default: "GITHUB_TOKEN"
    #[serde(default = "default_token_env")]
    pub(crate) token_env: String,

    /// HTTP timeout in human-readable format; defaults to 5s
    #[serde(with = "humantime_serde", default = "default_rest_timeout")]
    #[schemars(with = "String", default = "default_rest_timeout")]
    pub(crate) timeout: Duration,
}

#[buildstructor::buildstructor]
impl Rest {
    #[builder]
    pub(crate) fn new(endpoint: Option<Url>, token_env: Option<String>, timeout: Option<Duration>) -> Self {
        Self {
            endpoint: endpoint.unwrap_or_else(default_endpoint),
            token_env: token_env.unwrap_or_else(default_token_env),
            timeout: timeout.unwrap_or_else(default_rest_timeout),
        }
    }
}

impl Default for Rest {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Generate a JSON schema for the configuration.
pub(crate) fn generate_config_schema() -> RootSchema {
    let settings = SchemaSettings::draft07().with(|s| {
        s.option_nullable = true;
        s.option_add_null_type = false;
        s.inline_subschemas = true;
    });
    settings.into_generator().into_root_schema_for::<Configuration>()
}

/// Parse and validate configuration YAML.
///
/// An empty document is the default configuration.
pub(crate) fn validate_configuration(raw_yaml: &str) -> Result<Configuration, ConfigurationError> {
    if raw_yaml.trim().is_empty() {
        return Ok(Configuration::default());
    }
    let configuration: Configuration =
        serde_yaml::from_str(raw_yaml).map_err(|e| ConfigurationError::InvalidConfiguration {
            message: "failed to parse configuration",
            error: e.to_string(),
        })?;

    if !configuration.server.graphql_path.starts_with('/') {
        return Err(ConfigurationError::InvalidConfiguration {
            message: "invalid 'server.graphql_path'",
            error: format!(
                "'{}' must start with '/'",
                configuration.server.graphql_path
            ),
        });
    }
    if configuration.server.health_check_path == configuration.server.graphql_path {
        return Err(ConfigurationError::InvalidConfiguration {
            message: "invalid 'server.health_check_path'",
            error: "it must differ from 'server.graphql_path'".to_string(),
        });
    }
    if configuration.execution.max_depth == 0 {
        return Err(ConfigurationError::InvalidConfiguration {
            message: "invalid 'execution.max_depth'",
            error: "it must be at least 1".to_string(),
        });
    }
    Ok(configuration)
}
