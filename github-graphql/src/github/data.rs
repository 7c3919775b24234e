//! The data-source contract and the fixture-backed implementation.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use serde::Deserialize;
use url::Url;

use crate::error::ConfigurationError;
use crate::error::DataSourceError;
use crate::json_ext::Object;
use crate::json_ext::Value;
use crate::spec::DISCRIMINATOR;

pub(crate) const GITHUB_URL: &str = "https://github.com";

/// Fetches GitHub records, one operation per root field.
///
/// Every returned object carries a `type` property naming its object type.
/// `Ok(None)` means the record does not exist.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GithubDataSource: Send + Sync + 'static {
    async fn get_topic(&self, name: &str) -> Result<Option<Value>, DataSourceError>;

    async fn get_repository_owner(&self, login: &str) -> Result<Option<Value>, DataSourceError>;

    async fn get_repository(
        &self,
        owner: &str,
        name: &str,
    ) -> Result<Option<Value>, DataSourceError>;

    async fn get_uniform_resource_locatable(
        &self,
        url: &Url,
    ) -> Result<Option<Value>, DataSourceError>;
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct Fixtures {
    topics: Vec<Object>,
    users: Vec<Object>,
    organizations: Vec<Object>,
    repositories: Vec<Object>,
}

/// Serves records loaded from a YAML (or JSON) file.
///
/// ```yaml
/// topics:
///   - id: T_graphql
///     name: graphql
///     relatedTopics: [rust]
/// users:
///   - id: U_octocat
///     login: octocat
///     avatarUrl: https://avatars.githubusercontent.com/u/583231
/// repositories:
///   - id: R_hello
///     owner: octocat
///     name: Hello-World
/// ```
///
/// Resource paths and URLs are derived when missing, repository owners are
/// embedded, and lookups ignore case.
#[derive(Debug, Default, Clone)]
pub struct FixtureDataSource {
    topics: HashMap<String, Value>,
    owners: HashMap<String, Value>,
    repositories: HashMap<(String, String), Value>,
    resources: HashMap<String, Value>,
}

impl FixtureDataSource {
    pub fn from_path(path: &Path) -> Result<Self, ConfigurationError> {
        let content =
            std::fs::read_to_string(path).map_err(|error| ConfigurationError::CannotReadFile {
                path: path.to_path_buf(),
                error,
            })?;
        let source = Self::from_yaml(&content)?;
        tracing::info!(
            path = %path.display(),
            topics = source.topics.len(),
            owners = source.owners.len(),
            repositories = source.repositories.len(),
            "loaded fixtures"
        );
        Ok(source)
    }

    pub fn from_yaml(content: &str) -> Result<Self, ConfigurationError> {
        let fixtures: Fixtures =
            serde_yaml::from_str(content).map_err(|e| ConfigurationError::InvalidConfiguration {
                message: "failed to parse fixtures",
                error: e.to_string(),
            })?;

        let mut source = FixtureDataSource::default();
        for topic in fixtures.topics {
            let mut topic = tag(topic, "Topic");
            let name = required_str(&topic, "topic", "name")?;
            required_str(&topic, "topic", "id")?;
            topic
                .entry("relatedTopics")
                .or_insert_with(|| Value::Array(Vec::new()));
            source
                .topics
                .insert(name.to_lowercase(), Value::Object(topic));
        }
        for (kind, type_name, owners) in [
            ("user", "User", fixtures.users),
            ("organization", "Organization", fixtures.organizations),
        ] {
            for owner in owners {
                let mut owner = tag(owner, type_name);
                let login = required_str(&owner, kind, "login")?;
                required_str(&owner, kind, "id")?;
                required_str(&owner, kind, "avatarUrl")?;
                derive_locations(&mut owner, &format!("/{login}"));
                source.insert_resource(&owner, kind)?;
                source
                    .owners
                    .insert(login.to_lowercase(), Value::Object(owner));
            }
        }
        for repository in fixtures.repositories {
            let mut repository = tag(repository, "Repository");
            let name = required_str(&repository, "repository", "name")?;
            required_str(&repository, "repository", "id")?;
            let owner_login = required_str(&repository, "repository", "owner")?;
            let owner = source
                .owners
                .get(&owner_login.to_lowercase())
                .cloned()
                .ok_or_else(|| ConfigurationError::InvalidFixture {
                    kind: "repository",
                    reason: format!("owner '{owner_login}' of '{name}' is not a user or organization"),
                })?;
            let owner_login = owner
                .get("login")
                .and_then(Value::as_str)
                .unwrap_or(owner_login.as_str())
                .to_string();

            repository.insert("owner".to_string(), owner);
            repository
                .entry("nameWithOwner")
                .or_insert_with(|| Value::String(format!("{owner_login}/{name}")));
            for flag in ["isPrivate", "isFork"] {
                repository.entry(flag).or_insert(Value::Bool(false));
            }
            for count in ["stargazerCount", "forkCount"] {
                repository.entry(count).or_insert_with(|| Value::from(0));
            }
            repository
                .entry("topics")
                .or_insert_with(|| Value::Array(Vec::new()));
            derive_locations(&mut repository, &format!("/{owner_login}/{name}"));
            source.insert_resource(&repository, "repository")?;
            source.repositories.insert(
                (owner_login.to_lowercase(), name.to_lowercase()),
                Value::Object(repository),
            );
        }
        Ok(source)
    }

    fn insert_resource(&mut self, record: &Object, kind: &'static str) -> Result<(), ConfigurationError> {
        let url = required_str(record, kind, "url")?;
        let url = Url::parse(&url).map_err(|e| ConfigurationError::InvalidFixture {
            kind,
            reason: format!("'{url}' is not a valid url: {e}"),
        })?;
        self.resources
            .insert(resource_key(&url), Value::Object(record.clone()));
        Ok(())
    }
}

fn tag(mut record: Object, type_name: &str) -> Object {
    record.insert(DISCRIMINATOR.to_string(), Value::String(type_name.to_string()));
    record
}

fn required_str(
    record: &Object,
    kind: &'static str,
    property: &str,
) -> Result<String, ConfigurationError> {
    record
        .get(property)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| ConfigurationError::InvalidFixture {
            kind,
            reason: format!("missing string property '{property}' in {}", Value::Object(record.clone())),
        })
}

fn derive_locations(record: &mut Object, resource_path: &str) {
    record
        .entry("resourcePath")
        .or_insert_with(|| Value::String(resource_path.to_string()));
    record
        .entry("url")
        .or_insert_with(|| Value::String(format!("{GITHUB_URL}{resource_path}")));
}

/// GitHub paths are case insensitive and ignore a trailing slash.
fn resource_key(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default();
    format!("{host}{}", url.path().trim_end_matches('/')).to_lowercase()
}

#[async_trait]
impl GithubDataSource for FixtureDataSource {
    async fn get_topic(&self, name: &str) -> Result<Option<Value>, DataSourceError> {
        Ok(self.topics.get(&name.to_lowercase()).cloned())
    }

    async fn get_repository_owner(&self, login: &str) -> Result<Option<Value>, DataSourceError> {
        Ok(self.owners.get(&login.to_lowercase()).cloned())
    }

    async fn get_repository(
        &self,
        owner: &str,
        name: &str,
    ) -> Result<Option<Value>, DataSourceError> {
        Ok(self
            .repositories
            .get(&(owner.to_lowercase(), name.to_lowercase()))
            .cloned())
    }

    async fn get_uniform_resource_locatable(
        &self,
        url: &Url,
    ) -> Result<Option<Value>, DataSourceError> {
        Ok(self.resources.get(&resource_key(url)).cloned())
    }
}
