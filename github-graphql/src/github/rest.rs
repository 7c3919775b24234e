//! A data source backed by the GitHub REST API.

use std::time::Duration;

use async_trait::async_trait;
use http::StatusCode;
use http::header::ACCEPT;
use serde_json::json;
use url::Url;

use super::data::GithubDataSource;
use crate::error::ConfigurationError;
use crate::error::DataSourceError;
use crate::json_ext::Value;

const SERVICE: &str = "github";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Calls `/search/topics`, `/users/{login}` and `/repos/{owner}/{name}`, and
/// maps GitHub's snake_case payloads to the schema's field names.
#[derive(Debug, Clone)]
pub struct RestDataSource {
    client: reqwest::Client,
    endpoint: Url,
    token: Option<String>,
}

#[buildstructor::buildstructor]
impl RestDataSource {
    #[builder(visibility = "pub")]
    fn new(
        endpoint: Url,
        token: Option<String>,
        timeout: Option<Duration>,
    ) -> Result<Self, ConfigurationError> {
        let client = reqwest::Client::builder()
            .timeout(timeout.unwrap_or(DEFAULT_TIMEOUT))
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ConfigurationError::InvalidConfiguration {
                message: "failed to create the GitHub client",
                error: e.to_string(),
            })?;
        if endpoint.cannot_be_a_base() {
            return Err(ConfigurationError::InvalidConfiguration {
                message: "invalid GitHub endpoint",
                error: format!("'{endpoint}' cannot be a base URL"),
            });
        }
        Ok(Self {
            client,
            endpoint,
            token,
        })
    }

    fn url(&self, segments: &[&str]) -> Result<Url, DataSourceError> {
        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|_| DataSourceError::Fetch {
                service: SERVICE.to_string(),
                reason: format!("'{}' cannot be a base URL", self.endpoint),
                status: None,
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn fetch(&self, url: Url) -> Result<Option<Value>, DataSourceError> {
        tracing::debug!(%url, "calling GitHub");
        let mut request = self
            .client
            .get(url)
            .header(ACCEPT, "application/vnd.github+json");
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        let response = request.send().await.map_err(|e| DataSourceError::Fetch {
            service: SERVICE.to_string(),
            reason: e.to_string(),
            status: None,
        })?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let body: Value = response.json().await.unwrap_or_default();
            let message = body
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("no message");
            tracing::warn!(%status, message, "GitHub request failed");
            return Err(DataSourceError::Fetch {
                service: SERVICE.to_string(),
                reason: format!("{status}: {message}"),
                status: Some(status.as_u16()),
            });
        }
        response
            .json()
            .await
            .map(Some)
            .map_err(|e| malformed(e.to_string()))
    }
}

#[async_trait]
impl GithubDataSource for RestDataSource {
    async fn get_topic(&self, name: &str) -> Result<Option<Value>, DataSourceError> {
        let mut url = self.url(&["search", "topics"])?;
        url.query_pairs_mut().append_pair("q", name);
        let Some(results) = self.fetch(url).await? else {
            return Ok(None);
        };
        let items = results
            .get("items")
            .and_then(Value::as_array)
            .ok_or_else(|| malformed("topic search results have no items"))?;
        // Search is fuzzy, only an exact name is a match
        items
            .iter()
            .find(|item| {
                item.get("name")
                    .and_then(Value::as_str)
                    .is_some_and(|item_name| item_name.eq_ignore_ascii_case(name))
            })
            .map(map_topic)
            .transpose()
    }

    async fn get_repository_owner(&self, login: &str) -> Result<Option<Value>, DataSourceError> {
        self.fetch(self.url(&["users", login])?)
            .await?
            .as_ref()
            .map(map_owner)
            .transpose()
    }

    async fn get_repository(
        &self,
        owner: &str,
        name: &str,
    ) -> Result<Option<Value>, DataSourceError> {
        self.fetch(self.url(&["repos", owner, name])?)
            .await?
            .as_ref()
            .map(map_repository)
            .transpose()
    }

    async fn get_uniform_resource_locatable(
        &self,
        url: &Url,
    ) -> Result<Option<Value>, DataSourceError> {
        if url.host_str() != Some("github.com") {
            return Ok(None);
        }
        let segments: Vec<&str> = url
            .path_segments()
            .map(|segments| segments.filter(|segment| !segment.is_empty()).collect())
            .unwrap_or_default();
        match segments.as_slice() {
            [login] => self.get_repository_owner(login).await,
            [owner, name] => self.get_repository(owner, name).await,
            _ => Ok(None),
        }
    }
}

fn malformed(reason: impl Into<String>) -> DataSourceError {
    DataSourceError::Malformed {
        service: SERVICE.to_string(),
        reason: reason.into(),
    }
}

fn string<'v>(payload: &'v Value, property: &str) -> Result<&'v str, DataSourceError> {
    payload
        .get(property)
        .and_then(Value::as_str)
        .ok_or_else(|| malformed(format!("missing string property '{property}'")))
}

fn optional(payload: &Value, property: &str) -> Value {
    payload.get(property).cloned().unwrap_or_default()
}

fn resource_path(html_url: &str) -> Result<String, DataSourceError> {
    Url::parse(html_url)
        .map(|url| url.path().to_string())
        .map_err(|e| malformed(format!("invalid html_url '{html_url}': {e}")))
}

/// Maps a topic search result.
pub(crate) fn map_topic(payload: &Value) -> Result<Value, DataSourceError> {
    let name = string(payload, "name")?;
    let related: Vec<Value> = payload
        .get("related")
        .and_then(Value::as_array)
        .map(|related| {
            related
                .iter()
                .filter_map(|relation| relation.pointer("/topic_relation/name").cloned())
                .collect()
        })
        .unwrap_or_default();
    Ok(json!({
        "type": "Topic",
        // Search results have no node id
        "id": format!("topic:{name}"),
        "name": name,
        "shortDescription": optional(payload, "short_description"),
        "relatedTopics": related,
    }))
}

/// Maps a `/users/{login}` payload, which describes organizations as well.
///
/// Other account types (`Bot`) keep their tag and fail type resolution.
pub(crate) fn map_owner(payload: &Value) -> Result<Value, DataSourceError> {
    let html_url = string(payload, "html_url")?;
    let type_name = string(payload, "type")?;
    let mut owner = json!({
        "type": type_name,
        "id": string(payload, "node_id")?,
        "login": string(payload, "login")?,
        "name": optional(payload, "name"),
        "avatarUrl": string(payload, "avatar_url")?,
        "resourcePath": resource_path(html_url)?,
        "url": html_url,
    });
    if let Some(owner) = owner.as_object_mut() {
        if type_name == "Organization" {
            owner.insert("description".to_string(), optional(payload, "description"));
        } else {
            owner.insert("bio".to_string(), optional(payload, "bio"));
            owner.insert("company".to_string(), optional(payload, "company"));
        }
    }
    Ok(owner)
}

/// Maps a `/repos/{owner}/{name}` payload.
pub(crate) fn map_repository(payload: &Value) -> Result<Value, DataSourceError> {
    let html_url = string(payload, "html_url")?;
    let owner = payload
        .get("owner")
        .ok_or_else(|| malformed("missing property 'owner'"))?;
    let count = |property: &str| {
        payload
            .get(property)
            .and_then(Value::as_i64)
            .ok_or_else(|| malformed(format!("missing integer property '{property}'")))
    };
    let flag = |property: &str| payload.get(property).and_then(Value::as_bool).unwrap_or(false);
    Ok(json!({
        "type": "Repository",
        "id": string(payload, "node_id")?,
        "name": string(payload, "name")?,
        "nameWithOwner": string(payload, "full_name")?,
        "description": optional(payload, "description"),
        "owner": map_owner(owner)?,
        "isPrivate": flag("private"),
        "isFork": flag("fork"),
        "stargazerCount": count("stargazers_count")?,
        "forkCount": count("forks_count")?,
        "topics": optional(payload, "topics"),
        "resourcePath": resource_path(html_url)?,
        "url": html_url,
    }))
}
