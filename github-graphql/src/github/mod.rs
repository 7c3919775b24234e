//! The GitHub schema: types, interfaces and root fields bound to a [`GithubDataSource`].

mod data;
mod rest;

use std::sync::Arc;

use async_trait::async_trait;
pub use data::FixtureDataSource;
pub use data::GithubDataSource;
#[cfg(test)]
pub(crate) use data::MockGithubDataSource;
use futures::future::join_all;
pub use rest::RestDataSource;
use url::Url;

use crate::error::DataSourceError;
use crate::error::SchemaError;
use crate::execution::Resolver;
use crate::execution::ResolverContext;
use crate::json_ext::Value;
use crate::spec::ArgumentDefinition;
use crate::spec::FieldDefinition;
use crate::spec::FieldType;
use crate::spec::InterfaceType;
use crate::spec::ObjectType;
use crate::spec::QUERY_TYPE;
use crate::spec::ScalarType;
use crate::spec::Schema;
use crate::spec::UriCodec;

fn field(name: &str, ty: FieldType, description: &str) -> FieldDefinition {
    FieldDefinition::builder()
        .name(name)
        .ty(ty)
        .description(description)
        .build()
}

fn non_null(name: &str) -> FieldType {
    FieldType::named(name).non_null()
}

fn required_argument(name: &str, ty: &str, description: &str) -> ArgumentDefinition {
    ArgumentDefinition::builder()
        .name(name)
        .ty(non_null(ty))
        .description(description)
        .build()
}

fn id_field() -> FieldDefinition {
    field("id", non_null("ID"), "The id of the node.")
}

fn resource_path_field() -> FieldDefinition {
    field("resourcePath", non_null("URI"), "The HTML path to this resource.")
}

fn url_field() -> FieldDefinition {
    field("url", non_null("URI"), "The URL to this resource.")
}

fn login_field() -> FieldDefinition {
    field("login", non_null("String"), "The username used to login.")
}

fn avatar_url_field() -> FieldDefinition {
    field(
        "avatarUrl",
        non_null("URI"),
        "A URL pointing to the owner's public avatar.",
    )
}

fn uri() -> ScalarType {
    ScalarType::new("URI", UriCodec)
        .description("An RFC 3986 compliant URI string.")
        .specified_by_url("https://tools.ietf.org/html/rfc3986")
}

fn node() -> InterfaceType {
    InterfaceType::builder()
        .name("Node")
        .description("A node in the Github hierarchy")
        .field(id_field())
        .build()
}

fn uniform_resource_locatable() -> InterfaceType {
    InterfaceType::builder()
        .name("UniformResourceLocatable")
        .description("Represents a type that can be retrieved by a URL.")
        .field(resource_path_field())
        .field(url_field())
        .build()
}

fn repository_owner() -> InterfaceType {
    InterfaceType::builder()
        .name("RepositoryOwner")
        .description("Represents an owner of a Repository.")
        .field(id_field())
        .field(login_field())
        .field(avatar_url_field())
        .field(resource_path_field())
        .field(url_field())
        .build()
}

fn topic() -> ObjectType {
    ObjectType::builder()
        .name("Topic")
        .description("A Topic in the Github world.")
        .interface("Node")
        .field(id_field())
        .field(field("name", non_null("String"), "The name of the topic."))
        .field(field(
            "shortDescription",
            FieldType::named("String"),
            "A short description of the topic.",
        ))
        .field(field(
            "relatedTopics",
            non_null("Topic").list().non_null(),
            "Topics related to this one.",
        ))
        .build()
}

fn user() -> ObjectType {
    ObjectType::builder()
        .name("User")
        .description("A user is an individual's account on GitHub.")
        .interface("Node")
        .interface("RepositoryOwner")
        .interface("UniformResourceLocatable")
        .field(id_field())
        .field(login_field())
        .field(field("name", FieldType::named("String"), "The user's public profile name."))
        .field(field("bio", FieldType::named("String"), "The user's public profile bio."))
        .field(field(
            "company",
            FieldType::named("String"),
            "The user's public profile company.",
        ))
        .field(avatar_url_field())
        .field(resource_path_field())
        .field(url_field())
        .build()
}

fn organization() -> ObjectType {
    ObjectType::builder()
        .name("Organization")
        .description("An account on GitHub, with one or more owners, that has repositories.")
        .interface("Node")
        .interface("RepositoryOwner")
        .interface("UniformResourceLocatable")
        .field(id_field())
        .field(login_field())
        .field(field(
            "name",
            FieldType::named("String"),
            "The organization's public profile name.",
        ))
        .field(field(
            "description",
            FieldType::named("String"),
            "The organization's public profile description.",
        ))
        .field(avatar_url_field())
        .field(resource_path_field())
        .field(url_field())
        .build()
}

fn repository() -> ObjectType {
    ObjectType::builder()
        .name("Repository")
        .description("A repository contains the content for a project.")
        .interface("Node")
        .interface("UniformResourceLocatable")
        .field(id_field())
        .field(field("name", non_null("String"), "The name of the repository."))
        .field(field(
            "nameWithOwner",
            non_null("String"),
            "The repository's name with owner.",
        ))
        .field(field(
            "description",
            FieldType::named("String"),
            "The description of the repository.",
        ))
        .field(field(
            "owner",
            non_null("RepositoryOwner"),
            "The User owner of the repository.",
        ))
        .field(field("isPrivate", non_null("Boolean"), "Identifies if the repository is private."))
        .field(field("isFork", non_null("Boolean"), "Identifies if the repository is a fork."))
        .field(field(
            "stargazerCount",
            non_null("Int"),
            "Returns a count of how many stargazers there are on this object.",
        ))
        .field(field(
            "forkCount",
            non_null("Int"),
            "Returns how many forks there are of this repository in the whole network.",
        ))
        .field(field(
            "topics",
            non_null("Topic").list().non_null(),
            "The topics the repository is tagged with.",
        ))
        .field(resource_path_field())
        .field(url_field())
        .build()
}

fn query() -> ObjectType {
    ObjectType::builder()
        .name(QUERY_TYPE)
        .field(
            FieldDefinition::builder()
                .name("topic")
                .ty(FieldType::named("Topic"))
                .description("Look up a topic by name.")
                .argument(required_argument("name", "String", "name of the topic"))
                .build(),
        )
        .field(
            FieldDefinition::builder()
                .name("repositoryOwner")
                .ty(FieldType::named("RepositoryOwner"))
                .description("Lookup a repository owner (ie. either a User or an Organization) by login.")
                .argument(required_argument("login", "String", "The username to lookup the owner by."))
                .build(),
        )
        .field(
            FieldDefinition::builder()
                .name("repository")
                .ty(FieldType::named("Repository"))
                .description("Lookup a given repository by the owner and repository name.")
                .argument(required_argument("owner", "String", "The login field of a user or organization"))
                .argument(required_argument("name", "String", "The name of the repository"))
                .build(),
        )
        .field(
            FieldDefinition::builder()
                .name("resource")
                .ty(FieldType::named("UniformResourceLocatable"))
                .description("Lookup resource by a URL.")
                .argument(required_argument("url", "URI", "The URL."))
                .build(),
        )
        .build()
}

/// Builds the GitHub schema with every root field served by `data_source`.
pub fn schema(data_source: Arc<dyn GithubDataSource>) -> Result<Schema, SchemaError> {
    let root: Arc<dyn Resolver> = Arc::new(QueryResolver {
        data_source: data_source.clone(),
    });
    let topics: Arc<dyn Resolver> = Arc::new(TopicsResolver { data_source });

    let mut builder = Schema::builder();
    builder
        .register_type(uri())?
        .register_type(node())?
        .register_type(uniform_resource_locatable())?
        .register_type(repository_owner())?
        .register_type(topic())?
        .register_type(user())?
        .register_type(organization())?
        .register_type(repository())?
        .register_type(query())?;
    for root_field in ["topic", "repositoryOwner", "repository", "resource"] {
        builder.bind_resolver(QUERY_TYPE, root_field, root.clone())?;
    }
    builder
        .bind_resolver("Topic", "relatedTopics", topics.clone())?
        .bind_resolver("Repository", "topics", topics)?;
    builder.build()
}

/// Dispatches root fields to the data source.
struct QueryResolver {
    data_source: Arc<dyn GithubDataSource>,
}

#[async_trait]
impl Resolver for QueryResolver {
    async fn resolve(
        &self,
        context: ResolverContext<'_>,
    ) -> Result<Option<Value>, DataSourceError> {
        match context.field_name {
            "topic" => {
                self.data_source
                    .get_topic(context.string_argument("name")?)
                    .await
            }
            "repositoryOwner" => {
                self.data_source
                    .get_repository_owner(context.string_argument("login")?)
                    .await
            }
            "repository" => {
                self.data_source
                    .get_repository(
                        context.string_argument("owner")?,
                        context.string_argument("name")?,
                    )
                    .await
            }
            "resource" => {
                let url = context.string_argument("url")?;
                let url = Url::parse(url).map_err(|e| DataSourceError::InvalidArguments {
                    field: "Query.resource".to_string(),
                    reason: e.to_string(),
                })?;
                self.data_source.get_uniform_resource_locatable(&url).await
            }
            other => Err(DataSourceError::InvalidArguments {
                field: format!("{QUERY_TYPE}.{other}"),
                reason: "no data source operation serves this field".to_string(),
            }),
        }
    }
}

/// Resolves a list of topics given either as embedded objects or as names.
///
/// Names are fetched concurrently and the ones the data source does not know
/// are dropped. A missing list is empty.
struct TopicsResolver {
    data_source: Arc<dyn GithubDataSource>,
}

#[async_trait]
impl Resolver for TopicsResolver {
    async fn resolve(
        &self,
        context: ResolverContext<'_>,
    ) -> Result<Option<Value>, DataSourceError> {
        let items = match context.parent_property() {
            None | Some(Value::Null) => return Ok(Some(Value::Array(Vec::new()))),
            Some(Value::Array(items)) => items,
            // Left to completion, which reports it
            Some(other) => return Ok(Some(other.clone())),
        };
        let topics = join_all(items.iter().map(|item| async move {
            match item {
                Value::String(name) => self.data_source.get_topic(name).await,
                embedded => Ok(Some(embedded.clone())),
            }
        }))
        .await;

        let mut resolved = Vec::with_capacity(topics.len());
        for topic in topics {
            if let Some(topic) = topic? {
                resolved.push(topic);
            }
        }
        Ok(Some(Value::Array(resolved)))
    }
}

/// The GitHub schema over fixed in-memory data.
#[cfg(test)]
pub(crate) fn test_schema() -> Schema {
    schema(Arc::new(test_data_source())).unwrap()
}

#[cfg(test)]
pub(crate) fn test_data_source() -> FixtureDataSource {
    FixtureDataSource::from_yaml(include_str!("../../tests/fixtures/github.yaml")).unwrap()
}

#[cfg(test)]
mod tests;
