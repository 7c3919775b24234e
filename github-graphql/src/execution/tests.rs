use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use serde_json::json;

use super::*;
use crate::github;
use crate::github::MockGithubDataSource;
use crate::spec::ObjectType;

fn executor(schema: Schema) -> Executor {
    Executor::builder().schema(Arc::new(schema)).build()
}

fn github_executor(data_source: impl github::GithubDataSource) -> Executor {
    executor(github::schema(Arc::new(data_source)).unwrap())
}

fn fixture_executor() -> Executor {
    executor(github::test_schema())
}

async fn execute(executor: &Executor, query: &str) -> Value {
    let request = Request::builder().query(query).build();
    serde_json::to_value(executor.execute(&request).await).unwrap()
}

/// `(path, code)` of every error, in order.
fn error_paths(response: &Value) -> Vec<(Value, Value)> {
    response["errors"]
        .as_array()
        .map(|errors| {
            errors
                .iter()
                .map(|error| (error["path"].clone(), error["extensions"]["code"].clone()))
                .collect()
        })
        .unwrap_or_default()
}

struct Constant(Option<Value>);

#[async_trait]
impl Resolver for Constant {
    async fn resolve(&self, _context: ResolverContext<'_>) -> Result<Option<Value>, DataSourceError> {
        Ok(self.0.clone())
    }
}

struct Slow;

#[async_trait]
impl Resolver for Slow {
    async fn resolve(&self, _context: ResolverContext<'_>) -> Result<Option<Value>, DataSourceError> {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok(Some(json!("late")))
    }
}

fn string_field(name: &str, ty: FieldType) -> FieldDefinition {
    FieldDefinition::builder().name(name).ty(ty).build()
}

/// A schema whose root fields are plain strings.
fn strings_schema() -> Schema {
    let mut builder = Schema::builder();
    builder
        .register_type(
            ObjectType::builder()
                .name("Query")
                .field(string_field("viewer", FieldType::named("String").non_null()))
                .field(string_field("slow", FieldType::named("String")))
                .field(string_field("greeting", FieldType::named("String")))
                .build(),
        )
        .unwrap()
        .bind_resolver("Query", "viewer", Arc::new(Constant(None)))
        .unwrap()
        .bind_resolver("Query", "slow", Arc::new(Slow))
        .unwrap()
        .bind_resolver("Query", "greeting", Arc::new(Constant(Some(json!("hello")))))
        .unwrap();
    builder.build().unwrap()
}

#[tokio::test]
async fn it_serializes_the_selected_topic_fields() {
    let mut data_source = MockGithubDataSource::new();
    data_source
        .expect_get_topic()
        .withf(|name| name == "GraphQL")
        .times(1)
        .returning(|_| {
            Ok(Some(json!({
                "type": "Topic",
                "id": "t1",
                "name": "GraphQL",
                "relatedTopics": []
            })))
        });

    let response = execute(
        &github_executor(data_source),
        r#"{ topic(name: "GraphQL") { id name } }"#,
    )
    .await;
    assert_eq!(
        response,
        json!({ "data": { "topic": { "id": "t1", "name": "GraphQL" } } })
    );
}

#[tokio::test]
async fn a_missing_owner_is_null_without_error() {
    let mut data_source = MockGithubDataSource::new();
    data_source
        .expect_get_repository_owner()
        .returning(|_| Ok(None));

    let response = execute(
        &github_executor(data_source),
        r#"{ repositoryOwner(login: "foo") { login } }"#,
    )
    .await;
    assert_eq!(response, json!({ "data": { "repositoryOwner": null } }));
}

#[tokio::test]
async fn an_unknown_discriminator_nulls_the_field() {
    let mut data_source = MockGithubDataSource::new();
    data_source.expect_get_repository_owner().returning(|_| {
        Ok(Some(json!({
            "type": "Bot",
            "id": "b1",
            "login": "dependabot",
        })))
    });

    let response = execute(
        &github_executor(data_source),
        r#"{ repositoryOwner(login: "dependabot") { login } }"#,
    )
    .await;
    assert_eq!(response["data"], json!({ "repositoryOwner": null }));
    assert_eq!(
        error_paths(&response),
        vec![(json!(["repositoryOwner"]), json!("UNRESOLVABLE_TYPE"))]
    );
    assert_eq!(
        response["errors"][0]["locations"],
        json!([{ "line": 1, "column": 3 }])
    );
}

#[tokio::test]
async fn interfaces_resolve_to_the_tagged_object_type() {
    let response = execute(
        &fixture_executor(),
        r#"{
            user: repositoryOwner(login: "octocat") { __typename login ... on User { company } }
            org: repositoryOwner(login: "graphql") { __typename ... on Organization { description } }
            resource(url: "https://github.com/graphql/graphql-js") {
                __typename
                url
                ... on Repository { owner { login } }
            }
        }"#,
    )
    .await;
    assert_eq!(
        response,
        json!({
            "data": {
                "user": { "__typename": "User", "login": "octocat", "company": "@github" },
                "org": { "__typename": "Organization", "description": "GraphQL Foundation" },
                "resource": {
                    "__typename": "Repository",
                    "url": "https://github.com/graphql/graphql-js",
                    "owner": { "login": "graphql" }
                }
            }
        })
    );
}

#[tokio::test]
async fn cyclic_topics_are_bounded_by_the_selection() {
    let response = execute(
        &fixture_executor(),
        r#"{ topic(name: "graphql") { name relatedTopics { name relatedTopics { name } } } }"#,
    )
    .await;
    assert_eq!(
        response,
        json!({
            "data": {
                "topic": {
                    "name": "graphql",
                    "relatedTopics": [
                        { "name": "rust", "relatedTopics": [{ "name": "graphql" }] },
                        { "name": "javascript", "relatedTopics": [] }
                    ]
                }
            }
        })
    );
}

#[tokio::test]
async fn null_bubbles_to_the_nearest_nullable_field() {
    let mut data_source = MockGithubDataSource::new();
    data_source.expect_get_topic().returning(|_| {
        Ok(Some(json!({
            "type": "Topic",
            "id": "t1",
            "name": "rust",
            "relatedTopics": [{ "type": "Topic", "id": "t2", "name": "cargo" }, { "type": "Topic", "id": "t3" }]
        })))
    });

    let response = execute(
        &github_executor(data_source),
        r#"{ topic(name: "rust") { id relatedTopics { id name } } }"#,
    )
    .await;
    assert_eq!(response["data"], json!({ "topic": null }));
    assert_eq!(
        error_paths(&response),
        vec![(json!(["topic", "relatedTopics", 1, "name"]), json!("NON_NULL_VIOLATION"))]
    );
    assert_eq!(
        response["errors"][0]["message"],
        "Cannot return null for non-nullable field Topic.name."
    );
}

#[tokio::test]
async fn a_non_null_root_failure_nulls_data() {
    let executor = executor(strings_schema());
    let response = execute(&executor, "{ greeting viewer }").await;
    assert_eq!(response["data"], Value::Null);
    assert_eq!(
        error_paths(&response),
        vec![(json!(["viewer"]), json!("NON_NULL_VIOLATION"))]
    );
}

#[tokio::test]
async fn data_source_failures_are_field_errors() {
    let mut data_source = MockGithubDataSource::new();
    data_source.expect_get_topic().returning(|_| {
        Err(DataSourceError::Fetch {
            service: "github".to_string(),
            reason: "connection refused".to_string(),
            status: None,
        })
    });
    data_source.expect_get_repository_owner().returning(|login| {
        Ok(Some(json!({
            "type": "User",
            "id": "u1",
            "login": login,
            "avatarUrl": "https://avatars.githubusercontent.com/u/1",
            "resourcePath": format!("/{login}"),
            "url": format!("https://github.com/{login}"),
        })))
    });

    let response = execute(
        &github_executor(data_source),
        r#"{ topic(name: "rust") { id } repositoryOwner(login: "octocat") { login url } }"#,
    )
    .await;
    assert_eq!(
        response["data"],
        json!({
            "topic": null,
            "repositoryOwner": { "login": "octocat", "url": "https://github.com/octocat" }
        })
    );
    assert_eq!(
        response["errors"],
        json!([{
            "message": "fetch from 'github' failed: connection refused",
            "locations": [{ "line": 1, "column": 3 }],
            "path": ["topic"],
            "extensions": { "code": "DATA_SOURCE_FETCH_FAILED" }
        }])
    );
}

#[tokio::test]
async fn values_are_checked_against_their_types() {
    let mut data_source = MockGithubDataSource::new();
    data_source.expect_get_repository().returning(|owner, name| {
        Ok(Some(json!({
            "type": "Repository",
            "id": "r1",
            "name": name,
            "nameWithOwner": format!("{owner}/{name}"),
            "stargazerCount": "many",
            "topics": "graphql",
        })))
    });
    let executor = github_executor(data_source);

    let response = execute(
        &executor,
        r#"{ repository(owner: "graphql", name: "graphql-js") { name stargazerCount } }"#,
    )
    .await;
    assert_eq!(response["data"], json!({ "repository": null }));
    assert_eq!(
        error_paths(&response),
        vec![(json!(["repository", "stargazerCount"]), json!("SERIALIZATION_FAILED"))]
    );

    let response = execute(
        &executor,
        r#"{ repository(owner: "graphql", name: "graphql-js") { topics { name } } }"#,
    )
    .await;
    assert_eq!(response["data"], json!({ "repository": null }));
    assert_eq!(
        error_paths(&response),
        vec![(json!(["repository", "topics"]), json!("RESPONSE_VALIDATION_FAILED"))]
    );
}

#[tokio::test]
async fn errors_keep_selection_order() {
    let mut data_source = MockGithubDataSource::new();
    data_source.expect_get_topic().returning(|name| {
        Err(DataSourceError::Malformed {
            service: "github".to_string(),
            reason: name.to_string(),
        })
    });

    let response = execute(
        &github_executor(data_source),
        r#"{ c: topic(name: "c") { id } a: topic(name: "a") { id } b: topic(name: "b") { id } }"#,
    )
    .await;
    assert_eq!(
        response["data"],
        json!({ "c": null, "a": null, "b": null })
    );
    let paths: Vec<Value> = error_paths(&response).into_iter().map(|(path, _)| path).collect();
    assert_eq!(paths, vec![json!(["c"]), json!(["a"]), json!(["b"])]);
}

#[tokio::test]
async fn fragments_aliases_and_directives() {
    let request = Request::builder()
        .query(
            r#"query Owner($withLogin: Boolean!, $skipBio: Boolean = true) {
                first: repositoryOwner(login: "octocat") {
                    ...owner
                    login @include(if: $withLogin)
                    ... on User { bio @skip(if: $skipBio) name }
                }
                second: topic(name: "rust") { ...node name @skip(if: true) }
            }
            fragment owner on RepositoryOwner { ...node avatarUrl }
            fragment node on Node { id __typename }"#,
        )
        .variable("withLogin", false)
        .build();
    let response = fixture_executor().execute(&request).await;
    assert_eq!(
        serde_json::to_value(response).unwrap(),
        json!({
            "data": {
                "first": {
                    "id": "MDQ6VXNlcjU4MzIzMQ==",
                    "__typename": "User",
                    "avatarUrl": "https://avatars.githubusercontent.com/u/583231",
                    "name": "The Octocat"
                },
                "second": { "id": "MDU6VG9waWNydXN0", "__typename": "Topic" }
            }
        })
    );
}

#[tokio::test]
async fn duplicate_response_keys_merge_their_selections() {
    let response = execute(
        &fixture_executor(),
        r#"{ topic(name: "rust") { name } topic(name: "rust") { id relatedTopics { name } } }"#,
    )
    .await;
    assert_eq!(
        response,
        json!({
            "data": {
                "topic": {
                    "name": "rust",
                    "id": "MDU6VG9waWNydXN0",
                    "relatedTopics": [{ "name": "graphql" }]
                }
            }
        })
    );
}

#[tokio::test]
async fn slow_resolvers_time_out() {
    let executor = Executor::builder()
        .schema(Arc::new(strings_schema()))
        .resolver_timeout(Duration::from_millis(10))
        .build();
    let response = execute(&executor, "{ greeting slow }").await;
    assert_eq!(response["data"], json!({ "greeting": "hello", "slow": null }));
    assert_eq!(
        response["errors"][0]["message"],
        "resolver for 'Query.slow' timed out after 10ms"
    );
    assert_eq!(
        error_paths(&response),
        vec![(json!(["slow"]), json!("DATA_SOURCE_TIMEOUT"))]
    );
}

#[tokio::test]
async fn introspection_lists_the_fields_of_a_type() {
    let response = execute(
        &fixture_executor(),
        r#"{
            __type(name: "Topic") {
                kind
                name
                interfaces { name }
                fields { name type { kind name ofType { kind name ofType { name } } } }
            }
            missing: __type(name: "Nope") { name }
        }"#,
    )
    .await;
    assert_eq!(
        response,
        json!({
            "data": {
                "__type": {
                    "kind": "OBJECT",
                    "name": "Topic",
                    "interfaces": [{ "name": "Node" }],
                    "fields": [
                        { "name": "id", "type": { "kind": "NON_NULL", "name": null, "ofType": { "kind": "SCALAR", "name": "ID", "ofType": null } } },
                        { "name": "name", "type": { "kind": "NON_NULL", "name": null, "ofType": { "kind": "SCALAR", "name": "String", "ofType": null } } },
                        { "name": "shortDescription", "type": { "kind": "SCALAR", "name": "String", "ofType": null } },
                        { "name": "relatedTopics", "type": { "kind": "NON_NULL", "name": null, "ofType": { "kind": "LIST", "name": null, "ofType": { "name": null } } } }
                    ]
                },
                "missing": null
            }
        })
    );
}

#[tokio::test]
async fn introspection_of_the_schema() {
    let response = execute(
        &fixture_executor(),
        r#"{
            __schema {
                queryType { name fields { name args { name defaultValue type { ofType { name } } } } }
                mutationType { name }
                directives { name }
            }
            possible: __type(name: "RepositoryOwner") { possibleTypes { name } }
            uri: __type(name: "URI") { specifiedByURL }
        }"#,
    )
    .await;
    let schema = &response["data"]["__schema"];
    assert_eq!(schema["mutationType"], Value::Null);
    assert_eq!(schema["queryType"]["fields"][0]["name"], "topic");
    assert_eq!(
        schema["queryType"]["fields"][2]["args"],
        json!([
            { "name": "owner", "defaultValue": null, "type": { "ofType": { "name": "String" } } },
            { "name": "name", "defaultValue": null, "type": { "ofType": { "name": "String" } } }
        ])
    );
    assert_eq!(
        schema["directives"],
        json!([{ "name": "include" }, { "name": "skip" }, { "name": "specifiedBy" }])
    );
    assert_eq!(
        response["data"]["possible"]["possibleTypes"],
        json!([{ "name": "User" }, { "name": "Organization" }])
    );
    assert_eq!(
        response["data"]["uri"]["specifiedByURL"],
        "https://tools.ietf.org/html/rfc3986"
    );
}

#[tokio::test]
async fn requests_rejected_before_execution_have_no_data() {
    let executor = fixture_executor();
    let response = executor.execute(&Request::default()).await;
    assert!(!response.is_executed());
    assert_eq!(
        response.errors[0].extension_code().as_deref(),
        Some("MISSING_QUERY_STRING")
    );

    let response = execute(&executor, "{ topic(name: ").await;
    assert_eq!(response.get("data"), None);
    assert_eq!(
        response["errors"][0]["extensions"]["code"],
        "GRAPHQL_PARSING_FAILED"
    );

    let response = execute(&executor, "query($name: String!) { topic(name: $name) { id } }").await;
    assert_eq!(response.get("data"), None);
    assert_eq!(
        response["errors"][0]["extensions"]["code"],
        "VALIDATION_INVALID_TYPE_VARIABLE"
    );
}

#[tokio::test]
async fn resolve_root_field_validates_arguments() {
    let executor = fixture_executor();

    let topic = executor
        .resolve_root_field("topic", json!({ "name": "rust" }).as_object().unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(topic["name"], "rust");

    let error = executor
        .resolve_root_field("repository", json!({ "owner": "graphql" }).as_object().unwrap())
        .await
        .unwrap_err();
    assert_eq!(
        error.to_string(),
        r#"Field "Query.repository" argument "name" of type "String!" is required, but it was not provided."#
    );

    let error = executor
        .resolve_root_field(
            "topic",
            json!({ "name": "rust", "first": 1 }).as_object().unwrap(),
        )
        .await
        .unwrap_err();
    assert!(matches!(
        error,
        FieldError::ArgumentValidation(ArgumentValidationError::Unknown { .. })
    ));

    let error = executor
        .resolve_root_field("resource", json!({ "url": "::" }).as_object().unwrap())
        .await
        .unwrap_err();
    assert!(matches!(
        error,
        FieldError::ArgumentValidation(ArgumentValidationError::Invalid { .. })
    ));

    let error = executor
        .resolve_root_field("viewer", &Object::new())
        .await
        .unwrap_err();
    assert!(matches!(error, FieldError::UnknownField { .. }));
}

#[tokio::test]
async fn variables_feed_arguments() {
    let request = Request::builder()
        .query("query($url: URI!) { resource(url: $url) { resourcePath } }")
        .variable("url", "https://github.com/octocat/Hello-World")
        .build();
    let response = fixture_executor().execute(&request).await;
    assert_eq!(
        response.data,
        Some(json!({ "resource": { "resourcePath": "/octocat/Hello-World" } }))
    );
}
