use std::path::Path;
use std::sync::Arc;

use github_graphql::Configuration;
use github_graphql::Executor;
use github_graphql::HttpServerHandle;
use github_graphql::github;
use github_graphql::github::FixtureDataSource;
use pretty_assertions::assert_eq;
use reqwest::StatusCode;
use reqwest::header::ACCEPT;
use reqwest::header::LOCATION;
use serde_json::Value;
use serde_json::json;
use tokio::net::TcpListener;

async fn init(configuration: &str, introspection: bool) -> (HttpServerHandle, reqwest::Client) {
    let configuration: Configuration = configuration.parse().unwrap();
    let fixtures = FixtureDataSource::from_path(
        &Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/github.yaml"),
    )
    .unwrap();
    let schema = github::schema(Arc::new(fixtures)).unwrap();
    let executor = Executor::builder()
        .schema(Arc::new(schema))
        .introspection(introspection)
        .build();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let server = github_graphql::serve(&configuration, executor, Some(listener))
        .await
        .unwrap();
    let client = reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .unwrap();
    (server, client)
}

async fn init_default() -> (HttpServerHandle, reqwest::Client) {
    init(include_str!("fixtures/config.yaml"), true).await
}

fn url(server: &HttpServerHandle, path: &str) -> String {
    format!("http://{}{}", server.listen_address(), path)
}

async fn post(
    server: &HttpServerHandle,
    client: &reqwest::Client,
    body: Value,
) -> (StatusCode, Value) {
    let response = client
        .post(url(server, "/"))
        .json(&body)
        .send()
        .await
        .unwrap();
    let status = response.status();
    (status, response.json().await.unwrap())
}

#[tokio::test]
async fn it_resolves_repositories_with_their_owner_and_topics() {
    let (server, client) = init_default().await;
    let (status, body) = post(
        &server,
        &client,
        json!({
            "query": r#"query Repo($owner: String!, $name: String!) {
                repository(owner: $owner, name: $name) {
                    nameWithOwner
                    owner {
                        __typename
                        login
                        ... on Organization { description }
                    }
                    topics { name }
                }
            }"#,
            "operationName": "Repo",
            "variables": { "owner": "graphql", "name": "graphql-js" }
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({
            "data": {
                "repository": {
                    "nameWithOwner": "graphql/graphql-js",
                    "owner": {
                        "__typename": "Organization",
                        "login": "graphql",
                        "description": "GraphQL Foundation"
                    },
                    "topics": [{ "name": "graphql" }, { "name": "javascript" }]
                }
            }
        })
    );
    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn it_resolves_resources_by_url() {
    let (server, client) = init_default().await;
    let (status, body) = post(
        &server,
        &client,
        json!({
            "query": r#"{
                resource(url: "https://github.com/octocat") {
                    __typename
                    url
                    ... on User { login company }
                }
                missing: resource(url: "https://github.com/nobody") { url }
            }"#
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({
            "data": {
                "resource": {
                    "__typename": "User",
                    "url": "https://github.com/octocat",
                    "login": "octocat",
                    "company": "@github"
                },
                "missing": null
            }
        })
    );
    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn unknown_related_topics_are_dropped() {
    let (server, client) = init_default().await;
    let (_, body) = post(
        &server,
        &client,
        json!({ "query": "{ topic(name: \"GraphQL\") { name relatedTopics { name } } }" }),
    )
    .await;
    assert_eq!(
        body,
        json!({
            "data": {
                "topic": {
                    "name": "graphql",
                    "relatedTopics": [{ "name": "rust" }, { "name": "javascript" }]
                }
            }
        })
    );
    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn invalid_queries_are_rejected_without_data() {
    let (server, client) = init_default().await;
    let (status, body) = post(
        &server,
        &client,
        json!({ "query": "{ topic(name: \"rust\") { stars } }" }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.get("data").is_none());
    assert_eq!(
        body["errors"][0]["extensions"]["code"],
        "GRAPHQL_VALIDATION_FAILED"
    );
    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn it_executes_get_requests() {
    let (server, client) = init_default().await;
    let response = client
        .get(url(&server, "/"))
        .query(&[
            ("query", "query T($n: String!) { topic(name: $n) { id } }"),
            ("variables", r#"{"n":"rust"}"#),
        ])
        .header(ACCEPT, "application/json")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.json::<Value>().await.unwrap(),
        json!({ "data": { "topic": { "id": "MDU6VG9waWNydXN0" } } })
    );
    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn browsers_get_the_landing_page() {
    let (server, client) = init_default().await;
    let response = client
        .get(url(&server, "/"))
        .header(ACCEPT, "text/html,application/xhtml+xml")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.text().await.unwrap().contains("graphiql"));
    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn the_legacy_path_redirects() {
    let (server, client) = init_default().await;
    let response = client
        .get(url(&server, "/graphql"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(response.headers().get(LOCATION).unwrap(), "/");
    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn it_reports_health() {
    let (server, client) = init_default().await;
    let response = client
        .get(url(&server, "/.well-known/health"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.json::<Value>().await.unwrap(),
        json!({ "status": "pass" })
    );
    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn introspection_can_be_disabled() {
    let (server, client) = init("server:\n  introspection: false\n", false).await;
    let (status, body) = post(
        &server,
        &client,
        json!({ "query": "{ __schema { queryType { name } } }" }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["errors"][0]["extensions"]["code"], "INTROSPECTION_DISABLED");

    let (status, body) = post(&server, &client, json!({ "query": "{ __typename }" })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "data": { "__typename": "Query" } }));
    server.shutdown().await.unwrap();
}
