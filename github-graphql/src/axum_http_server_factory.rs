//! HTTP server exposing the GraphQL endpoint, the landing page and the health check.
use std::net::SocketAddr;

use axum::Extension;
use axum::Router;
use axum::body::Bytes;
use axum::extract::RawQuery;
use axum::http::HeaderMap;
use axum::http::HeaderValue;
use axum::http::StatusCode;
use axum::http::header;
use axum::response::Html;
use axum::response::IntoResponse;
use axum::response::Json;
use axum::response::Response;
use axum::routing::any;
use axum::routing::get;
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;

use crate::configuration::Configuration;
use crate::error::ServerError;
use crate::execution::Executor;
use crate::graphql;

/// The path browsers and older clients use, redirected to the configured endpoint.
const LEGACY_GRAPHQL_PATH: &str = "/graphql";

/// A running HTTP server.
///
/// Dropping the handle without calling [`HttpServerHandle::shutdown`] leaves
/// the server running until the runtime stops.
#[derive(Debug)]
pub struct HttpServerHandle {
    shutdown_sender: oneshot::Sender<()>,
    server_future: JoinHandle<std::io::Result<()>>,
    listen_address: SocketAddr,
}

impl HttpServerHandle {
    /// The address the server actually bound, which differs from the configured
    /// one when port 0 was requested.
    pub fn listen_address(&self) -> SocketAddr {
        self.listen_address
    }

    /// Stops accepting connections and waits for in-flight requests to finish.
    pub async fn shutdown(self) -> Result<(), ServerError> {
        // The server may already be gone, in which case the join below reports it
        let _ = self.shutdown_sender.send(());
        self.server_future
            .await
            .map_err(|_| ServerError::HttpServerLifecycleError)?
            .map_err(ServerError::ServerCreationError)
    }

    /// Waits until the server stops on its own.
    pub async fn wait(self) -> Result<(), ServerError> {
        let HttpServerHandle {
            shutdown_sender,
            server_future,
            ..
        } = self;
        let result = server_future.await;
        drop(shutdown_sender);
        result
            .map_err(|_| ServerError::HttpServerLifecycleError)?
            .map_err(ServerError::ServerCreationError)
    }
}

/// Builds the routes served for `configuration`.
pub(crate) fn make_router(configuration: &Configuration, executor: Executor) -> Router {
    let server = &configuration.server;
    let display_landing_page = server.landing_page;

    let mut router = Router::new().route(
        &server.graphql_path,
        get(
            move |Extension(executor): Extension<Executor>,
                  headers: HeaderMap,
                  RawQuery(query): RawQuery| {
                handle_get(executor, headers, query, display_landing_page)
            },
        )
        .post(handle_post),
    );
    if server.graphql_path != LEGACY_GRAPHQL_PATH {
        let location = server.graphql_path.clone();
        router = router.route(
            LEGACY_GRAPHQL_PATH,
            any(move |RawQuery(query): RawQuery| redirect(location.clone(), query)),
        );
    }

    router
        .route(&server.health_check_path, get(health_check))
        .layer(Extension(executor))
        .layer(TraceLayer::new_for_http())
}

/// Binds `configuration.server.listen` (or reuses `listener`) and serves
/// requests until [`HttpServerHandle::shutdown`] is called.
pub async fn serve(
    configuration: &Configuration,
    executor: Executor,
    listener: Option<TcpListener>,
) -> Result<HttpServerHandle, ServerError> {
    let router = make_router(configuration, executor);

    // if we received a TCP listener, reuse it, otherwise create a new one
    let listener = match listener {
        Some(listener) => listener,
        None => TcpListener::bind(configuration.server.listen)
            .await
            .map_err(ServerError::ServerCreationError)?,
    };
    let listen_address = listener
        .local_addr()
        .map_err(ServerError::ServerCreationError)?;

    tracing::info!(
        "GraphQL endpoint exposed at http://{}{} 🚀",
        listen_address,
        configuration.server.graphql_path
    );

    let (shutdown_sender, shutdown_receiver) = oneshot::channel::<()>();
    let server_future = tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                let _ = shutdown_receiver.await;
            })
            .await
    });

    Ok(HttpServerHandle {
        shutdown_sender,
        server_future,
        listen_address,
    })
}

async fn handle_get(
    executor: Executor,
    headers: HeaderMap,
    query: Option<String>,
    display_landing_page: bool,
) -> Response {
    if headers
        .get(header::ACCEPT)
        .map(prefers_html)
        .unwrap_or_default()
        && display_landing_page
    {
        return display_home_page().into_response();
    }

    match graphql::Request::from_urlencoded_query(query.as_deref().unwrap_or_default()) {
        Ok(request) => run_graphql_request(&executor, request).await,
        Err(error) => invalid_request(format!("Invalid GraphQL request: {error}")),
    }
}

async fn handle_post(Extension(executor): Extension<Executor>, body: Bytes) -> Response {
    match serde_json::from_slice::<graphql::Request>(&body) {
        Ok(request) => run_graphql_request(&executor, request).await,
        Err(error) => invalid_request(format!("Invalid GraphQL request: {error}")),
    }
}

async fn run_graphql_request(executor: &Executor, request: graphql::Request) -> Response {
    let response = executor.execute(&request).await;
    let status = if response.is_executed() {
        StatusCode::OK
    } else {
        StatusCode::BAD_REQUEST
    };
    (status, Json(response)).into_response()
}

fn invalid_request(message: String) -> Response {
    tracing::debug!("{message}");
    let response = graphql::Response::from_errors(vec![
        graphql::Error::builder()
            .message(message)
            .extension_code("INVALID_GRAPHQL_REQUEST")
            .build(),
    ]);
    (StatusCode::BAD_REQUEST, Json(response)).into_response()
}

async fn redirect(location: String, query: Option<String>) -> Response {
    let location = match query {
        Some(query) if !query.is_empty() => format!("{location}?{query}"),
        _ => location,
    };
    match HeaderValue::from_str(&location) {
        Ok(location) => (StatusCode::FOUND, [(header::LOCATION, location)]).into_response(),
        Err(_) => StatusCode::BAD_REQUEST.into_response(),
    }
}

fn display_home_page() -> Html<&'static str> {
    Html(include_str!("../resources/index.html"))
}

async fn health_check() -> impl IntoResponse {
    Json(json!({ "status": "pass" }))
}

fn prefers_html(accept_header: &HeaderValue) -> bool {
    accept_header
        .to_str()
        .map(|accept_str| {
            accept_str
                .split(',')
                .map(|a| a.split(';').next().unwrap_or_default().trim())
                .any(|a| a == "text/html")
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::Method;
    use axum::http::Request;
    use pretty_assertions::assert_eq;
    use tower::ServiceExt;

    use super::*;
    use crate::configuration::Server;
    use crate::github::test_schema;

    fn init(server: Server) -> Router {
        let executor = Executor::builder()
            .schema(Arc::new(test_schema()))
            .build();
        make_router(&Configuration::builder().server(server).build(), executor)
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn it_detects_browsers() {
        assert!(prefers_html(&HeaderValue::from_static(
            "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"
        )));
        assert!(prefers_html(&HeaderValue::from_static("text/html;q=0.9")));
        assert!(!prefers_html(&HeaderValue::from_static("application/json")));
        assert!(!prefers_html(&HeaderValue::from_static("*/*")));
    }

    #[tokio::test]
    async fn it_executes_post_requests() {
        let response = init(Server::default())
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(
                        r#"{"query":"query T($n: String!) { topic(name: $n) { name } }","variables":{"n":"rust"}}"#,
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            body_json(response).await,
            json!({ "data": { "topic": { "name": "rust" } } })
        );
    }

    #[tokio::test]
    async fn it_executes_get_requests() {
        let response = init(Server::default())
            .oneshot(
                Request::builder()
                    .uri("/?query=%7B%20topic(name%3A%20%22graphql%22)%20%7B%20id%20%7D%20%7D")
                    .header(header::ACCEPT, "application/json")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            body_json(response).await,
            json!({ "data": { "topic": { "id": "MDU6VG9waWNncmFwaHFs" } } })
        );
    }

    #[tokio::test]
    async fn rejected_requests_are_bad_requests() {
        let router = init(Server::default());
        let response = router
            .clone()
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/")
                    .body(Body::from(r#"{"query":"{ topic { name } }"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert!(body.get("data").is_none());
        assert_eq!(
            body["errors"][0]["extensions"]["code"],
            "GRAPHQL_VALIDATION_FAILED"
        );

        let response = router
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/")
                    .body(Body::from("{not json"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            body_json(response).await["errors"][0]["extensions"]["code"],
            "INVALID_GRAPHQL_REQUEST"
        );
    }

    #[tokio::test]
    async fn it_displays_the_landing_page_to_browsers() {
        let response = init(Server::default())
            .oneshot(
                Request::builder()
                    .uri("/")
                    .header(header::ACCEPT, "text/html")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "text/html; charset=utf-8"
        );

        let response = init(Server::builder().landing_page(false).build())
            .oneshot(
                Request::builder()
                    .uri("/")
                    .header(header::ACCEPT, "text/html")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            body_json(response).await["errors"][0]["extensions"]["code"],
            "MISSING_QUERY_STRING"
        );
    }

    #[tokio::test]
    async fn it_redirects_the_legacy_path() {
        let response = init(Server::default())
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/graphql?query=x")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(response.headers().get(header::LOCATION).unwrap(), "/?query=x");

        let response = init(
            Server::builder()
                .graphql_path("/graphql".to_string())
                .build(),
        )
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri("/graphql")
                .body(Body::from(r#"{"query":"{ __typename }"}"#))
                .unwrap(),
        )
        .await
        .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            body_json(response).await,
            json!({ "data": { "__typename": "Query" } })
        );
    }

    #[tokio::test]
    async fn it_reports_health() {
        let response = init(Server::default())
            .oneshot(
                Request::builder()
                    .uri("/.well-known/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, json!({ "status": "pass" }));
    }
}
