use std::net::SocketAddr;

use schemars::JsonSchema;
use serde::Deserialize;
use serde::Serialize;

fn default_listen() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 3000))
}

fn default_introspection() -> bool {
    true
}

fn default_landing_page() -> bool {
    true
}

fn default_graphql_path() -> String {
    String::from("/")
}

fn default_health_check_path() -> String {
    String::from("/.well-known/health")
}

/// Configuration options pertaining to the http server component.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub(crate) struct Server {
    /// The socket address and port to listen on
    /// Defaults to 127.0.0.1:3000
    #[serde(default = "default_listen")]
    #[schemars(with = "String")]
    pub(crate) listen: SocketAddr,

    /// introspection queries
    /// enabled by default
    #[serde(default = "default_introspection")]
    pub(crate) introspection: bool,

    /// display the GraphiQL page to browsers
    /// enabled by default
    #[serde(default = "default_landing_page")]
    pub(crate) landing_page: bool,

    /// The HTTP path on which GraphQL requests will be served.
    /// Requests to `/graphql` are redirected here when it differs.
    /// default: "/"
    #[serde(default = "default_graphql_path")]
    pub(crate) graphql_path: String,

    /// healthCheck path
    /// default: "/.well-known/health"
    #[serde(default = "default_health_check_path")]
    pub(crate) health_check_path: String,
}

#[buildstructor::buildstructor]
impl Server {
    #[builder]
    pub(crate) fn new(
        listen: Option<SocketAddr>,
        introspection: Option<bool>,
        landing_page: Option<bool>,
        graphql_path: Option<String>,
        health_check_path: Option<String>,
    ) -> Self {
        Self {
            listen: listen.unwrap_or_else(default_listen),
            introspection: introspection.unwrap_or_else(default_introspection),
            landing_page: landing_page.unwrap_or_else(default_landing_page),
            graphql_path: graphql_path.unwrap_or_else(default_graphql_path),
            health_check_path: health_check_path.unwrap_or_else(default_health_check_path),
        }
    }
}

impl Default for Server {
    fn default() -> Self {
        Server::builder().build()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn it_builds_default_server_configuration() {
        let server = Server::builder().build();
        assert_eq!(server.listen, default_listen());
        assert_eq!(server.graphql_path, "/");
        assert!(server.introspection);
        assert!(server.landing_page);
    }

    #[test]
    fn it_json_parses_partial_server_configuration() {
        let server: Server = serde_json::from_value(json!({
            "listen": "0.0.0.0:8080",
            "landing_page": false
        }))
        .unwrap();
        assert_eq!(server.listen.port(), 8080);
        assert!(!server.landing_page);
        assert_eq!(server.health_check_path, "/.well-known/health");
    }

    #[test]
    fn it_rejects_unknown_fields() {
        let error = serde_json::from_value::<Server>(json!({ "cors": {} })).unwrap_err();
        assert!(error.to_string().contains("unknown field `cors`"));
    }
}
