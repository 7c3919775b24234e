//! A GraphQL server over a subset of the GitHub API.
//!
//! The [`spec::Schema`] registry holds the type graph, the [`Executor`]
//! resolves queries against it, and [`serve`] exposes it over HTTP.

#![warn(unreachable_pub)]

pub mod json_ext;

mod axum_http_server_factory;
mod configuration;
pub mod error;
mod executable;
pub mod execution;
pub mod github;
pub mod graphql;
mod introspection;
pub mod spec;

pub use axum_http_server_factory::HttpServerHandle;
pub use axum_http_server_factory::serve;
pub use configuration::Configuration;
pub use executable::Executable;
pub use executable::main;
pub use execution::Executor;
pub use spec::Schema;
