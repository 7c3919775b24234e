//! Main entry point for CLI command to start server.

use std::io::IsTerminal;
use std::net::SocketAddr;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::axum_http_server_factory;
use crate::configuration::Configuration;
use crate::configuration::ConfigurationError;
use crate::configuration::DataSource;
use crate::configuration::generate_config_schema;
use crate::execution::Executor;
use crate::github;
use crate::github::FixtureDataSource;
use crate::github::GithubDataSource;
use crate::github::RestDataSource;

/// Options for the server
#[derive(Parser, Debug)]
#[command(
    name = "github-graphql",
    about = "A GraphQL schema over a subset of the GitHub API",
    version
)]
pub(crate) struct Opt {
    /// Log level (off|error|warn|info|debug|trace).
    #[arg(long = "log", default_value = "info", alias = "log-level", env = "RUST_LOG")]
    log_level: String,

    /// Configuration location relative to the current directory.
    #[arg(short, long = "config", env = "GITHUB_GRAPHQL_CONFIG_PATH")]
    config_path: Option<PathBuf>,

    /// Overrides `server.listen` from the configuration.
    #[arg(long, env = "GITHUB_GRAPHQL_LISTEN")]
    listen: Option<SocketAddr>,

    /// Prints the GraphQL schema in SDL and exits.
    #[arg(long)]
    print_schema: bool,

    /// Prints the configuration schema and exits.
    #[arg(long)]
    config_schema: bool,
}

/// This is the main server entrypoint.
pub fn main() -> Result<()> {
    let mut builder = tokio::runtime::Builder::new_multi_thread();
    builder.enable_all();
    if let Some(nb) = std::env::var("GITHUB_GRAPHQL_NUM_CORES")
        .ok()
        .and_then(|value| value.parse::<usize>().ok())
    {
        builder.worker_threads(nb);
    }
    let runtime = builder.build()?;
    runtime.block_on(Executable::builder().start())
}

/// Entry point into creating a server executable.
pub struct Executable {}

#[buildstructor::buildstructor]
impl Executable {
    /// Build an executable that will parse commandline options and set up logging.
    /// A `configuration` supplied here takes precedence over `--config`.
    ///
    /// Note that if you do not specify a runtime you must be in the context of an existing tokio runtime.
    #[builder(entry = "builder", exit = "start", visibility = "pub")]
    async fn start(configuration: Option<Configuration>) -> Result<()> {
        let opt = Opt::parse();

        if opt.config_schema {
            let schema = generate_config_schema();
            println!("{}", serde_json::to_string_pretty(&schema)?);
            return Ok(());
        }

        let builder = tracing_subscriber::fmt::fmt().with_env_filter(
            EnvFilter::try_new(&opt.log_level).context("could not parse log configuration")?,
        );
        if std::io::stdout().is_terminal() {
            builder.init();
        } else {
            builder.json().init();
        }

        let mut configuration = match configuration {
            Some(configuration) => configuration,
            None => match &opt.config_path {
                Some(path) => {
                    let path = if path.is_relative() {
                        std::env::current_dir()?.join(path)
                    } else {
                        path.clone()
                    };
                    read_configuration(&path)?
                }
                None => Configuration::default(),
            },
        };
        if let Some(listen) = opt.listen {
            configuration.server.listen = listen;
        }

        let schema = github::schema(data_source(&configuration)?)
            .context("could not build the GitHub schema")?;

        if opt.print_schema {
            println!("{}", schema.to_sdl());
            return Ok(());
        }

        let executor = Executor::builder()
            .schema(Arc::new(schema))
            .resolver_timeout(configuration.execution.resolver_timeout)
            .max_depth(configuration.execution.max_depth)
            .introspection(configuration.server.introspection)
            .build();

        tracing::info!(
            "github-graphql v{} starting",
            std::env!("CARGO_PKG_VERSION")
        );
        let handle = axum_http_server_factory::serve(&configuration, executor, None).await?;

        tokio::signal::ctrl_c()
            .await
            .context("could not listen for ctrl-c")?;
        tracing::info!("shutting down");
        handle.shutdown().await?;
        tracing::info!("stopped");
        Ok(())
    }
}

/// Reads a YAML configuration file.
///
/// A relative fixture path is resolved against the directory of the file.
pub(crate) fn read_configuration(path: &Path) -> Result<Configuration, ConfigurationError> {
    let content =
        std::fs::read_to_string(path).map_err(|error| ConfigurationError::CannotReadFile {
            path: path.to_path_buf(),
            error,
        })?;
    let mut configuration: Configuration = content.parse()?;
    if let (DataSource::Fixture { path: fixture }, Some(directory)) =
        (&mut configuration.data_source, path.parent())
    {
        if fixture.is_relative() {
            *fixture = directory.join(&*fixture);
        }
    }
    Ok(configuration)
}

/// Creates the data source selected by `configuration`.
///
/// The REST token is read from the environment variable named in the
/// configuration; requests are anonymous when it is unset or empty.
pub(crate) fn data_source(
    configuration: &Configuration,
) -> Result<Arc<dyn GithubDataSource>, ConfigurationError> {
    let source: Arc<dyn GithubDataSource> = match &configuration.data_source {
        DataSource::Fixture { path } => Arc::new(FixtureDataSource::from_path(path)?),
        DataSource::Rest(rest) => {
            let token = std::env::var(&rest.token_env)
                .ok()
                .filter(|token| !token.is_empty());
            if token.is_none() {
                tracing::warn!(
                    "{} is not set, GitHub requests will be anonymous and rate limited",
                    rest.token_env
                );
            }
            Arc::new(
                RestDataSource::builder()
                    .endpoint(rest.endpoint.clone())
                    .and_token(token)
                    .timeout(rest.timeout)
                    .build()?,
            )
        }
    };
    Ok(source)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn it_parses_command_line_options() {
        let opt = Opt::try_parse_from([
            "github-graphql",
            "--config",
            "config.yaml",
            "--listen",
            "0.0.0.0:4000",
            "--print-schema",
        ])
        .unwrap();
        assert_eq!(opt.config_path, Some(PathBuf::from("config.yaml")));
        assert_eq!(opt.listen, Some(SocketAddr::from(([0, 0, 0, 0], 4000))));
        assert!(opt.print_schema);
        assert!(!opt.config_schema);
    }

    #[test]
    fn fixture_paths_are_relative_to_the_configuration_file() {
        let directory = tempfile::tempdir().unwrap();
        let config_path = directory.path().join("config.yaml");
        let mut file = std::fs::File::create(&config_path).unwrap();
        writeln!(file, "data_source:\n  fixture:\n    path: github.yaml").unwrap();

        let configuration = read_configuration(&config_path).unwrap();
        match configuration.data_source {
            DataSource::Fixture { path } => assert_eq!(path, directory.path().join("github.yaml")),
            other => panic!("unexpected data source {other:?}"),
        }
    }

    #[test]
    fn missing_configuration_files_are_reported() {
        let error = read_configuration(Path::new("/nonexistent/config.yaml")).unwrap_err();
        assert!(matches!(error, ConfigurationError::CannotReadFile { .. }));
    }

    #[tokio::test]
    async fn it_loads_fixture_data_sources() {
        let configuration: Configuration = format!(
            "data_source:\n  fixture:\n    path: {}/tests/fixtures/github.yaml",
            env!("CARGO_MANIFEST_DIR")
        )
        .parse()
        .unwrap();
        let source = data_source(&configuration).unwrap();
        let topic = source.get_topic("rust").await.unwrap().unwrap();
        assert_eq!(topic["id"], "MDU6VG9waWNydXN0");
    }
}
