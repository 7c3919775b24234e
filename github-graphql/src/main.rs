//! Main entry point for CLI command to start server.

fn main() -> anyhow::Result<()> {
    github_graphql::main()
}
