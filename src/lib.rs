//! A GraphQL-aware reverse proxy for Apollo Federation subgraphs: per request, route to
//! a real subgraph ("passthrough") or synthesize a schema-conformant mock response,
//! backed by a TTL schema cache and a per-subgraph health state machine.
use std::path::PathBuf;

pub mod app;
pub mod env_config;
pub mod error;
pub mod health;
pub mod http;
pub mod mock;
pub mod passthrough;
pub mod registry;
pub mod router;
pub mod schema_cache;
pub mod subgraph_config;
pub mod supergraph_rewriter;

/// CLI surface (§6 supplement), mirroring the teacher's `Args` struct shape.
#[derive(Debug, clap::Parser)]
#[clap(about, name = "subgraph-proxy", long_about = None)]
pub struct Cli {
    /// Path to the subgraph config YAML (`{subgraphs: {name: SubgraphConfig}}`).
    #[arg(short, long, env = "SUBGRAPH_CONFIG_PATH")]
    pub config: Option<PathBuf>,

    /// Overrides the `PORT` environment variable.
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Directory containing declarative `mocks.yaml` resolver overrides.
    #[arg(long, default_value = "mocks", env = "MOCKS_DIR")]
    pub mocks_dir: PathBuf,

    /// Directory containing local `schemaFile`-referenced SDL files.
    #[arg(long, default_value = "schemas", env = "SCHEMA_DIR")]
    pub schema_dir: PathBuf,
}
