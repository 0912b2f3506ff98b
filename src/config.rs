//! Environment-driven configuration (spec §8, "Environment").

use std::path::PathBuf;

use clap::Args;

/// Workspace and identity-service configuration shared by every phase of the
/// build pipeline. Each field is independently settable via CLI flag or the
/// matching environment variable (`clap`'s `env` attribute), mirroring the
/// way the source read straight from `os.environ`.
#[derive(Args, Debug, Clone)]
pub struct Config {
    /// Workspace root holding logs and the annotator tool installation.
    #[arg(long, env = "RAGS_HOME")]
    pub rags_home: PathBuf,

    /// Base path study file paths are resolved relative to.
    #[arg(long, env = "RAGS_DATA_DIR")]
    pub rags_data_dir: PathBuf,

    #[command(flatten)]
    pub graph_store: GraphStoreConfig,

    #[command(flatten)]
    pub normalizer: NormalizerConfig,

    #[command(flatten)]
    pub annotator: AnnotatorConfig,
}

#[derive(Args, Debug, Clone)]
pub struct GraphStoreConfig {
    #[arg(long, env = "NEO4J_HOST", default_value = "localhost")]
    pub host: String,

    #[arg(long, env = "NEO4J_BOLT_PORT", default_value_t = 7687)]
    pub bolt_port: u16,

    #[arg(long, env = "NEO4J_USER", default_value = "neo4j")]
    pub user: String,

    #[arg(long, env = "NEO4J_PASSWORD")]
    pub password: String,
}

impl GraphStoreConfig {
    pub fn bolt_uri(&self) -> String {
        format!("bolt://{}:{}", self.host, self.bolt_port)
    }
}

#[derive(Args, Debug, Clone)]
pub struct NormalizerConfig {
    #[arg(long, env = "NODE_NORMALIZATION_ENDPOINT")]
    pub node_normalization_url: String,

    #[arg(long, env = "EDGE_NORMALIZATION_ENDPOINT")]
    pub edge_normalization_url: String,

    /// Ids/predicates per outbound HTTP request.
    #[arg(long, default_value_t = 1000)]
    pub batch_size: usize,

    #[arg(long, value_parser = humantime_duration, default_value = "30s")]
    pub request_timeout: std::time::Duration,
}

fn humantime_duration(s: &str) -> Result<std::time::Duration, String> {
    let seconds: u64 = s
        .trim_end_matches('s')
        .parse()
        .map_err(|_| format!("invalid duration: {s}"))?;
    Ok(std::time::Duration::from_secs(seconds))
}

#[derive(Args, Debug, Clone)]
pub struct AnnotatorConfig {
    #[arg(
        long,
        env = "ANNOTATOR_TOOL_URL",
        default_value = "https://snpeff.blob.core.windows.net/versions/snpEff_latest_core.zip"
    )]
    pub tool_url: String,

    #[arg(long, env = "ANNOTATOR_REFERENCE_GENOME", default_value = "GRCh38.99")]
    pub reference_genome: String,

    #[arg(long, env = "ANNOTATOR_UD_DISTANCE", default_value_t = 500_000)]
    pub ud_distance: u64,

    #[arg(long, env = "JAVA_BIN", default_value = "java")]
    pub java_bin: String,
}
