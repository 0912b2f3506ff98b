//! RAGs builder worker executable.

use clap::{Args, Parser, Subcommand};

use rags_core::config::Config;
use rags_core::model::StudyKind;

/// CLI parser based on clap.
#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "RAGs association-study graph builder",
    long_about = "Builds and maintains an association-study knowledge graph from GWAS/MWAS study files."
)]
struct Cli {
    /// Commonly used arguments
    #[command(flatten)]
    common: rags_core::common::Args,

    #[command(flatten)]
    config: Config,

    /// The sub command to run
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Project-related commands.
    Project(Project),
    /// Study-related commands.
    Study(Study),
    /// Build-pipeline phases.
    Build(Build),
}

#[derive(Debug, Args)]
#[command(args_conflicts_with_subcommands = true)]
struct Project {
    #[command(subcommand)]
    command: ProjectCommands,
}

#[derive(Debug, Subcommand)]
enum ProjectCommands {
    /// Create a new project.
    Create(ProjectCreateArgs),
    /// List existing projects.
    List,
    /// Delete a project and everything built for it.
    Delete(ProjectIdArgs),
}

#[derive(Debug, Args)]
struct ProjectCreateArgs {
    name: String,
}

#[derive(Debug, Args)]
struct ProjectIdArgs {
    project_id: i64,
}

#[derive(Debug, Args)]
#[command(args_conflicts_with_subcommands = true)]
struct Study {
    #[command(subcommand)]
    command: StudyCommands,
}

#[derive(Debug, Subcommand)]
enum StudyCommands {
    /// Register a study file with a project.
    Create(StudyCreateArgs),
    /// List a project's studies.
    List(ProjectIdArgs),
}

#[derive(Debug, Args)]
struct StudyCreateArgs {
    project_id: i64,
    file_path: String,
    study_name: String,
    #[arg(value_enum)]
    study_type: StudyKindArg,
    original_trait_id: String,
    original_trait_type: String,
    original_trait_label: String,
    #[arg(long, default_value_t = 5e-8)]
    p_value_cutoff: f64,
    #[arg(long)]
    max_p_value: Option<f64>,
    #[arg(long)]
    has_tabix: bool,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum StudyKindArg {
    Gwas,
    Mwas,
}

impl From<StudyKindArg> for StudyKind {
    fn from(value: StudyKindArg) -> Self {
        match value {
            StudyKindArg::Gwas => StudyKind::Gwas,
            StudyKindArg::Mwas => StudyKind::Mwas,
        }
    }
}

#[derive(Debug, Args)]
#[command(args_conflicts_with_subcommands = true)]
struct Build {
    #[command(subcommand)]
    command: BuildCommands,
}

#[derive(Debug, Args)]
struct BuildPhaseArgs {
    project_id: i64,
    /// Re-run the phase even for studies/hits already past it.
    #[arg(long)]
    force: bool,
}

#[derive(Debug, Subcommand)]
enum BuildCommands {
    /// Normalize every study's trait and write its node.
    Traits(BuildPhaseArgs),
    /// Scan each study's file for significant hits.
    Search(ProjectIdArgs),
    /// Normalize hits and write their nodes.
    Hits(BuildPhaseArgs),
    /// Look up associations and write edges.
    Associations(BuildPhaseArgs),
    /// Annotate variant nodes with gene edges.
    Annotate(ProjectIdArgs),
    /// Run every phase in order.
    All(BuildPhaseArgs),
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let cli = Cli::parse();

    let collector = tracing_subscriber::fmt()
        .with_target(false)
        .with_max_level(match cli.common.verbose.log_level() {
            Some(level) => match level {
                log::Level::Error => tracing::Level::ERROR,
                log::Level::Warn => tracing::Level::WARN,
                log::Level::Info => tracing::Level::INFO,
                log::Level::Debug => tracing::Level::DEBUG,
                log::Level::Trace => tracing::Level::TRACE,
            },
            None => tracing::Level::INFO,
        })
        .compact()
        .finish();

    tracing::subscriber::set_global_default(collector)?;

    match &cli.command {
        Commands::Project(project) => match &project.command {
            ProjectCommands::Create(args) => run_create_project(&cli.config, args).await?,
            ProjectCommands::List => run_list_projects(&cli.config).await?,
            ProjectCommands::Delete(args) => run_delete_project(&cli.config, args).await?,
        },
        Commands::Study(study) => match &study.command {
            StudyCommands::Create(args) => run_create_study(&cli.config, args).await?,
            StudyCommands::List(args) => run_list_studies(&cli.config, args).await?,
        },
        Commands::Build(build) => match &build.command {
            BuildCommands::Traits(args) => {
                let mut manager = connect_manager(&cli.config).await?;
                print_phase_result(&manager.process_traits(args.project_id, args.force).await?);
            }
            BuildCommands::Search(args) => {
                let mut manager = connect_manager(&cli.config).await?;
                print_phase_result(&manager.search_studies(args.project_id).await?);
            }
            BuildCommands::Hits(args) => {
                let mut manager = connect_manager(&cli.config).await?;
                print_phase_result(&manager.build_hits(args.project_id, args.force).await?);
            }
            BuildCommands::Associations(args) => {
                let project = load_project(&cli.config, args.project_id).await?;
                let mut manager = connect_manager(&cli.config).await?;
                print_phase_result(&manager.build_associations(&project, args.force).await?);
            }
            BuildCommands::Annotate(args) => {
                let mut manager = connect_manager(&cli.config).await?;
                print_phase_result(&manager.annotate_hits(args.project_id).await?);
            }
            BuildCommands::All(args) => run_all_phases(&cli.config, args.project_id, args.force).await?,
        },
    }

    tracing::info!("All done.");
    Ok(())
}

fn database_url(config: &Config) -> String {
    format!("sqlite://{}/rags.sqlite3?mode=rwc", config.rags_data_dir.display())
}

async fn connect_manager(config: &Config) -> anyhow::Result<rags_core::project::ProjectManager> {
    let store = rags_core::store::ProjectStore::connect(&database_url(config)).await?;
    let graph_store = rags_core::graph::GraphStore::connect(&config.graph_store).await?;

    let http = reqwest::Client::builder().timeout(config.normalizer.request_timeout).build()?;
    let node_normalizer = rags_core::normalize::NodeNormalizer::new(
        http.clone(),
        config.normalizer.node_normalization_url.clone(),
        config.normalizer.batch_size,
    );
    let mut edge_normalizer = rags_core::normalize::EdgeNormalizer::new(
        http.clone(),
        config.normalizer.edge_normalization_url.clone(),
        config.normalizer.batch_size,
    );
    edge_normalizer.bootstrap_default_predicate().await;

    let annotator = rags_core::annotate::Annotator::new(config.annotator.clone(), config.rags_home.clone(), http);

    Ok(rags_core::project::ProjectManager::new(
        store,
        graph_store,
        node_normalizer,
        edge_normalizer,
        annotator,
        config.rags_data_dir.clone(),
    ))
}

async fn run_create_project(config: &Config, args: &ProjectCreateArgs) -> anyhow::Result<()> {
    let store = rags_core::store::ProjectStore::connect(&database_url(config)).await?;
    let project = store.create_project(&args.name).await?;
    println!("Created project {} ({})", project.id, project.name);
    Ok(())
}

async fn run_list_projects(config: &Config) -> anyhow::Result<()> {
    let store = rags_core::store::ProjectStore::connect(&database_url(config)).await?;
    for project in store.get_projects().await? {
        println!("{}\t{}", project.id, project.name);
    }
    Ok(())
}

async fn run_delete_project(config: &Config, args: &ProjectIdArgs) -> anyhow::Result<()> {
    let store = rags_core::store::ProjectStore::connect(&database_url(config)).await?;
    let graph_store = rags_core::graph::GraphStore::connect(&config.graph_store).await?;
    graph_store.delete_project(args.project_id).await?;
    store.delete_project(args.project_id).await?;
    println!("Deleted project {}", args.project_id);
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn run_create_study(config: &Config, args: &StudyCreateArgs) -> anyhow::Result<()> {
    let store = rags_core::store::ProjectStore::connect(&database_url(config)).await?;
    let study = store
        .create_study(
            args.project_id,
            &args.file_path,
            &args.study_name,
            args.study_type.into(),
            &args.original_trait_id,
            &args.original_trait_type,
            &args.original_trait_label,
            args.p_value_cutoff,
            args.max_p_value,
            args.has_tabix,
        )
        .await?;
    println!("Created study {} ({})", study.id, study.study_name);
    Ok(())
}

async fn run_list_studies(config: &Config, args: &ProjectIdArgs) -> anyhow::Result<()> {
    let store = rags_core::store::ProjectStore::connect(&database_url(config)).await?;
    for study in store.get_all_studies(args.project_id).await? {
        println!(
            "{}\t{}\t{:?}\tsearched={}\twritten={}",
            study.id, study.study_name, study.study_type, study.searched, study.written
        );
    }
    Ok(())
}

async fn load_project(config: &Config, project_id: i64) -> anyhow::Result<rags_core::model::Project> {
    let store = rags_core::store::ProjectStore::connect(&database_url(config)).await?;
    store
        .get_project_by_id(project_id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("no project with id {project_id}"))
}

async fn run_all_phases(config: &Config, project_id: i64, force: bool) -> anyhow::Result<()> {
    let project = load_project(config, project_id).await?;
    let mut manager = connect_manager(config).await?;

    tracing::info!("phase: process_traits");
    print_phase_result(&manager.process_traits(project.id, force).await?);
    tracing::info!("phase: search_studies");
    print_phase_result(&manager.search_studies(project.id).await?);
    tracing::info!("phase: build_hits");
    print_phase_result(&manager.build_hits(project.id, force).await?);
    tracing::info!("phase: build_associations");
    print_phase_result(&manager.build_associations(&project, force).await?);
    tracing::info!("phase: annotate_hits");
    print_phase_result(&manager.annotate_hits(project.id).await?);

    Ok(())
}

fn print_phase_result(result: &rags_core::project::PhaseResult) {
    println!("{}", result.success_message);
    for warning in &result.warnings {
        println!("warning: {warning}");
    }
    for error in &result.errors {
        println!("error: {error}");
    }
}
