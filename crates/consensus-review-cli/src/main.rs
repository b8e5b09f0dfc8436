use std::collections::HashMap;
use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use clap::{Parser, Subcommand, ValueEnum};
use consensus_review_core::prompt::review_prompt;
use consensus_review_core::{
    aggregate, build_client, decode_reviews, render_report, run, DiffSource, FileConfig,
    FileDiffSource, GitHubClient, OutputFormat, Publisher, ReportContext, RunConfig, RunOutcome,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "consensus-review",
    author,
    version,
    about = "Majority-vote LLM code review for pull requests"
)]
struct Cli {
    /// Optional configuration file (TOML, YAML or JSON); environment variables take precedence
    #[arg(long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Review the configured pull request and post one consolidated comment
    Run {
        /// Print the report to stdout instead of posting it
        #[arg(long)]
        dry_run: bool,
        /// Read the diff from a local file instead of the GitHub API
        #[arg(long, value_name = "FILE")]
        diff_file: Option<PathBuf>,
    },
    /// Aggregate saved reviewer responses offline and print the report
    Aggregate {
        /// One raw reviewer response per file, in reviewer order
        #[arg(long = "input", value_name = "FILE", required = true)]
        inputs: Vec<PathBuf>,
        /// Votes required per finding (default: strict majority of inputs)
        #[arg(long)]
        quorum: Option<usize>,
        #[arg(long, value_enum, default_value_t = FormatArg::Markdown)]
        format: FormatArg,
    },
    /// Print the review prompt for a diff (read from stdin when no file is given)
    Prompt {
        #[arg(long, value_name = "FILE")]
        diff_file: Option<PathBuf>,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum FormatArg {
    Markdown,
    Json,
}

impl From<FormatArg> for OutputFormat {
    fn from(value: FormatArg) -> Self {
        match value {
            FormatArg::Markdown => OutputFormat::Markdown,
            FormatArg::Json => OutputFormat::Json,
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Commands::Run {
        dry_run: false,
        diff_file: None,
    });
    match command {
        Commands::Run { dry_run, diff_file } => {
            review(cli.config.as_deref(), dry_run, diff_file).await?
        }
        Commands::Aggregate {
            inputs,
            quorum,
            format,
        } => aggregate_files(&inputs, quorum, format.into()).await?,
        Commands::Prompt { diff_file } => print_prompt(diff_file.as_deref()).await?,
    }
    Ok(())
}

async fn review(
    config_path: Option<&Path>,
    dry_run: bool,
    diff_file: Option<PathBuf>,
) -> Result<()> {
    let file_config = load_file_config(config_path)?;
    let vars: HashMap<String, String> = std::env::vars().collect();
    let config = RunConfig::from_sources(&vars, &file_config).context("invalid configuration")?;

    let github = GitHubClient::new(&config.github)?;
    let reviewer = build_client(&config.llm)?;
    let file_source = diff_file.map(FileDiffSource::new);
    let source: &dyn DiffSource = match &file_source {
        Some(file_source) => file_source,
        None => &github,
    };
    let stdout = StdoutPublisher;
    let publisher: &dyn Publisher = if dry_run { &stdout } else { &github };

    info!(
        provider = config.llm.provider.label(),
        reviewers = config.temperatures.len(),
        quorum = config.quorum,
        dry_run,
        "starting consensus review"
    );
    match run(&config, source, reviewer.as_ref(), publisher).await? {
        RunOutcome::Published {
            groups, outcomes, ..
        } => {
            let failed = outcomes.iter().filter(|o| o.is_failed()).count();
            info!(
                findings = groups.len(),
                failed_reviewers = failed,
                "review finished"
            );
        }
        RunOutcome::SkippedNoDiff => info!("no diff available; nothing was posted"),
    }
    Ok(())
}

async fn aggregate_files(
    inputs: &[PathBuf],
    quorum: Option<usize>,
    format: OutputFormat,
) -> Result<()> {
    let quorum = quorum.unwrap_or(inputs.len() / 2 + 1);
    if quorum == 0 || quorum > inputs.len() {
        bail!(
            "quorum must be between 1 and the number of inputs ({}), got {}",
            inputs.len(),
            quorum
        );
    }

    let mut lists = Vec::with_capacity(inputs.len());
    for path in inputs {
        let raw = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read reviewer response {}", path.display()))?;
        match decode_reviews(&raw) {
            Ok(findings) => lists.push(findings),
            Err(err) => {
                warn!(path = %path.display(), error = %err, "treating reviewer as failed");
                lists.push(Vec::new());
            }
        }
    }

    let groups = aggregate(&lists, quorum);
    let context = ReportContext {
        reviewers: inputs.len(),
        quorum,
        head_sha: None,
        links: None,
    };
    print!("{}", render_report(&groups, &context, format)?);
    if matches!(format, OutputFormat::Json) {
        println!();
    }
    Ok(())
}

async fn print_prompt(diff_file: Option<&Path>) -> Result<()> {
    let diff = match diff_file {
        Some(path) => FileDiffSource::new(path).diff().await?,
        None => {
            let mut buffer = String::new();
            std::io::stdin()
                .read_to_string(&mut buffer)
                .context("failed to read diff from stdin")?;
            buffer
        }
    };
    print!("{}", review_prompt(&diff));
    Ok(())
}

fn load_file_config(path: Option<&Path>) -> Result<FileConfig> {
    let Some(path) = path else {
        return Ok(FileConfig::default());
    };
    config::Config::builder()
        .add_source(config::File::from(path))
        .build()
        .and_then(|settings| settings.try_deserialize::<FileConfig>())
        .with_context(|| format!("failed to load configuration from {}", path.display()))
}

/// Publisher used by `--dry-run`: writes the report to stdout.
struct StdoutPublisher;

#[async_trait]
impl Publisher for StdoutPublisher {
    async fn publish(&self, body: &str) -> Result<()> {
        print!("{body}");
        Ok(())
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,reqwest=warn,hyper=warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .try_init();
}
