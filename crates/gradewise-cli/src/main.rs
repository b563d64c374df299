//! gradewise CLI: the user-facing command-line interface.

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use gradewise_core::model::{Actor, Permission, Role};

mod commands;

#[derive(Parser)]
#[command(name = "gradewise", version, about = "Rubric grading with AI assistance")]
struct Cli {
    /// Config file path
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log debug output to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Who is running the command.
#[derive(clap::Args)]
struct ActorArgs {
    /// Principal id to act as
    #[arg(long = "as", value_name = "PRINCIPAL")]
    principal: String,

    /// Role of the principal: student, teacher, admin
    #[arg(long, default_value = "teacher")]
    role: Role,
}

impl ActorArgs {
    fn actor(&self) -> Actor {
        Actor::new(self.principal.clone(), self.role)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create a starter config, rubric and dataset
    Init,

    /// Validate rubric TOML files
    Validate {
        /// Path to a rubric file or directory
        #[arg(long)]
        rubric: PathBuf,
    },

    /// Combine criterion scores into a grade
    Aggregate {
        /// Rubric TOML file
        #[arg(long)]
        rubric: PathBuf,

        /// Criterion score, repeatable (e.g. --score content=4)
        #[arg(long = "score", value_name = "ID=SCORE", required = true)]
        scores: Vec<String>,

        /// Maximum grade
        #[arg(long, default_value = "100")]
        max_score: f64,
    },

    /// List assignments a principal can access
    List {
        /// Dataset JSON file
        #[arg(long)]
        data: PathBuf,

        #[command(flatten)]
        actor: ActorArgs,

        /// Permission to filter by: read, write
        #[arg(long, default_value = "read")]
        permission: Permission,

        /// Permitted assignments to skip
        #[arg(long, default_value = "0")]
        skip: usize,

        /// Maximum assignments to return
        #[arg(long)]
        limit: Option<usize>,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// List submissions: an assignment's, or without one, your own
    Submissions {
        /// Dataset JSON file
        #[arg(long)]
        data: PathBuf,

        #[command(flatten)]
        actor: ActorArgs,

        /// Assignment id; graders see every submission to it
        #[arg(long)]
        assignment: Option<String>,

        /// Visible submissions to skip
        #[arg(long, default_value = "0")]
        skip: usize,

        /// Maximum submissions to return
        #[arg(long)]
        limit: Option<usize>,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Grade a submission with the configured scorer
    Grade {
        /// Dataset JSON file; updated in place
        #[arg(long)]
        data: PathBuf,

        /// Submission id
        #[arg(long)]
        submission: String,

        #[command(flatten)]
        actor: ActorArgs,

        /// Provider name from the config (default: default_provider)
        #[arg(long)]
        provider: Option<String>,

        /// Model override
        #[arg(long)]
        model: Option<String>,

        /// Grade without saving the dataset
        #[arg(long)]
        dry_run: bool,
    },

    /// Show submission statistics for an assignment
    Stats {
        /// Dataset JSON file
        #[arg(long)]
        data: PathBuf,

        /// Assignment id
        #[arg(long)]
        assignment: String,

        #[command(flatten)]
        actor: ActorArgs,
    },

    /// Export an assignment's grades
    Export {
        /// Dataset JSON file
        #[arg(long)]
        data: PathBuf,

        /// Assignment id
        #[arg(long)]
        assignment: String,

        #[command(flatten)]
        actor: ActorArgs,

        /// Output format: csv, json
        #[arg(long, default_value = "csv")]
        format: String,

        /// Write to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "gradewise=debug" } else { "gradewise=warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = cli.config;
    let result = match cli.command {
        Commands::Init => commands::init::execute(),
        Commands::Validate { rubric } => commands::validate::execute(rubric),
        Commands::Aggregate {
            rubric,
            scores,
            max_score,
        } => commands::aggregate::execute(rubric, scores, max_score, config),
        Commands::List {
            data,
            actor,
            permission,
            skip,
            limit,
            json,
        } => commands::list::execute(data, actor.actor(), permission, skip, limit, json).await,
        Commands::Submissions {
            data,
            actor,
            assignment,
            skip,
            limit,
            json,
        } => {
            commands::submissions::execute(data, actor.actor(), assignment, skip, limit, json)
                .await
        }
        Commands::Grade {
            data,
            submission,
            actor,
            provider,
            model,
            dry_run,
        } => {
            commands::grade::execute(
                data,
                submission,
                actor.actor(),
                provider,
                model,
                dry_run,
                config,
            )
            .await
        }
        Commands::Stats {
            data,
            assignment,
            actor,
        } => commands::stats::execute(data, assignment, actor.actor()).await,
        Commands::Export {
            data,
            assignment,
            actor,
            format,
            output,
        } => commands::export::execute(data, assignment, actor.actor(), format, output).await,
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}
