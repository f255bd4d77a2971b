//! Command-line front end for local use and testing of the extraction
//! service.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

use pdf2txt::config::validate_config;
use pdf2txt::db::user_repo;
use pdf2txt::logging::init_logging;
use pdf2txt::{load_config, Config, ExtractionService, Submission};

#[derive(Parser, Debug)]
#[command(
    name = "pdf2txt",
    version,
    about = "Extract clean plain text from PDF documents",
    arg_required_else_help = true
)]
struct Cli {
    /// Path to the JSON configuration file. Built-in defaults apply when absent.
    #[arg(short, long, env = "PDF2TXT_CONFIG", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Manage document owners.
    User {
        #[command(subcommand)]
        action: UserAction,
    },

    /// Submit a PDF and wait for the job to finish.
    Submit {
        /// PDF file to extract.
        file: PathBuf,

        /// Owner email.
        #[arg(long)]
        owner: String,

        /// Document label (at least 3 characters).
        #[arg(long)]
        label: String,

        /// URL notified when the job finishes.
        #[arg(long)]
        webhook: String,

        /// Run the language correction pass.
        #[arg(long)]
        correct: bool,

        /// Seconds to wait for the outcome.
        #[arg(long, default_value_t = 600)]
        wait_secs: u64,
    },

    /// List an owner's jobs, newest first.
    Jobs {
        /// Owner email.
        #[arg(long)]
        owner: String,
    },

    /// Print a user's activity journal, newest first.
    Activity {
        /// User email.
        #[arg(long)]
        user: String,
    },

    /// Mint a token for local testing.
    Token {
        /// Session token for this user.
        #[arg(long, conflicts_with = "job", required_unless_present = "job")]
        email: Option<String>,

        /// Download token for this job.
        #[arg(long)]
        job: Option<i64>,
    },

    /// Resolve a download request and print the result file path.
    Download {
        job: i64,

        #[arg(long)]
        token: String,
    },
}

#[derive(Subcommand, Debug)]
enum UserAction {
    /// Register a user.
    Add {
        email: String,

        /// Leave the user unvalidated (no result directory yet).
        #[arg(long)]
        no_validate: bool,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => {
            let config = Config::default();
            validate_config(&config)?;
            config
        }
    };
    init_logging(&config.logging)?;

    let service = ExtractionService::start(&config).context("Failed to start service")?;
    let result = run(&service, cli.command).await;
    service.close();
    result
}

async fn run(service: &ExtractionService, command: Command) -> Result<()> {
    match command {
        Command::User {
            action: UserAction::Add { email, no_validate },
        } => {
            let user = service.register_user(&email, !no_validate).await?;
            println!("{}", user.id);
        }

        Command::Submit {
            file,
            owner,
            label,
            webhook,
            correct,
            wait_secs,
        } => {
            let owner_id = owner_id(service, &owner)?;
            let content =
                std::fs::read(&file).with_context(|| format!("Failed to read {}", file.display()))?;
            let filename = file
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let source = service.stage_upload(&filename, &content)?;

            let job_id = service.submit(Submission {
                owner_id,
                external_label: label,
                webhook_url: webhook,
                correction_requested: correct,
                source_file_path: source,
            })?;
            eprintln!("Submitted job {}", job_id);

            let Some(outcome) = service.wait_for(job_id, Duration::from_secs(wait_secs)) else {
                bail!("Job {} did not finish within {}s", job_id, wait_secs);
            };
            match (outcome.result_path, outcome.error) {
                (Some(path), _) => println!("{}", path.display()),
                (None, Some(error)) => bail!("Job {} failed: {}", job_id, error),
                (None, None) => bail!("Job {} finished without a result", job_id),
            }
        }

        Command::Jobs { owner } => {
            let jobs = service.list_jobs(owner_id(service, &owner)?)?;
            println!("{}", serde_json::to_string_pretty(&jobs)?);
        }

        Command::Activity { user } => {
            let entries = service.activity(owner_id(service, &user)?)?;
            println!("{}", serde_json::to_string_pretty(&entries)?);
        }

        Command::Token { email, job } => {
            let token = match (email, job) {
                (Some(email), _) => service.tokens().issue_session(&email)?,
                (None, Some(job)) => service.tokens().issue_download(job)?,
                (None, None) => bail!("Either --email or --job is required"),
            };
            println!("{}", token);
        }

        Command::Download { job, token } => {
            let file = service.download(job, Some(&token), None)?;
            println!("{}", file.path.display());
        }
    }
    Ok(())
}

fn owner_id(service: &ExtractionService, email: &str) -> Result<i64> {
    match user_repo::find_by_email(service.database(), email)? {
        Some(user) => Ok(user.id),
        None => bail!("Unknown user {}", email),
    }
}
