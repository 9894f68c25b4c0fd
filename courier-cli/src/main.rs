//! Courier CLI - run and operate the email delivery pipeline.
//!
//! # Commands
//!
//! - `courier worker` - Run the delivery worker pool until Ctrl-C
//! - `courier enqueue` - Queue an email delivery task
//! - `courier stats` - Show per-class queue counts
//! - `courier dead-letters` - List tasks that exhausted their attempts
//! - `courier recover` - Return stale `Processing` tasks to the queue
//! - `courier render` - Render a template locally
//! - `courier config` - Print the effective configuration

use clap::{Args, Parser, Subcommand, ValueEnum};
use colored::Colorize;
use courier_config::CourierConfig;
use courier_queue::QueueClass;
use std::path::PathBuf;
use std::time::Duration;

mod commands;
mod error;
mod setup;

use commands::{config, enqueue, inspect, render, worker};
use error::CliResult;

/// Courier - queued, templated email delivery
#[derive(Parser)]
#[command(name = "courier")]
#[command(version)]
#[command(about = "Queue, render and deliver templated email")]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (TOML or JSON)
    #[arg(short, long, global = true, env = "COURIER_CONFIG")]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the delivery worker pool until Ctrl-C
    #[command(alias = "w")]
    Worker {
        /// Override worker.concurrency
        #[arg(long)]
        concurrency: Option<usize>,
    },

    /// Queue an email delivery task
    #[command(alias = "send")]
    Enqueue(EnqueueArgs),

    /// Show per-class queue counts
    Stats {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// List tasks that exhausted their attempts
    #[command(alias = "dlq")]
    DeadLetters {
        /// Maximum number of tasks to show
        #[arg(short, long, default_value = "20")]
        limit: usize,

        /// Print JSON instead of a listing
        #[arg(long)]
        json: bool,
    },

    /// Return tasks stuck in Processing to the queue
    Recover {
        /// Age in seconds after which a task counts as stale (defaults to queue.stale_after_secs)
        #[arg(long)]
        older_than: Option<u64>,
    },

    /// Render a template with a context and print HTML and text
    Render(RenderArgs),

    /// Print the effective configuration, secrets masked
    Config {
        /// Print JSON instead of TOML
        #[arg(long)]
        json: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ClassArg {
    Critical,
    Default,
    Low,
}

impl From<ClassArg> for QueueClass {
    fn from(class: ClassArg) -> Self {
        match class {
            ClassArg::Critical => QueueClass::Critical,
            ClassArg::Default => QueueClass::Default,
            ClassArg::Low => QueueClass::Low,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum PartArg {
    Both,
    Html,
    Text,
}

#[derive(Args)]
struct ContextArgs {
    /// Template context as a JSON object
    #[arg(long)]
    context: Option<String>,

    /// Template variable, repeatable
    #[arg(long = "var", value_name = "KEY=VALUE")]
    vars: Vec<String>,
}

#[derive(Args)]
struct EnqueueArgs {
    /// Recipient, repeatable ("Name <email>" or a bare address)
    #[arg(long, required = true)]
    to: Vec<String>,

    /// Carbon-copy recipient, repeatable
    #[arg(long)]
    cc: Vec<String>,

    /// Blind carbon-copy recipient, repeatable
    #[arg(long)]
    bcc: Vec<String>,

    /// Subject line
    #[arg(short, long)]
    subject: String,

    /// Template name (e.g. verify-email)
    #[arg(short, long)]
    template: String,

    /// Priority class
    #[arg(long, value_enum, default_value = "default")]
    class: ClassArg,

    /// File to attach, repeatable
    #[arg(long)]
    attach: Vec<PathBuf>,

    /// Store the configured SMTP settings in the task
    #[arg(long)]
    embed_smtp: bool,

    #[command(flatten)]
    context: ContextArgs,
}

#[derive(Args)]
struct RenderArgs {
    /// Template name
    template: String,

    /// Template directory (defaults to mail.template_dir)
    #[arg(long)]
    dir: Option<PathBuf>,

    /// Which part to print
    #[arg(long, value_enum, default_value = "both")]
    part: PartArg,

    #[command(flatten)]
    context: ContextArgs,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let mut log = courier_log::LogConfig::from_env();
    if cli.verbose {
        log = log.with_level(courier_log::Level::Debug);
    }
    let _ = courier_log::try_init_with(&log);

    if let Err(e) = run(cli).await {
        eprintln!("{} {}", "error:".red().bold(), e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> CliResult<()> {
    let config = CourierConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Worker { concurrency } => worker::run(&config, concurrency).await,
        Commands::Enqueue(args) => {
            let request = enqueue::EnqueueRequest {
                class: args.class.into(),
                to: args.to,
                cc: args.cc,
                bcc: args.bcc,
                subject: args.subject,
                template: args.template,
                context: setup::template_context(args.context.context.as_deref(), &args.context.vars)?,
                attachments: args.attach,
                embed_smtp: args.embed_smtp,
            };
            enqueue::run(&config, request).await
        }
        Commands::Stats { json } => inspect::stats(&config, json).await,
        Commands::DeadLetters { limit, json } => inspect::dead_letters(&config, limit, json).await,
        Commands::Recover { older_than } => {
            inspect::recover(&config, older_than.map(Duration::from_secs)).await
        }
        Commands::Render(args) => {
            let context = setup::template_context(args.context.context.as_deref(), &args.context.vars)?;
            let dir = args.dir.unwrap_or_else(|| config.mail.template_dir.clone());
            let part = match args.part {
                PartArg::Both => render::RenderPart::Both,
                PartArg::Html => render::RenderPart::Html,
                PartArg::Text => render::RenderPart::Text,
            };
            render::run(&dir, &args.template, &context, part)
        }
        Commands::Config { json } => config::run(&config, json),
    }
}
