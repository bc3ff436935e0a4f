mod commands;

use std::path::PathBuf;

use anyhow::Context as _;
use clap::{Parser, Subcommand, ValueEnum};
use threadloom_config::ConfigLoader;
use threadloom_security::RedactingWriter;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "threadloom")]
#[command(about = "Answer Slack mentions, DMs and threads with Amazon Bedrock models")]
#[command(version)]
struct Cli {
    /// Path to config file (default: ~/.threadloom/config.yml)
    #[arg(short, long, global = true, env = "THREADLOOM_CONFIG")]
    config: Option<PathBuf>,

    /// Log output format
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// Run the Slack Events API gateway
    Serve {
        /// Listen address (overrides gateway.bind)
        #[arg(long)]
        bind: Option<String>,
    },
    /// List the model catalog
    Models {
        /// Also print region, storage path and the effective default model
        #[arg(long)]
        debug: bool,
    },
    /// Inspect or change a user's preferences
    Prefs {
        #[command(subcommand)]
        action: PrefsAction,
    },
}

#[derive(Subcommand)]
enum PrefsAction {
    /// Show the stored preferences for a user
    Get { user: String },
    /// Set the preferred model for a user
    SetModel { user: String, model: String },
    /// Set a custom system prompt for a user and model
    SetPrompt {
        user: String,
        model: String,
        prompt: String,
    },
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(RedactingWriter::stderr());

    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    let loader = ConfigLoader::new(cli.config.unwrap_or_else(ConfigLoader::default_path));
    let config = loader
        .load()
        .with_context(|| format!("failed to load config from {}", loader.path().display()))?;
    debug!(
        path = %loader.path().display(),
        models = config.models.entries().len(),
        "configuration loaded"
    );

    match cli.command {
        Command::Serve { bind } => commands::serve(config, bind).await,
        Command::Models { debug } => {
            print!("{}", commands::render_models(&config, debug));
            Ok(())
        }
        Command::Prefs { action } => {
            let prefs = threadloom_gateway::bootstrap::open_preferences(&config)
                .context("failed to open preference store")?;
            let output = match action {
                PrefsAction::Get { user } => commands::show_preferences(&prefs, &config, &user)?,
                PrefsAction::SetModel { user, model } => {
                    commands::set_model(&prefs, &config, &user, &model)?
                }
                PrefsAction::SetPrompt {
                    user,
                    model,
                    prompt,
                } => commands::set_prompt(&prefs, &user, &model, &prompt)?,
            };
            println!("{output}");
            Ok(())
        }
    }
}
