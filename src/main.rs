//! research-stream CLI - Run deep research tasks from the terminal

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use research_stream::{
    config::Config,
    metrics::StreamMetrics,
    reconnect::{Reconnector, RetryPolicy},
    research::ResearchAgent,
    stream::{StreamClient, StreamOptions},
    tui::{renderer::TerminalRenderer, spinner::ResearchSpinner, StreamView},
};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "research-stream")]
#[command(about = "Stream background deep research tasks with automatic reconnection")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbosity level
    #[arg(short, long, default_value = "warn")]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Stream a research task as it runs
    Stream {
        /// Research question or topic
        query: String,

        /// Do not request thought summaries
        #[arg(long)]
        no_thoughts: bool,

        /// Give up on the first transport failure
        #[arg(long)]
        no_reconnect: bool,

        /// Report unrecognized stream chunks as errors
        #[arg(long)]
        strict: bool,

        /// API key (default: from config or GOOGLE_API_KEY)
        #[arg(long)]
        api_key: Option<String>,
    },

    /// Start a background task and poll until it finishes
    Run {
        /// Research question or topic
        query: String,

        /// Output format instructions appended to the query
        #[arg(short, long)]
        format: Option<String>,

        /// API key (default: from config or GOOGLE_API_KEY)
        #[arg(long)]
        api_key: Option<String>,
    },

    /// Ask a question about a finished task
    FollowUp {
        /// Interaction id of the finished task
        interaction_id: String,

        /// The follow-up question
        question: String,

        /// Model to answer with
        #[arg(short, long)]
        model: Option<String>,

        /// API key (default: from config or GOOGLE_API_KEY)
        #[arg(long)]
        api_key: Option<String>,
    },

    /// Manage configuration
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Initialize configuration file with defaults
    Init {
        /// Overwrite existing config
        #[arg(long)]
        force: bool,
    },

    /// Show current configuration
    Show,

    /// Show configuration file path
    Path,

    /// Validate configuration
    Validate,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let log_level = match cli.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::WARN,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Stream {
            query,
            no_thoughts,
            no_reconnect,
            strict,
            api_key,
        } => {
            run_stream(query, no_thoughts, no_reconnect, strict, api_key).await?;
        }
        Commands::Run {
            query,
            format,
            api_key,
        } => {
            run_poll(query, format, api_key).await?;
        }
        Commands::FollowUp {
            interaction_id,
            question,
            model,
            api_key,
        } => {
            run_follow_up(interaction_id, question, model, api_key).await?;
        }
        Commands::Config(cmd) => {
            run_config_command(cmd)?;
        }
    }

    Ok(())
}

/// Config file plus any key given on the command line
fn load_config(api_key: Option<String>) -> Result<Config> {
    let mut config = Config::load()?;
    if let Some(key) = api_key {
        config.api.api_key = Some(key);
    }
    config.validate()?;
    Ok(config)
}

async fn run_stream(
    query: String,
    no_thoughts: bool,
    no_reconnect: bool,
    strict: bool,
    api_key: Option<String>,
) -> Result<()> {
    let mut config = load_config(api_key)?;
    if strict {
        config.stream.strict_decoding = true;
    }
    let include_thoughts = config.stream.include_thoughts && !no_thoughts;

    let client = StreamClient::from_config(&config)?;
    let policy = if no_reconnect {
        RetryPolicy::no_retry()
    } else {
        RetryPolicy::from(&config.reconnect)
    };
    info!("Streaming research with policy {:?}", policy);

    let metrics = StreamMetrics::new();
    let events = Reconnector::with_client(client, policy)
        .with_metrics(metrics.clone())
        .stream(&query, StreamOptions { include_thoughts });

    let mut view = StreamView::new(include_thoughts);
    view.renderer()
        .render_banner(env!("CARGO_PKG_VERSION"), "stream", &query);
    let outcome = view.run(events).await;
    view.renderer().render_summary(&metrics.summary());

    if let Some(id) = &outcome.interaction_id {
        view.renderer()
            .render_info(&format!("Interaction id: {} (use with follow-up)", id));
    }
    if !outcome.completed {
        bail!(
            "Research did not complete: {}",
            outcome.error.unwrap_or_else(|| "stream ended".to_string())
        );
    }
    Ok(())
}

async fn run_poll(query: String, format: Option<String>, api_key: Option<String>) -> Result<()> {
    let config = load_config(api_key)?;
    let agent = ResearchAgent::from_config(&config)?;

    let mut renderer = TerminalRenderer::new();
    renderer.render_banner(env!("CARGO_PKG_VERSION"), "poll", &query);

    let mut spinner = ResearchSpinner::new();
    spinner.start("Starting research...");
    let on_status = |status, elapsed| spinner.update(&renderer.status_message(status, elapsed));

    let result = match format {
        Some(format) => agent.run_with_format(&query, &format, on_status).await,
        None => agent.run(&query, on_status).await,
    };
    spinner.stop();
    let result = result?;

    if !result.is_success() {
        bail!(
            "Research {} failed: {}",
            result.id,
            result.error.unwrap_or_default()
        );
    }

    renderer.render_markdown(&result.report);
    renderer.render_citations(&result.citations);
    renderer.render_info(&format!(
        "Interaction id: {} ({:.0}s)",
        result.id,
        result.elapsed.as_secs_f64()
    ));
    Ok(())
}

async fn run_follow_up(
    interaction_id: String,
    question: String,
    model: Option<String>,
    api_key: Option<String>,
) -> Result<()> {
    let config = load_config(api_key)?;
    let agent = ResearchAgent::from_config(&config)?;

    let mut spinner = ResearchSpinner::new();
    spinner.start("Asking follow-up...");
    let answer = agent
        .follow_up(&interaction_id, &question, model.as_deref())
        .await;
    spinner.stop();

    let mut renderer = TerminalRenderer::new();
    renderer.render_markdown(&answer?);
    Ok(())
}

fn run_config_command(cmd: ConfigCommands) -> Result<()> {
    match cmd {
        ConfigCommands::Init { force } => {
            config_init(force)?;
        }
        ConfigCommands::Show => {
            config_show()?;
        }
        ConfigCommands::Path => {
            config_path();
        }
        ConfigCommands::Validate => {
            config_validate()?;
        }
    }
    Ok(())
}

fn config_init(force: bool) -> Result<()> {
    let path = Config::default_path();

    if path.exists() && !force {
        println!("Configuration file already exists at: {}", path.display());
        println!("Use --force to overwrite");
        return Ok(());
    }

    let config = Config::default();
    config.save()?;

    println!("Configuration file created at: {}", path.display());
    println!();
    println!("Next steps:");
    println!("  1. Add api_key under [api] in the config file, or");
    println!("  2. Set the environment variable:");
    println!("     export GOOGLE_API_KEY=your_key");

    Ok(())
}

fn config_show() -> Result<()> {
    let mut config = Config::load()?;

    // Mask API keys in display
    if config.api.api_key.is_some() {
        config.api.api_key = Some("***".to_string());
    }
    println!("{}", toml::to_string_pretty(&config)?);

    println!("\n--- Environment Variables ---");
    let key_env = &config.api.api_key_env;
    println!(
        "{}: {}",
        key_env,
        if std::env::var(key_env).is_ok() { "set" } else { "not set" }
    );
    for name in [
        research_stream::config::BASE_URL_ENV,
        research_stream::config::AGENT_ID_ENV,
    ] {
        println!(
            "{}: {}",
            name,
            std::env::var(name).unwrap_or_else(|_| "not set".to_string())
        );
    }

    Ok(())
}

fn config_path() {
    let path = Config::default_path();
    println!("{}", path.display());

    if path.exists() {
        println!("(file exists)");
    } else {
        println!("(file does not exist - run 'config init' to create)");
    }
}

fn config_validate() -> Result<()> {
    let config = Config::read(&Config::default_path())?;

    match config.validate() {
        Ok(()) => {
            println!("Configuration is valid!");
            println!();
            println!("Agent: {}", config.api.agent_id);
            println!("Endpoint: {}", config.api.base_url);
            match config.api_key() {
                Ok(_) => println!("API key: found"),
                Err(e) => println!("API key: {}", e),
            }
            println!(
                "Reconnect: up to {} attempt(s), {:?} backoff from {}ms",
                config.reconnect.max_attempts,
                config.reconnect.backoff,
                config.reconnect.retry_delay_ms
            );
        }
        Err(e) => {
            println!("Configuration validation failed:");
            println!("  {}", e);
        }
    }

    Ok(())
}
