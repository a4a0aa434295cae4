use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use tokio_stream::StreamExt;
use tracing_subscriber::EnvFilter;

use popup_genius_core::config::{Config, LoggingConfig};
use popup_genius_core::types::OptimizationRequest;
use popup_genius_gateway::GatewayState;
use popup_genius_tools::{
    DataSources, analyze_competitors, analyze_popup_history, analyze_transaction_data,
};

#[derive(Parser)]
#[command(
    name = "popup-genius",
    about = "Streaming popup optimization backend",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP/WebSocket server
    Serve {
        /// Port to listen on (default: 8000)
        #[arg(long)]
        port: Option<u16>,

        /// Address to bind (default: 0.0.0.0)
        #[arg(long)]
        bind: Option<String>,
    },

    /// Run one analysis and print the stream
    Analyze {
        /// Business description
        description: String,

        /// Optimization goals
        #[arg(long)]
        goals: Option<String>,

        /// Print every event as a JSON line instead of the text only
        #[arg(long)]
        json: bool,
    },

    /// Run a single analysis tool and print its result
    Tool {
        #[arg(value_enum)]
        name: ToolName,

        /// Business description
        description: String,

        /// Industry override for the competitor analysis
        #[arg(long)]
        industry: Option<String>,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ToolName {
    PopupHistory,
    Transactions,
    Competitors,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show current configuration
    Show,
    /// Check the configuration for problems
    Validate,
    /// Get a specific config value by dotted path
    Get { key: String },
}

/// Install the tracing subscriber. `RUST_LOG` wins over the config file.
fn init_logging(logging: Option<&LoggingConfig>, verbose: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = if verbose {
            "debug".to_string()
        } else {
            logging
                .and_then(|l| l.level.clone())
                .unwrap_or_else(|| "info".to_string())
        };
        let mut filter = EnvFilter::new(level);
        for directive in logging.map(|l| l.filters.as_slice()).unwrap_or_default() {
            match directive.parse() {
                Ok(d) => filter = filter.add_directive(d),
                Err(e) => eprintln!("Ignoring log filter {directive:?}: {e}"),
            }
        }
        filter
    });

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if logging.is_some_and(|l| l.format == "json") {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let _ = dotenvy::dotenv();

    // Load config
    let config_path = cli
        .config
        .map(PathBuf::from)
        .unwrap_or_else(Config::default_path);

    let config = Config::load(&config_path)?;
    init_logging(config.logging.as_ref(), cli.verbose);

    match cli.command {
        Commands::Serve { port, bind } => {
            let port = port.unwrap_or_else(|| config.gateway_port());
            let bind = bind.unwrap_or_else(|| config.gateway_bind());
            tracing::info!(
                environment = config.environment.as_deref().unwrap_or("dev"),
                provider = %config.provider_config().id,
                model = %config.model(),
                "Starting PopupGenius on {bind}:{port}"
            );
            let (warnings, _) = config.validate();
            for warning in warnings {
                tracing::warn!("{warning}");
            }
            let state = Arc::new(GatewayState::from_config(config)?);
            popup_genius_gateway::start_gateway(state, &bind, port).await?;
        }
        Commands::Analyze {
            description,
            goals,
            json,
        } => {
            let request = OptimizationRequest {
                business_description: description,
                optimization_goals: goals.unwrap_or_default(),
            };
            let state = GatewayState::from_config(config)?;
            let mut events = state.optimizer.stream(request.agent_input());
            while let Some(event) = events.next().await {
                if json {
                    println!("{}", serde_json::to_string(&event)?);
                } else if let Some(text) = event.as_text_chunk() {
                    print!("{text}");
                }
            }
            if !json {
                println!();
            }
        }
        Commands::Tool {
            name,
            description,
            industry,
        } => {
            let sources = DataSources::from_config(&config.tools_config());
            let result = match name {
                ToolName::PopupHistory => {
                    serde_json::to_value(analyze_popup_history(&description, &sources))?
                }
                ToolName::Transactions => {
                    serde_json::to_value(analyze_transaction_data(&description, &sources))?
                }
                ToolName::Competitors => serde_json::to_value(analyze_competitors(
                    &description,
                    industry.as_deref(),
                ))?,
            };
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Commands::Config { action } => match action {
            ConfigAction::Show => {
                let json = serde_json::to_string_pretty(&config)?;
                println!("{json}");
            }
            ConfigAction::Validate => {
                let (warnings, errors) = config.validate();
                for warning in &warnings {
                    println!("warning: {warning}");
                }
                for error in &errors {
                    println!("error: {error}");
                }
                if !errors.is_empty() {
                    anyhow::bail!("{} configuration error(s) in {}", errors.len(), config_path.display());
                }
                println!("Config OK: {}", config_path.display());
            }
            ConfigAction::Get { key } => match config.get_path(&key) {
                Some(value) => println!("{}", serde_json::to_string_pretty(&value)?),
                None => anyhow::bail!("No config value at {key}"),
            },
        },
    }

    Ok(())
}
