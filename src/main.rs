use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use toolbar_chat::cli::{ask, chat, context, history, settings};
use toolbar_chat::config::Config;
use toolbar_chat::store::{ChatStore, SearchMode};

#[derive(Parser)]
#[command(name = "toolbar-chat")]
#[command(about = "Chat assistant with reusable contexts and searchable local history")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long)]
    config: Option<String>,

    /// Log debug output to stderr
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Send a single query and print the reply
    Ask {
        /// The query text
        query: String,

        /// Context name to use as the system prompt
        #[arg(long)]
        context: Option<String>,

        /// Record the exchange on an existing thread
        #[arg(long)]
        thread: Option<i64>,
    },

    /// Start an interactive chat session
    Chat {
        /// Context name to start with
        #[arg(long)]
        context: Option<String>,

        /// Continue the most recent thread instead of starting a new one
        #[arg(long)]
        resume: bool,
    },

    /// Context management
    Context {
        #[command(subcommand)]
        command: ContextCommands,
    },

    /// Show stored messages, oldest first
    History {
        /// Only this thread
        #[arg(long)]
        thread: Option<i64>,

        /// Only messages sent with this context
        #[arg(long)]
        context: Option<String>,

        /// Maximum rows (defaults to max_history_items)
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Search message text, newest first
    Search {
        query: String,

        /// Where to look: all, user, assistant
        #[arg(short, long, default_value = "all")]
        mode: SearchMode,

        #[arg(short, long, default_value_t = 50)]
        limit: usize,
    },

    /// Settings
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
enum ContextCommands {
    /// Create a new context
    Add {
        name: String,
        /// System prompt text
        #[arg(long)]
        content: Option<String>,
        /// Read the system prompt from a file
        #[arg(short, long)]
        file: Option<String>,
    },
    /// List all contexts
    List,
    /// Print one context
    Show { name: String },
    /// Replace a context's content
    Edit {
        name: String,
        #[arg(long)]
        content: Option<String>,
        #[arg(short, long)]
        file: Option<String>,
    },
    /// Delete a context (messages that used it are kept)
    Delete { name: String },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Print the current settings
    Show,
    /// Change a setting: model, max-history, default-context, api-url, api-key, timeout
    Set { key: String, value: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    toolbar_chat::logging::init(cli.verbose);

    // Load config
    let config_path = cli
        .config
        .as_deref()
        .map(|p| PathBuf::from(shellexpand::tilde(p).to_string()))
        .unwrap_or_else(Config::default_path);
    let mut config = Config::load(&config_path.to_string_lossy())
        .context("Failed to load configuration")?;

    if let Commands::Config { command } = &cli.command {
        return match command {
            ConfigCommands::Show => settings::show(&config),
            ConfigCommands::Set { key, value } => {
                settings::set(&mut config, &config_path, key, value)
            }
        };
    }

    config.validate()?;

    // Initialize store
    let db_path = config.database_path();
    let store = Arc::new(
        ChatStore::open(&db_path)
            .with_context(|| format!("Failed to open database at {}", db_path.display()))?,
    );

    match cli.command {
        Commands::Ask {
            query,
            context,
            thread,
        } => {
            ask::run(store, &config, &query, context, thread).await?;
        }
        Commands::Chat { context, resume } => {
            chat::run(store, &config, context, resume).await?;
        }
        Commands::Context { command } => match command {
            ContextCommands::Add {
                name,
                content,
                file,
            } => {
                context::add(&store, name, content, file)?;
            }
            ContextCommands::List => {
                context::list(&store)?;
            }
            ContextCommands::Show { name } => {
                context::show(&store, &name)?;
            }
            ContextCommands::Edit {
                name,
                content,
                file,
            } => {
                context::edit(&store, &name, content, file)?;
            }
            ContextCommands::Delete { name } => {
                context::delete(&store, &name)?;
            }
        },
        Commands::History {
            thread,
            context,
            limit,
        } => {
            let limit = limit.unwrap_or(config.max_history_items);
            history::run(&store, thread, context, limit)?;
        }
        Commands::Search { query, mode, limit } => {
            history::search(&store, &query, mode, limit)?;
        }
        Commands::Config { .. } => {}
    }

    Ok(())
}
