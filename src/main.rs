use anyhow::Result;
use clap::Parser;
use ragctl::{
    backend::{ChatbotSettings, RetrievalParameters},
    commands::{self, DEFAULT_HISTORY_LIMIT, SetupPlan, config::Config, config::ConnectionOptions},
    http::MAX_RETRIES,
    runtime::RealRuntime,
};
use std::path::PathBuf;
use std::time::Duration;

/// ragctl - operator console for a RAG backend
///
/// Create users, chatbots and knowledge bases, upload documents, tune
/// retrieval and chat with the backend. Every request is retried when the
/// server (or the tunnel in front of it) answers 502 Bad Gateway or the
/// connection fails.
///
/// Ids created by one command are passed to the next through flags or the
/// matching RAGCTL_* environment variables; `ragctl setup` prints them.
///
/// Examples:
///   ragctl -s https://abc.ngrok.io setup --user alice --chatbot helper --kb docs
///   ragctl kb upload handbook.pdf
///   ragctl ask "How do refunds work?"
#[derive(Parser, Debug)]
#[command(author, version = env!("RAGCTL_VERSION"), about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    connection: ConnectionArgs,
}

#[derive(clap::Args, Debug)]
struct ConnectionArgs {
    /// Backend base URL
    #[arg(
        long = "server-url",
        short = 's',
        env = "RAGCTL_SERVER_URL",
        value_name = "URL",
        global = true
    )]
    server_url: Option<String>,

    /// Existing user id
    #[arg(long = "user-id", env = "RAGCTL_USER_ID", value_name = "ID", global = true)]
    user_id: Option<String>,

    /// Existing chatbot id
    #[arg(
        long = "chatbot-id",
        env = "RAGCTL_CHATBOT_ID",
        value_name = "ID",
        global = true
    )]
    chatbot_id: Option<String>,

    /// Existing knowledge base id
    #[arg(long = "kb-id", env = "RAGCTL_KB_ID", value_name = "ID", global = true)]
    kb_id: Option<String>,

    /// Attempts per request before giving up
    #[arg(
        long = "max-retries",
        env = "RAGCTL_MAX_RETRIES",
        value_name = "N",
        default_value_t = MAX_RETRIES,
        value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..),
        global = true
    )]
    max_retries: usize,

    /// Seconds to wait between attempts
    #[arg(
        long = "retry-delay",
        env = "RAGCTL_RETRY_DELAY",
        value_name = "SECONDS",
        default_value = "2",
        value_parser = parse_seconds,
        global = true
    )]
    retry_delay: Duration,

    /// Per-attempt connect and read timeout in seconds
    #[arg(
        long = "timeout",
        env = "RAGCTL_TIMEOUT",
        value_name = "SECONDS",
        default_value = "60",
        value_parser = parse_seconds,
        global = true
    )]
    timeout: Duration,

    /// Fail instead of returning the last 502 response once retries run out
    #[arg(long = "fail-on-exhausted", global = true)]
    fail_on_exhausted: bool,
}

impl ConnectionArgs {
    fn into_options(self) -> ConnectionOptions {
        ConnectionOptions {
            server_url: self.server_url,
            user_id: self.user_id,
            chatbot_id: self.chatbot_id,
            kb_id: self.kb_id,
            max_retries: self.max_retries,
            retry_delay: self.retry_delay,
            timeout: self.timeout,
            fail_on_exhausted: self.fail_on_exhausted,
        }
    }
}

fn parse_seconds(s: &str) -> Result<Duration, String> {
    let secs: f64 = s
        .trim()
        .parse()
        .map_err(|_| format!("'{}' is not a number of seconds", s))?;
    Duration::try_from_secs_f64(secs).map_err(|_| format!("'{}' is not a valid duration", s))
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Manage users
    User {
        #[command(subcommand)]
        command: UserCommand,
    },

    /// Manage chatbots
    Chatbot {
        #[command(subcommand)]
        command: ChatbotCommand,
    },

    /// Manage knowledge bases and their documents
    Kb {
        #[command(subcommand)]
        command: KbCommand,
    },

    /// Create user, chatbot and knowledge base in one go
    Setup(SetupArgs),

    /// Ask a single question
    Ask(AskArgs),

    /// Chat interactively
    Chat(ChatArgs),

    /// Tune retrieval parameters
    Params {
        #[command(subcommand)]
        command: ParamsCommand,
    },

    /// Show the latest conversation history
    History(HistoryArgs),
}

#[derive(clap::Subcommand, Debug)]
enum UserCommand {
    /// Create a new user
    Create {
        #[arg(value_name = "NAME")]
        name: String,
    },
}

#[derive(clap::Subcommand, Debug)]
enum ChatbotCommand {
    /// Create a chatbot for --user-id
    Create {
        #[arg(value_name = "NAME")]
        name: String,

        #[arg(long, default_value = "")]
        description: String,
    },

    /// Update generation settings of --chatbot-id
    Configure(ConfigureArgs),
}

#[derive(clap::Args, Debug)]
struct ConfigureArgs {
    /// Sampling temperature (0.0 - 1.0)
    #[arg(long, default_value_t = 0.5)]
    temperature: f64,

    /// Maximum answer length (100 - 4000)
    #[arg(long = "max-tokens", default_value_t = 2000)]
    max_tokens: u32,

    /// Number of results to retrieve (1 - 20)
    #[arg(long, default_value_t = 10)]
    k: u32,
}

#[derive(clap::Subcommand, Debug)]
enum KbCommand {
    /// Create a knowledge base for --chatbot-id
    Create {
        #[arg(value_name = "NAME")]
        name: String,

        #[arg(long, default_value = "")]
        description: String,
    },

    /// Upload a txt, csv or pdf document into --kb-id
    Upload {
        #[arg(value_name = "FILE")]
        path: PathBuf,
    },
}

#[derive(clap::Args, Debug)]
struct SetupArgs {
    /// Name of the user to create (skipped with --user-id)
    #[arg(long = "user", value_name = "NAME")]
    user_name: Option<String>,

    /// Name of the chatbot to create (skipped with --chatbot-id)
    #[arg(long = "chatbot", value_name = "NAME")]
    chatbot_name: Option<String>,

    #[arg(long = "chatbot-description", default_value = "")]
    chatbot_description: String,

    /// Name of the knowledge base to create (skipped with --kb-id)
    #[arg(long = "kb", value_name = "NAME")]
    kb_name: Option<String>,

    #[arg(long = "kb-description", default_value = "")]
    kb_description: String,
}

#[derive(clap::Args, Debug)]
struct AskArgs {
    #[arg(value_name = "QUERY")]
    query: String,

    /// Keywords to steer retrieval
    #[arg(long)]
    keywords: Option<String>,
}

#[derive(clap::Args, Debug)]
struct ChatArgs {
    /// Keywords to steer retrieval for every question
    #[arg(long)]
    keywords: Option<String>,
}

#[derive(clap::Subcommand, Debug)]
enum ParamsCommand {
    /// Send retrieval parameters to the backend
    Set(ParamsArgs),
}

#[derive(clap::Args, Debug)]
struct ParamsArgs {
    /// Sampling temperature (0.0 - 1.0)
    #[arg(long, default_value_t = 0.5)]
    temperature: f64,

    /// Number of chunks to retrieve (1 - 20)
    #[arg(long, default_value_t = 10)]
    k: u32,

    /// Overlap between chunks, in tokens
    #[arg(long = "chunk-overlap", default_value_t = 0)]
    chunk_overlap: u32,

    /// Reranking strategy understood by the backend
    #[arg(long = "rerank-method", default_value = "none")]
    rerank_method: String,

    #[arg(long)]
    keywords: Option<String>,
}

#[derive(clap::Args, Debug)]
struct HistoryArgs {
    /// Number of entries to show
    #[arg(long, default_value_t = DEFAULT_HISTORY_LIMIT)]
    limit: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();
    let options = cli.connection.into_options();

    let Config {
        runtime,
        backend,
        mut session,
    } = Config::new(RealRuntime, &options)?;

    match cli.command {
        Commands::User {
            command: UserCommand::Create { name },
        } => {
            commands::create_user(&backend, &mut session, &name).await?;
        }
        Commands::Chatbot { command } => match command {
            ChatbotCommand::Create { name, description } => {
                commands::create_chatbot(&backend, &mut session, &name, &description).await?;
            }
            ChatbotCommand::Configure(args) => {
                let settings = ChatbotSettings {
                    temperature: args.temperature,
                    max_tokens: args.max_tokens,
                    k: args.k,
                };
                commands::configure_chatbot(&backend, &session, &settings).await?
            }
        },
        Commands::Kb { command } => match command {
            KbCommand::Create { name, description } => {
                commands::create_knowledge_base(&backend, &mut session, &name, &description)
                    .await?;
            }
            KbCommand::Upload { path } => {
                commands::upload_document(&runtime, &backend, &session, &path).await?
            }
        },
        Commands::Setup(args) => {
            let plan = SetupPlan {
                user_name: args.user_name,
                chatbot_name: args.chatbot_name,
                chatbot_description: args.chatbot_description,
                kb_name: args.kb_name,
                kb_description: args.kb_description,
            };
            commands::setup(&backend, &mut session, &plan).await?
        }
        Commands::Ask(args) => {
            commands::ask(&backend, &mut session, &args.query, args.keywords.as_deref()).await?
        }
        Commands::Chat(args) => {
            commands::chat(&runtime, &backend, &mut session, args.keywords.as_deref()).await?
        }
        Commands::Params {
            command: ParamsCommand::Set(args),
        } => {
            let params = RetrievalParameters {
                temperature: args.temperature,
                k: args.k,
                chunk_overlap: args.chunk_overlap,
                rerank_method: args.rerank_method,
                keywords: args.keywords.filter(|k| !k.trim().is_empty()),
            };
            commands::set_parameters(&backend, &params).await?
        }
        Commands::History(args) => commands::show_history(&backend, args.limit).await?,
    }
    Ok(())
}
