//! CLI entry and dispatch.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use freme_core::{config, logging};

mod commands;

#[derive(Parser)]
#[command(name = "freme")]
#[command(version)]
#[command(about = "Terminal client for the freme social-messaging backend")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug logging for freme (FREME_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,
}

/// Backend location, defaulting to the configured host.
#[derive(clap::Args, Debug, Clone, Default)]
struct HostArgs {
    /// Backend host (e.g. social.example.com); defaults to the configured host
    #[arg(long)]
    host: Option<String>,

    /// Protocol used to reach the host (http or https)
    #[arg(long)]
    protocol: Option<String>,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Create an account with e-mail and password
    Signup {
        #[command(flatten)]
        target: HostArgs,
        #[arg(long)]
        email: String,
        /// Display name
        #[arg(long)]
        name: String,
        #[arg(long)]
        handle: String,
        #[arg(long, env = "FREME_PASSWORD", hide_env_values = true)]
        password: String,
    },

    /// Log in with e-mail and password
    Login {
        #[command(flatten)]
        target: HostArgs,
        #[arg(long)]
        email: String,
        #[arg(long, env = "FREME_PASSWORD", hide_env_values = true)]
        password: String,
    },

    /// Sign out and forget the stored session
    Logout,

    /// Show who the stored session belongs to
    Whoami,

    /// Sign in with an identity-provider ID token
    Token {
        /// ID token issued by the identity provider
        #[arg(value_name = "ID_TOKEN")]
        id_token: String,
        #[command(flatten)]
        target: HostArgs,
        /// Display name reported by the identity provider
        #[arg(long, required_unless_present = "email")]
        name: Option<String>,
        /// E-mail reported by the identity provider
        #[arg(long)]
        email: Option<String>,
    },

    /// Create the backend profile for a token sign-in
    CreateProfile {
        #[arg(long)]
        display_name: String,
        #[arg(long)]
        handle: String,
    },

    /// Read and write messages
    Message {
        #[command(subcommand)]
        command: MessageCommands,
    },

    /// Manage connections
    Connection {
        #[command(subcommand)]
        command: ConnectionCommands,
    },

    /// Poll connection info and print it whenever it changes
    Watch {
        /// Override the configured poll interval
        #[arg(long, value_name = "SECS")]
        interval_secs: Option<u64>,

        /// Also print new messages from connections with unread messages
        #[arg(long)]
        follow: bool,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(clap::Subcommand)]
enum MessageCommands {
    /// Lists your own messages
    Get,
    /// Posts a new message
    Post {
        #[arg(value_name = "TEXT")]
        text: String,
        /// Attach a file (repeatable)
        #[arg(long = "file", value_name = "PATH")]
        files: Vec<PathBuf>,
    },
    /// Comments on a message received through a connection
    Comment {
        #[arg(value_name = "CONNECTION_ID")]
        connection_id: String,
        #[arg(value_name = "MESSAGE_ID")]
        message_id: String,
        #[arg(value_name = "TEXT")]
        text: String,
        /// Attach a file (repeatable)
        #[arg(long = "file", value_name = "PATH")]
        files: Vec<PathBuf>,
    },
    /// Marks a received message as read
    Read {
        #[arg(value_name = "MESSAGE_ID")]
        message_id: String,
    },
}

#[derive(clap::Subcommand)]
enum ConnectionCommands {
    /// Lists pending and existing connections
    List,
    /// Asks handle@host to connect
    Request {
        #[arg(value_name = "HANDLE")]
        handle: String,
        #[arg(value_name = "HOST")]
        host: String,
    },
    /// Accepts a pending connection
    Accept {
        #[arg(value_name = "ID")]
        id: String,
    },
    /// Declines a pending connection
    Decline {
        #[arg(value_name = "ID")]
        id: String,
    },
    /// Removes a connection
    Delete {
        #[arg(value_name = "ID")]
        id: String,
    },
    /// Shows the messages a connection shared with you
    Messages {
        #[arg(value_name = "ID")]
        id: String,
        /// Mark each message read after the dwell delay
        #[arg(long)]
        mark_read: bool,
    },
}

#[derive(clap::Subcommand)]
enum ConfigCommands {
    /// Show the path to the config file
    Path,
    /// Initialize a default config file (if not present)
    Init,
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    // one tokio runtime for everything
    let rt = tokio::runtime::Runtime::new().context("create tokio runtime")?;
    rt.block_on(async move { dispatch(cli).await })
}

async fn dispatch(cli: Cli) -> Result<()> {
    let config = config::Config::load().context("load config")?;
    let _log_guard = logging::init(&config, cli.verbose).context("init logging")?;
    tracing::debug!(home = %config::paths::freme_home().display(), "freme starting");

    match cli.command {
        Commands::Signup {
            target,
            email,
            name,
            handle,
            password,
        } => {
            commands::auth::signup(
                &config,
                &commands::Target::from(target),
                &commands::auth::SignupArgs {
                    email: &email,
                    display_name: &name,
                    handle: &handle,
                    password: &password,
                },
            )
            .await
        }
        Commands::Login {
            target,
            email,
            password,
        } => {
            let target = commands::Target::from(target);
            commands::auth::login(&config, &target, &email, &password).await
        }
        Commands::Logout => commands::auth::logout(&config).await,
        Commands::Whoami => commands::auth::whoami(&config).await,
        Commands::Token {
            id_token,
            target,
            name,
            email,
        } => {
            let target = commands::Target::from(target);
            commands::auth::token(&config, &target, id_token, name, email).await
        }
        Commands::CreateProfile {
            display_name,
            handle,
        } => commands::auth::create_profile(&config, &display_name, &handle).await,

        Commands::Message { command } => match command {
            MessageCommands::Get => commands::messages::get(&config).await,
            MessageCommands::Post { text, files } => {
                commands::messages::post(&config, &text, &files).await
            }
            MessageCommands::Comment {
                connection_id,
                message_id,
                text,
                files,
            } => {
                commands::messages::comment(&config, &connection_id, &message_id, &text, &files)
                    .await
            }
            MessageCommands::Read { message_id } => {
                commands::messages::read(&config, &message_id).await
            }
        },

        Commands::Connection { command } => match command {
            ConnectionCommands::List => commands::connections::list(&config).await,
            ConnectionCommands::Request { handle, host } => {
                commands::connections::request(&config, &handle, &host).await
            }
            ConnectionCommands::Accept { id } => {
                commands::connections::manage(&config, &id, commands::connections::Action::Accept)
                    .await
            }
            ConnectionCommands::Decline { id } => {
                commands::connections::manage(&config, &id, commands::connections::Action::Decline)
                    .await
            }
            ConnectionCommands::Delete { id } => {
                commands::connections::manage(&config, &id, commands::connections::Action::Delete)
                    .await
            }
            ConnectionCommands::Messages { id, mark_read } => {
                commands::connections::messages(&config, &id, mark_read).await
            }
        },

        Commands::Watch {
            interval_secs,
            follow,
        } => commands::watch::run(&config, interval_secs, follow).await,

        Commands::Config { command } => match command {
            ConfigCommands::Path => {
                commands::config::path();
                Ok(())
            }
            ConfigCommands::Init => commands::config::init(),
        },
    }
}

impl From<HostArgs> for commands::Target {
    fn from(args: HostArgs) -> Self {
        commands::Target {
            host: args.host,
            protocol: args.protocol,
        }
    }
}
