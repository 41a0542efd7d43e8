use std::io::Write as _;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use ragchat::chat::transcript::{render_notice, render_transcript};
use ragchat::chat::{ChatController, Notice};
use ragchat::error::{
    ConfigureLiveSnafu, GatewaySnafu, NotAuthenticatedSnafu, SettingsSnafu, TerminalSnafu,
};
use ragchat::settings::{ClientSettings, SettingsStore};
use ragchat::ChatResult;
use ragchat_gateway::{
    AuthApi, ContextApi, ContextId, ConversationApi, ConversationId, HttpGateway, LoginRequest,
    Message, NewConversation, RegisterRequest, Session, TokenFile,
};
use ragchat_live::WsTransport;
use snafu::{ResultExt, ensure};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

const QUIT_COMMAND: &str = "/quit";

#[derive(Parser)]
#[command(name = "ragchat", version)]
#[command(about = "Chat with your document collections from the terminal")]
struct Cli {
    /// Backend REST base URL, overriding settings for this run
    #[arg(long, global = true)]
    api_base_url: Option<String>,

    /// Live update base URL (ws:// or wss://), overriding settings for this run
    #[arg(long, global = true)]
    live_base_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create an account and sign in
    Register {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long, env = "RAGCHAT_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Sign in and remember the session
    Login {
        #[arg(long)]
        email: String,
        #[arg(long, env = "RAGCHAT_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Forget the stored session
    Logout,
    /// Show the signed-in user
    Whoami,
    /// List available contexts
    Contexts,
    /// List your conversations
    Conversations,
    /// Start a conversation grounded on a context
    New {
        #[arg(long)]
        title: String,
        /// Context id, see `ragchat contexts`
        #[arg(long)]
        context: String,
    },
    /// Open an interactive chat in a conversation
    Chat { conversation_id: String },
    /// Show or change persisted settings
    Config(ConfigArgs),
}

#[derive(Args)]
struct ConfigArgs {
    #[arg(long)]
    api_base_url: Option<String>,
    #[arg(long)]
    live_base_url: Option<String>,
    /// Seconds to wait for a reply before giving up; 0 waits forever
    #[arg(long)]
    reply_timeout_secs: Option<u64>,
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            tracing::debug!(?error, "command failed");
            eprintln!("error: {error}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> ChatResult<()> {
    let store = SettingsStore::load();

    let mut settings = (*store.settings()).clone();
    if let Some(api_base_url) = cli.api_base_url {
        settings.api_base_url = api_base_url;
    }
    if let Some(live_base_url) = cli.live_base_url {
        settings.live_base_url = live_base_url;
    }
    let settings = settings.normalized();

    match cli.command {
        Command::Config(args) => configure(&store, args),
        command => run_backend_command(command, settings).await,
    }
}

fn configure(store: &SettingsStore, args: ConfigArgs) -> ChatResult<()> {
    let changed = args.api_base_url.is_some()
        || args.live_base_url.is_some()
        || args.reply_timeout_secs.is_some();

    if changed {
        store
            .update(|settings| {
                if let Some(api_base_url) = args.api_base_url {
                    settings.api_base_url = api_base_url;
                }
                if let Some(live_base_url) = args.live_base_url {
                    settings.live_base_url = live_base_url;
                }
                if let Some(reply_timeout_secs) = args.reply_timeout_secs {
                    settings.pending_reply_timeout_secs = reply_timeout_secs;
                }
            })
            .context(SettingsSnafu {
                stage: "update-settings",
            })?;
    }

    let settings = store.settings();
    println!("settings file   {}", store.config_path().display());
    println!("api_base_url    {}", settings.api_base_url);
    println!("live_base_url   {}", settings.live_base_url);
    println!("reply timeout   {}s", settings.pending_reply_timeout_secs);
    Ok(())
}

async fn run_backend_command(command: Command, settings: ClientSettings) -> ChatResult<()> {
    let session = Arc::new(Session::load(TokenFile::new(TokenFile::default_path())));
    let gateway = Arc::new(
        HttpGateway::new(&settings.api_base_url, Arc::clone(&session)).context(GatewaySnafu {
            stage: "build-gateway",
        })?,
    );

    match command {
        Command::Register {
            name,
            email,
            password,
        } => {
            let response = gateway
                .register(RegisterRequest {
                    name,
                    email,
                    password,
                })
                .await
                .context(GatewaySnafu { stage: "register" })?;
            println!("registered and signed in as {}", response.user.email);
        }
        Command::Login { email, password } => {
            let response = gateway
                .login(LoginRequest { email, password })
                .await
                .context(GatewaySnafu { stage: "login" })?;
            println!("signed in as {}", response.user.email);
        }
        Command::Logout => {
            gateway.logout();
            println!("signed out");
        }
        Command::Whoami => {
            require_session(&session)?;
            let user = gateway
                .current_user()
                .await
                .context(GatewaySnafu {
                    stage: "current-user",
                })?;
            println!("{} <{}>", user.name, user.email);
        }
        Command::Contexts => {
            require_session(&session)?;
            let contexts = gateway.list_contexts().await.context(GatewaySnafu {
                stage: "list-contexts",
            })?;
            for context in contexts {
                println!("{}\t{}\t{}", context.id, context.name, context.description);
            }
        }
        Command::Conversations => {
            require_session(&session)?;
            let conversations = gateway.list_conversations().await.context(GatewaySnafu {
                stage: "list-conversations",
            })?;
            for conversation in conversations {
                println!(
                    "{}\t{}\t{}",
                    conversation.id,
                    conversation.created_at.format("%Y-%m-%d %H:%M"),
                    conversation.title
                );
            }
        }
        Command::New { title, context } => {
            require_session(&session)?;
            let vector_context_id = ContextId::parse(&context).context(GatewaySnafu {
                stage: "parse-context-id",
            })?;
            let conversation = gateway
                .create_conversation(NewConversation {
                    title,
                    vector_context_id,
                })
                .await
                .context(GatewaySnafu {
                    stage: "create-conversation",
                })?;
            println!("{}\t{}", conversation.id, conversation.title);
        }
        Command::Chat { conversation_id } => {
            require_session(&session)?;
            let conversation_id = ConversationId::parse(&conversation_id).context(GatewaySnafu {
                stage: "parse-conversation-id",
            })?;
            chat(gateway, &settings, conversation_id).await?;
        }
        Command::Config(_) => {}
    }

    Ok(())
}

fn require_session(session: &Session) -> ChatResult<()> {
    ensure!(
        session.is_authenticated(),
        NotAuthenticatedSnafu {
            stage: "require-session",
        }
    );
    Ok(())
}

async fn chat(
    gateway: Arc<HttpGateway>,
    settings: &ClientSettings,
    conversation_id: ConversationId,
) -> ChatResult<()> {
    let transport = WsTransport::new(&settings.live_base_url).context(ConfigureLiveSnafu {
        stage: "build-live-transport",
    })?;
    let mut controller = ChatController::new(
        gateway,
        Arc::new(transport),
        settings.pending_reply_timeout(),
    );
    controller.select_conversation(conversation_id.clone())?;
    println!("chatting in {conversation_id}; type {QUIT_COMMAND} to leave");

    let (input_tx, mut input_rx) = mpsc::unbounded_channel();
    tokio::spawn(read_input(input_tx));

    loop {
        tokio::select! {
            line = input_rx.recv() => {
                let Some(line) = line else {
                    break;
                };
                let line = line.trim();
                if line == QUIT_COMMAND {
                    break;
                }
                if controller.submit(line) {
                    print_transcript(controller.messages())?;
                }
            }
            update = controller.next_update() => {
                print_transcript(&update.messages)?;
                if let Some(notice) = &update.notice {
                    eprintln!("{}", render_notice(notice));
                    if matches!(notice, Notice::Unauthorized { .. }) {
                        break;
                    }
                }
            }
        }
    }

    controller.close();
    Ok(())
}

async fn read_input(input_tx: mpsc::UnboundedSender<String>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if input_tx.send(line).is_err() {
                    return;
                }
            }
            Ok(None) => return,
            Err(error) => {
                tracing::warn!(error = %error, "failed to read input");
                return;
            }
        }
    }
}

fn print_transcript(messages: &[Message]) -> ChatResult<()> {
    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "----").context(TerminalSnafu {
        stage: "write-transcript",
    })?;
    stdout
        .write_all(render_transcript(messages).as_bytes())
        .context(TerminalSnafu {
            stage: "write-transcript",
        })?;
    stdout.flush().context(TerminalSnafu {
        stage: "flush-transcript",
    })
}
