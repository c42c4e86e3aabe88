use std::sync::Arc;

use {
    chat_realtime::{
        adapters::WebSocketTransport,
        application::{ManagerError, RealtimeManager},
        config::{AppConfig, ConfigError, LoggingConfig},
        domain::{
            foundation::{ChannelId, ValidationError},
            realtime::{ChannelHandlers, NotificationHandler},
        },
    },
    clap::Parser,
    serde_json::Value,
    tokio::io::{AsyncBufReadExt, BufReader},
    tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

#[derive(Parser)]
#[command(name = "chat-realtime", about = "Join chat channels over WebSocket")]
struct Cli {
    /// Channel to join. Repeat to join several; input goes to the first.
    #[arg(long = "channel", value_name = "ID")]
    channels: Vec<String>,

    /// Also open the notification stream.
    #[arg(long, default_value_t = false)]
    notifications: bool,

    /// Chat server host[:port]. Overrides CHAT_REALTIME__ENDPOINT__HOST.
    #[arg(long)]
    host: Option<String>,

    /// Use wss:// instead of ws://.
    #[arg(long, default_value_t = false)]
    secure: bool,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, default_value_t = false)]
    json_logs: bool,
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(#[from] chat_realtime::config::ValidationError),

    #[error("Invalid channel: {0}")]
    InvalidChannel(#[from] ValidationError),

    #[error(transparent)]
    Manager(#[from] ManagerError),

    #[error("Failed to read input: {0}")]
    Io(#[from] std::io::Error),

    #[error("Nothing to open: pass --channel <ID> and/or --notifications")]
    NothingToOpen,
}

/// One line typed by the user.
#[derive(Debug, PartialEq, Eq)]
enum Input {
    Message(String),
    Typing,
    StopTyping,
    Read(String),
    MarkNotificationRead(String),
    Quit,
}

fn parse_input(line: &str) -> Option<Input> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let (command, arg) = match line.split_once(char::is_whitespace) {
        Some((command, arg)) => (command, arg.trim()),
        None => (line, ""),
    };
    match command {
        "/typing" => Some(Input::Typing),
        "/stop" => Some(Input::StopTyping),
        "/read" if !arg.is_empty() => Some(Input::Read(arg.to_string())),
        "/seen" if !arg.is_empty() => Some(Input::MarkNotificationRead(arg.to_string())),
        "/quit" => Some(Input::Quit),
        _ => Some(Input::Message(line.to_string())),
    }
}

/// Log subscriber writing every format to `writer`, keeping stdout for chat output.
fn telemetry<W>(
    logging: &LoggingConfig,
    writer: W,
) -> Result<Box<dyn tracing::Subscriber + Send + Sync>, chat_realtime::config::ValidationError>
where
    W: for<'a> fmt::MakeWriter<'a> + Send + Sync + 'static,
{
    let filter = logging.env_filter()?;
    let registry = tracing_subscriber::registry().with(filter);

    if logging.json {
        Ok(Box::new(
            registry.with(fmt::layer().json().with_target(true).with_writer(writer)),
        ))
    } else {
        Ok(Box::new(
            registry.with(fmt::layer().with_target(false).with_writer(writer)),
        ))
    }
}

fn init_telemetry(logging: &LoggingConfig) -> Result<(), chat_realtime::config::ValidationError> {
    telemetry(logging, std::io::stderr)?.init();
    Ok(())
}

fn text_of(value: &Value, field: &str) -> String {
    match value.get(field) {
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => "?".to_string(),
    }
}

fn print_handlers(channel: &ChannelId) -> ChannelHandlers {
    let (on_message, on_joined, on_left, on_typing) = (
        channel.clone(),
        channel.clone(),
        channel.clone(),
        channel.clone(),
    );
    ChannelHandlers::new()
        .on_message(move |message| match &message {
            Value::String(text) => println!("[{on_message}] {text}"),
            _ => println!(
                "[{on_message}] {}: {}",
                text_of(&message, "username"),
                text_of(&message, "message")
            ),
        })
        .on_user_joined(move |frame| {
            println!("[{on_joined}] * {} joined", text_of(&frame, "username"))
        })
        .on_user_left(move |frame| println!("[{on_left}] * {} left", text_of(&frame, "username")))
        .on_typing(move |frame| {
            let verb = if frame.get("typing").and_then(Value::as_bool) == Some(false) {
                "stopped typing"
            } else {
                "is typing"
            };
            println!("[{on_typing}] * {} {verb}", text_of(&frame, "username"))
        })
}

async fn run_input(manager: &RealtimeManager, target: Option<&ChannelId>) -> Result<(), CliError> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let line = tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted");
                return Ok(());
            }
            line = lines.next_line() => line?,
        };
        let Some(line) = line else {
            return Ok(());
        };

        let input = match parse_input(&line) {
            Some(Input::Quit) => return Ok(()),
            Some(Input::MarkNotificationRead(id)) => {
                manager.mark_notification_read(id);
                continue;
            }
            Some(input) => input,
            None => continue,
        };
        let Some(channel) = target else {
            eprintln!("No channel joined; only /seen and /quit are available");
            continue;
        };
        match input {
            Input::Message(text) => manager.send_chat_message(channel, text),
            Input::Typing => manager.start_typing(channel),
            Input::StopTyping => manager.stop_typing(channel),
            Input::Read(id) => manager.mark_message_read(channel, id),
            Input::MarkNotificationRead(_) | Input::Quit => {}
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    let cli = Cli::parse();

    let mut config = AppConfig::load()?;
    if let Some(host) = cli.host {
        config.endpoint.host = host;
    }
    config.endpoint.secure |= cli.secure;
    config.logging.json |= cli.json_logs;
    config.validate()?;
    init_telemetry(&config.logging)?;

    let channels = cli
        .channels
        .iter()
        .map(|id| ChannelId::new(id.as_str()))
        .collect::<Result<Vec<_>, _>>()?;
    if channels.is_empty() && !cli.notifications {
        return Err(CliError::NothingToOpen);
    }

    let transport = Arc::new(WebSocketTransport::new(config.transport.connect_timeout()));
    let manager = RealtimeManager::start(config.manager_config()?, transport);

    for channel in &channels {
        manager
            .open_channel(channel.clone(), print_handlers(channel))
            .await?;
        tracing::info!(%channel, "Joined channel");
    }
    if cli.notifications {
        manager
            .open_notifications(NotificationHandler::new(|frame| {
                println!("[notification] {frame}")
            }))
            .await?;
    }

    run_input(&manager, channels.first()).await?;

    manager.close_all();
    // Round trip so the close is processed before the runtime shuts down.
    manager.open_channels().await?;
    Ok(())
}
