//! Parley terminal client.
//!
//! # Usage
//!
//! ```bash
//! PARLEY_PASSWORD=swordfish parley --url ws://127.0.0.1:3000 --room lobby --name ann
//! ```
//!
//! Lines typed on stdin are sent to the active room. Commands:
//!
//! - `/room NAME [PASSWORD]` switch rooms (reuses the current password if
//!   none is given)
//! - `/reply TEXT` reply to the last message in the room
//! - `/leave` leave the active room
//! - `/quit` leave and exit

use clap::Parser;
use parley_client::{
    ClientAction, ClientConfig, ClientError, ClientEvent, HistoryEntry, Password, RoomPhase,
    Session,
};
use parley_core::names::sanitize;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Stdout};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Longest message line echoed to the terminal, in characters.
const MAX_RENDERED_CHARS: usize = 4096;

/// Parley end-to-end encrypted chat client
#[derive(Parser, Debug)]
#[command(name = "parley")]
#[command(about = "End-to-end encrypted room chat over a Parley relay")]
#[command(version)]
struct Args {
    /// Relay WebSocket URL
    #[arg(short, long, env = "PARLEY_URL", default_value = "ws://127.0.0.1:3000")]
    url: String,

    /// Room to join
    #[arg(short, long, default_value = "lobby")]
    room: String,

    /// Display name
    #[arg(short, long, default_value = "anon")]
    name: String,

    /// Room password (read from stdin if unset)
    #[arg(long, env = "PARLEY_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    log_level: String,
}

/// One line of user input.
#[derive(Debug, PartialEq, Eq)]
enum Command {
    Say(String),
    Reply(String),
    Room { room: String, password: Option<String> },
    Leave,
    Quit,
    Nothing,
}

impl Command {
    fn parse(line: &str) -> Self {
        let line = line.trim_end_matches(['\r', '\n']);
        let Some(rest) = line.strip_prefix('/') else {
            return if line.trim().is_empty() { Self::Nothing } else { Self::Say(line.to_string()) };
        };

        let (command, argument) = rest.split_once(' ').unwrap_or((rest, ""));
        match command {
            "room" => {
                let mut parts = argument.trim().splitn(2, ' ');
                let room = parts.next().unwrap_or_default().to_string();
                let password = parts.next().map(str::to_string).filter(|p| !p.is_empty());
                Self::Room { room, password }
            },
            "reply" => Self::Reply(argument.to_string()),
            "leave" => Self::Leave,
            "quit" => Self::Quit,
            _ => Self::Say(line.to_string()),
        }
    }
}

struct Terminal {
    stdout: Stdout,
}

impl Terminal {
    async fn line(&mut self, text: &str) -> std::io::Result<()> {
        self.stdout.write_all(text.as_bytes()).await?;
        self.stdout.write_all(b"\n").await?;
        self.stdout.flush().await
    }

    async fn render(
        &mut self,
        result: Result<Vec<ClientAction>, ClientError>,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let actions = match result {
            Ok(actions) => actions,
            Err(e) if e.is_fatal() => return Err(e.into()),
            Err(e) => {
                self.line(&format!("! {e}")).await?;
                return Ok(());
            },
        };

        for action in actions {
            match action {
                ClientAction::RoomPhaseChanged { room, phase: RoomPhase::Verifying } => {
                    self.line(&format!("* joining {room}...")).await?;
                },
                ClientAction::FingerprintReady { room, fingerprint } => {
                    self.line(&format!("* key fingerprint for {room}: {fingerprint}")).await?;
                },
                ClientAction::Deliver { entry, .. } => self.line(&format_entry(&entry)).await?,
                ClientAction::PresenceChanged { count, users, .. } => {
                    let users: Vec<String> =
                        users.iter().map(|u| sanitize(u, MAX_RENDERED_CHARS)).collect();
                    self.line(&format!("* {count} online: {}", users.join(", "))).await?;
                },
                ClientAction::TypingChanged { active: true, .. } => {
                    self.line("* someone is typing...").await?;
                },
                ClientAction::Log { message } => tracing::debug!("{}", message),
                _ => {},
            }
        }

        Ok(())
    }
}

fn format_entry(entry: &HistoryEntry) -> String {
    match entry {
        HistoryEntry::Chat { body, own } => {
            let marker = if *own { ">" } else { " " };
            let mut line = format!(
                "{marker}[{}] {}: {}",
                clock(body.ts),
                sanitize(&body.from, MAX_RENDERED_CHARS),
                sanitize(&body.text, MAX_RENDERED_CHARS)
            );
            if let Some(quote) = &body.reply_to {
                line.push_str(&format!(
                    "\n    (re {}: {})",
                    sanitize(&quote.from, MAX_RENDERED_CHARS),
                    sanitize(&quote.text, MAX_RENDERED_CHARS)
                ));
            }
            line
        },
        HistoryEntry::System { text, ts } => format!("*[{}] {text}", clock(*ts)),
    }
}

/// `HH:MM` (UTC) of a unix-millisecond timestamp.
fn clock(ts: u64) -> String {
    let minutes = ts / 60_000;
    format!("{:02}:{:02}", (minutes / 60) % 24, minutes % 60)
}

/// Last chat message in the active room, for `/reply`.
fn last_message(session: &Session) -> Option<parley_client::ReplyTo> {
    let client = session.client();
    let room = client.active_room()?;
    client.history(room.as_str())?.iter().rev().find_map(|entry| match entry {
        HistoryEntry::Chat { body, .. } => Some(body.quote()),
        HistoryEntry::System { .. } => None,
    })
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let mut terminal = Terminal { stdout: tokio::io::stdout() };
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    let password = match args.password {
        Some(password) => password,
        None => {
            terminal.line("password:").await?;
            lines.next_line().await?.unwrap_or_default()
        },
    };
    let password = Password::new(password);

    let mut session = Session::new(args.url, ClientConfig::default());
    let result = session
        .handle(ClientEvent::AddRoom {
            room: args.room,
            name: args.name.clone(),
            password: password.clone(),
        })
        .await;
    terminal.render(result).await?;

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                let event = match Command::parse(&line) {
                    Command::Say(text) => ClientEvent::SendMessage { text, reply_to: None },
                    Command::Reply(text) => ClientEvent::SendMessage { text, reply_to: last_message(&session) },
                    Command::Room { room, password: new_password } => ClientEvent::AddRoom {
                        room,
                        name: args.name.clone(),
                        password: new_password.map_or_else(|| password.clone(), Password::new),
                    },
                    Command::Leave => ClientEvent::LeaveRoom,
                    Command::Quit => break,
                    Command::Nothing => continue,
                };
                let result = session.handle(event).await;
                terminal.render(result).await?;
            },
            event = session.next_event() => {
                let result = session.handle(event).await;
                terminal.render(result).await?;
            },
        }
    }

    let result = session.handle(ClientEvent::Disconnect).await;
    terminal.render(result).await?;

    Ok(())
}
