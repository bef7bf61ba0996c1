#![deny(dead_code)]
use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use log::{error, info, warn, LevelFilter};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::Notify;
use tokio_stream::wrappers::{BroadcastStream, WatchStream};
use tokio_stream::StreamExt;

mod utils;

use murmur::config::{self, ClientConfig};
use murmur::models::{MediaKind, Message, MessagePayload};
use murmur::socket::{EventKind, MemoryChannel, PushChannel, PushEvent, WsPushChannel};
use murmur::{ChatStore, HttpChatApi, Presence};

/// Command line arguments for murmur
#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "murmur: a terminal client for direct messaging.",
    long_about = "murmur talks to a chat server over REST and a push socket.\n\n\
    Settings come from the config file, then MURMUR_SERVER / MURMUR_USER_ID / MURMUR_TOKEN,\n\
    then the flags below. Run `murmur login` once to store them."
)]
struct Args {
    /// Server base URL, e.g. http://localhost:5001
    #[arg(long, global = true)]
    server: Option<String>,

    /// Your user id on the server
    #[arg(long, global = true)]
    user_id: Option<String>,

    /// Session token (sent as the jwt cookie)
    #[arg(long, global = true)]
    token: Option<String>,

    /// Use this config file instead of the per-user one
    #[arg(long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,

    /// Write logs here instead of murmur.log
    #[arg(long, value_name = "PATH", global = true)]
    log_file: Option<PathBuf>,

    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Save server, user id and token to the config file
    Login,
    /// List your contacts with their presence
    Contacts {
        /// Only show contacts that are online
        #[arg(long)]
        online: bool,
    },
    /// Print the conversation with a contact
    History { contact_id: String },
    /// Send one message
    Send {
        contact_id: String,
        #[arg(long)]
        text: Option<String>,
        #[arg(long, value_name = "PATH")]
        image: Option<PathBuf>,
        #[arg(long, value_name = "PATH")]
        video: Option<PathBuf>,
        #[arg(long, value_name = "PATH")]
        audio: Option<PathBuf>,
    },
    /// Delete the conversation with a contact
    Delete { contact_id: String },
    /// Open an interactive conversation; type /quit to leave
    Chat { contact_id: String },
}

/// Merge the config file, environment and flags (later wins)
fn resolve_config(args: &Args) -> Result<ClientConfig> {
    let base = config::load_config()?.unwrap_or_else(|| ClientConfig::new("", "", None));
    let mut resolved = base.apply_env();

    if let Some(server) = &args.server {
        resolved.server_url = server.trim_end_matches('/').to_string();
    }
    if let Some(user_id) = &args.user_id {
        resolved.user_id = user_id.clone();
    }
    if let Some(token) = &args.token {
        resolved.set_token(Some(token));
    }

    resolved.validate()?;
    Ok(resolved)
}

fn format_message(message: &Message, self_id: &str) -> String {
    let who = if message.sender_id == self_id {
        "you".to_string()
    } else {
        message.sender_id.clone()
    };
    let mut line = format!(
        "[{}] {}: {}",
        message.created_at.format("%Y-%m-%d %H:%M"),
        who,
        message.text.as_deref().unwrap_or("")
    );
    for (label, uri) in [
        ("image", &message.image),
        ("video", &message.video),
        ("audio", &message.audio),
    ] {
        if let Some(uri) = uri {
            line.push_str(&format!(" [{}: {}]", label, uri));
        }
    }
    line
}

/// Open the push socket and wait briefly for the first presence broadcast.
/// Falls back to an offline channel when the socket cannot be opened.
async fn open_push_channel(
    config: &ClientConfig,
    presence: &Presence,
) -> (Arc<dyn PushChannel>, Option<Arc<WsPushChannel>>) {
    match WsPushChannel::connect(&config.server_url, &config.user_id).await {
        Ok(socket) => {
            let first_update = Arc::new(Notify::new());
            let notify = first_update.clone();
            let waiter = socket.on(
                EventKind::OnlineUsers,
                Arc::new(move |_: &PushEvent| notify.notify_one()),
            );
            presence.attach(socket.as_ref());

            if tokio::time::timeout(Duration::from_secs(2), first_update.notified())
                .await
                .is_err()
            {
                warn!("No presence update received yet");
            }
            socket.off(waiter);

            let channel: Arc<dyn PushChannel> = socket.clone();
            (channel, Some(socket))
        }
        Err(e) => {
            warn!("Push channel unavailable, continuing offline: {}", e);
            eprintln!("Warning: live updates unavailable ({})", e);
            (Arc::new(MemoryChannel::disconnected()), None)
        }
    }
}

async fn run_chat(store: Arc<ChatStore>, contact_id: &str, self_id: &str) -> Result<()> {
    store.list_contacts().await?;
    let contact = store
        .snapshot()
        .contacts
        .into_iter()
        .find(|c| c.id == contact_id)
        .ok_or_else(|| anyhow!("No contact with id {}", contact_id))?;

    println!(
        "Chatting with {} ({:?}). Type /quit to leave.",
        contact.full_name,
        store.contact_status(&contact.id)
    );

    if let Err(e) = store.switch_conversation(Some(contact)).await {
        eprintln!("! {}", e);
    }

    let mut shown: HashSet<String> = HashSet::new();
    let mut snapshots = WatchStream::new(store.watch());
    let mut notices = BroadcastStream::new(store.notices());
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            snapshot = snapshots.next() => {
                let Some(snapshot) = snapshot else { break };
                for message in &snapshot.messages {
                    if shown.insert(message.id.clone()) {
                        println!("{}", format_message(message, self_id));
                    }
                }
            }
            notice = notices.next() => {
                if let Some(Ok(notice)) = notice {
                    eprintln!("! {}", notice);
                }
            }
            line = lines.next_line() => {
                match line? {
                    Some(line) if line.trim() == "/quit" => break,
                    Some(line) => {
                        // failures are already reported through the notice stream
                        let _ = store.send(contact_id, MessagePayload::text(line)).await;
                    }
                    None => break,
                }
            }
        }
    }

    store.switch_conversation(None).await?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_file = args
        .log_file
        .clone()
        .unwrap_or_else(|| PathBuf::from("murmur.log"));
    let level = if args.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    utils::setup_logging(Some(&log_file), level)?;
    info!("System information: {} {}", std::env::consts::OS, std::env::consts::ARCH);

    if let Some(path) = &args.config {
        config::set_config_path_override(path.clone());
        info!("Config file overridden to: {}", path.display());
    }

    let client_config = resolve_config(&args)?;

    if let Command::Login = args.command {
        config::save_config(&client_config)?;
        println!("Saved settings for {} on {}", client_config.user_id, client_config.server_url);
        return Ok(());
    }

    let api = Arc::new(HttpChatApi::new(&client_config)?);
    let presence = Presence::new(client_config.user_id.clone());
    let live = matches!(args.command, Command::Contacts { .. } | Command::Chat { .. });
    let (channel, socket) = if live {
        open_push_channel(&client_config, &presence).await
    } else {
        let offline: Arc<dyn PushChannel> = Arc::new(MemoryChannel::disconnected());
        (offline, None)
    };

    let store = ChatStore::new(api, channel, presence);
    let self_id = client_config.user_id.clone();

    let outcome = match &args.command {
        Command::Login => Ok(()),
        Command::Contacts { online } => {
            store.list_contacts().await?;
            let contacts = if *online {
                store.online_contacts()
            } else {
                store.snapshot().contacts
            };
            println!("{} online", store.online_count());
            for contact in contacts {
                println!(
                    "{:<26} {:<24} {:?}",
                    contact.id,
                    contact.full_name,
                    store.contact_status(&contact.id)
                );
            }
            if store.snapshot().contacts.is_empty() {
                println!("No chats available");
            }
            Ok(())
        }
        Command::History { contact_id } => {
            store.list_contacts().await?;
            let contact = store
                .snapshot()
                .contacts
                .into_iter()
                .find(|c| &c.id == contact_id)
                .ok_or_else(|| anyhow!("No contact with id {}", contact_id))?;
            store.select_contact(Some(contact));
            store.load_history(contact_id).await?;
            for message in store.snapshot().messages {
                println!("{}", format_message(&message, &self_id));
            }
            Ok(())
        }
        Command::Send {
            contact_id,
            text,
            image,
            video,
            audio,
        } => {
            let mut payload = MessagePayload {
                text: text.clone(),
                ..Default::default()
            };
            if let Some(path) = image {
                payload = payload.with_image(utils::load_media(MediaKind::Image, path).await?);
            }
            if let Some(path) = video {
                payload = payload.with_video(utils::load_media(MediaKind::Video, path).await?);
            }
            if let Some(path) = audio {
                payload = payload.with_audio(utils::load_media(MediaKind::Audio, path).await?);
            }
            let message = store.send(contact_id, payload).await?;
            println!("{}", format_message(&message, &self_id));
            Ok(())
        }
        Command::Delete { contact_id } => {
            store.list_contacts().await?;
            store.delete_conversation(contact_id).await?;
            println!("Chat deleted successfully.");
            Ok(())
        }
        Command::Chat { contact_id } => run_chat(store.clone(), contact_id, &self_id).await,
    };

    if let Some(socket) = socket {
        if let Err(e) = socket.disconnect().await {
            warn!("Error closing push channel: {}", e);
        }
    }

    if let Err(e) = &outcome {
        error!("Command failed: {}", e);
    }
    outcome
}
