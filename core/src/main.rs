/// AgentDesk sync core - reference CLI entry point
use agentdesk_core::{Client, Config, SessionContext};
use std::env;
use tokio::io::AsyncBufReadExt;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info"))
        )
        .init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 3 {
        anyhow::bail!(
            "Usage: {} <api_base> <token> [chat_id] [flags]",
            args.first().map(String::as_str).unwrap_or("core")
        );
    }

    let api_base = &args[1];
    let token = &args[2];
    let chat_arg = args.get(3).filter(|a| !a.starts_with("--")).cloned();
    let flag_start = if chat_arg.is_some() { 4 } else { 3 };
    let config = Config::from_flags(&args[flag_start.min(args.len())..])
        .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;

    let session = SessionContext::new(api_base.as_str(), token.as_str())
        .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;
    let client = Client::new(session, config)?;

    client.load_chats().await?;
    let chats = client.chats_snapshot().await;
    info!("Loaded {} conversations", chats.items.len());

    let chat_id = match chat_arg {
        Some(id) => id,
        None => match chats.items.first() {
            Some(chat) => chat.id.clone(),
            None => client.create_chat(None).await?.id,
        },
    };

    let Some(active) = client.select_chat(Some(&chat_id)).await? else {
        anyhow::bail!("Chat selection failed");
    };
    info!("Following chat {}", active.chat_id());

    // Stream reconciled log updates to stdout
    let mut log_rx = active.log_watch();
    tokio::spawn(async move {
        while log_rx.changed().await.is_ok() {
            let log = log_rx.borrow_and_update().clone();
            if let Some(head) = log.first() {
                println!(
                    "[{}] {:?}/{:?}: {}",
                    head.event.created_at.format("%H:%M:%S"),
                    head.event.author,
                    head.event.kind,
                    head.event.content
                );
            }
        }
    });

    // Forward stdin lines as user messages
    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "/quit" {
            break;
        }
        if let Err(e) = active.send_message(line).await {
            eprintln!("Send failed: {}", e);
        }
    }

    client.select_chat(None).await?;
    info!("Session closed");
    Ok(())
}
