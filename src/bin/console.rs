//! Local driver: one `sender|message[|media_url]` per stdin line, replies and
//! appended rows on stdout. `\n` inside a message stands for a line break.

use chat_ledger::{
    sinks::{DisabledBlobStore, InMemorySink},
    state::InMemoryStateStore,
    Config, InboundMessage, LedgerEngine,
};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

fn parse_line(line: &str) -> Option<InboundMessage> {
    let mut parts = line.splitn(3, '|');
    let sender = parts.next()?.trim();
    let body = parts.next()?.replace("\\n", "\n");
    if sender.is_empty() {
        return None;
    }

    let message = InboundMessage::new(sender, body);
    Some(match parts.next().map(str::trim).filter(|url| !url.is_empty()) {
        Some(url) => message.with_media(url),
        None => message,
    })
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::WARN)
        .with_writer(std::io::stderr)
        .init();

    let config = Config::load()?;
    let settings = config.engine_settings()?;

    let sink = Arc::new(InMemorySink::new(settings.routing.destinations()));
    let engine = LedgerEngine::new(
        settings,
        Arc::new(InMemoryStateStore::with_ttl(config.state_ttl)),
        sink.clone(),
        Arc::new(DisabledBlobStore),
    );

    info!("Chat Ledger console ready");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut seen = 0;

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let Some(message) = parse_line(&line) else {
            warn!(line = %line, "Expected sender|message");
            continue;
        };

        let reply = engine.handle(message).await;
        println!("{}", reply);

        let rows = sink.rows().await;
        for appended in &rows[seen..] {
            println!("  → {}: {}", appended.destination, appended.row.join(" | "));
        }
        seen = rows.len();
        println!();
    }

    Ok(())
}
