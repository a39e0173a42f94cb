//! Alça Chat CLI - terminal front end for the finance assistant
//!
//! Reads one message per line from stdin. Lines starting with `/` are
//! commands; see `/help`.

mod args;

use alca_chat::{
    ChatClient, ClientEvent, Dispatch, HttpFallback, Message, MessageOrigin, SessionCredentials,
};
use anyhow::Context;
use args::Args;
use clap::Parser;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const HELP: &str = "\
Commands:
  /suggest N   send suggestion N of the last assistant reply
  /status      show connection status
  /open        (re)open the persistent channel
  /close       close the persistent channel
  /quit        exit";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    // Logs go to stderr so they never interleave with the conversation
    let log_level = args.log_level.clone();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("alca_chat={},info", log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    let config = args.client_config().context("Failed to load configuration")?;

    if args.health {
        let fallback = HttpFallback::from_config(&config)?;
        let health = fallback.health().await?;
        println!(
            "{} ({})",
            health.status,
            health.service.as_deref().unwrap_or("unknown service")
        );
        return Ok(());
    }

    info!(
        exchange = %config.exchange_url,
        reconnect_delay_ms = config.reconnect_delay_ms,
        "Starting chat client"
    );

    let token = args.token.clone().unwrap_or_default();
    let credentials = Arc::new(SessionCredentials::signed_in(token));
    let client = ChatClient::with_network(config, credentials)?;

    for message in client.messages().await {
        print_message(&message);
    }

    let printer = tokio::spawn(print_events(client.subscribe()));
    client.open().await;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match line.split_once(' ').unwrap_or((line, "")) {
            ("/quit", _) => break,
            ("/help", _) => println!("{}", HELP),
            ("/status", _) => {
                let snapshot = client.snapshot().await;
                println!(
                    "status: {} | fallback: {} | conversation: {} | pending: {}",
                    snapshot.status,
                    snapshot.fallback_active,
                    snapshot.conversation_id.as_deref().unwrap_or("-"),
                    snapshot.pending_exchanges
                );
            }
            ("/open", _) => client.open().await,
            ("/close", _) => client.close().await,
            ("/suggest", n) => suggest(&client, n).await,
            (cmd, _) if cmd.starts_with('/') => println!("Unknown command {}, try /help", cmd),
            _ => report(client.send(line).await),
        }
    }

    client.close().await;
    printer.abort();
    Ok(())
}

async fn suggest(client: &ChatClient, arg: &str) {
    let Ok(n) = arg.trim().parse::<usize>() else {
        println!("Usage: /suggest N");
        return;
    };

    let last = client
        .messages()
        .await
        .into_iter()
        .rev()
        .find(|m| m.origin == MessageOrigin::Assistant && !m.suggestions.is_empty());
    let Some(message) = last else {
        println!("No suggestions available");
        return;
    };

    // Suggestions are shown numbered from 1
    report(client.choose_suggestion(&message.id, n.saturating_sub(1)).await);
}

fn report(result: Result<Dispatch, alca_chat::ClientError>) {
    match result {
        Ok(dispatch) => debug!(dispatch = ?dispatch, "Message sent"),
        Err(e) => println!("! {}", e),
    }
}

/// Print log appends and status changes as they happen.
async fn print_events(mut events: tokio::sync::broadcast::Receiver<ClientEvent>) {
    loop {
        match events.recv().await {
            Ok(ClientEvent::MessageAppended(message)) => {
                if message.origin != MessageOrigin::User {
                    print_message(&message);
                }
            }
            Ok(ClientEvent::StatusChanged(status)) => println!("[{}]", status),
            Err(RecvError::Lagged(skipped)) => debug!(skipped, "Event printer lagged"),
            Err(RecvError::Closed) => break,
        }
    }
}

fn print_message(message: &Message) {
    let prefix = match message.origin {
        MessageOrigin::User => "you",
        MessageOrigin::Assistant => "assistant",
        MessageOrigin::System => "system",
        MessageOrigin::Error => "error",
    };
    println!(
        "{} {}: {}",
        message.timestamp.format("%H:%M"),
        prefix,
        message.text
    );
    for (i, suggestion) in message.suggestions.iter().enumerate() {
        println!("    {}. {}", i + 1, suggestion);
    }
}
