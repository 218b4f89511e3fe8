//! Standalone server binary.
//!
//! Usage:
//!   cargo run -p world_server -- [--config world.json] [--addr 127.0.0.1:43594]
//!                                [--tick-ms 640] [--defs definitions.json]
//!
//! The server accepts client connections, runs the world tick, and streams
//! view updates to every logged-in player.
//!
//! Console commands:
//!   status         - Show server status
//!   players        - List online players
//!   kick <name>    - Disconnect a player
//!   quit           - Shutdown server

use std::env;
use std::io::{BufRead, Write};
use std::sync::Arc;

use anyhow::Context;
use tokio::sync::mpsc;
use tracing::info;
use world_server::{server::GameServer, store::MemoryStore};
use world_shared::{config::WorldConfig, definitions::Definitions};

fn parse_args() -> anyhow::Result<WorldConfig> {
    let args: Vec<String> = env::args().collect();

    // The config file goes first so flags can override it.
    let mut cfg = match args.iter().position(|a| a == "--config") {
        Some(i) if i + 1 < args.len() => {
            let text = std::fs::read_to_string(&args[i + 1])
                .with_context(|| format!("read config {}", args[i + 1]))?;
            WorldConfig::from_json_str(&text).context("parse config")?
        }
        _ => WorldConfig::default(),
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--addr" if i + 1 < args.len() => {
                cfg.server_addr = args[i + 1].clone();
                i += 2;
            }
            "--tick-ms" if i + 1 < args.len() => {
                cfg.tick_ms = args[i + 1].parse().unwrap_or(640);
                i += 2;
            }
            "--defs" if i + 1 < args.len() => {
                cfg.definitions_path = Some(args[i + 1].clone());
                i += 2;
            }
            _ => i += 1,
        }
    }
    Ok(cfg)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cfg = parse_args()?;
    info!(addr = %cfg.server_addr, tick_ms = cfg.tick_ms, defs = ?cfg.definitions_path, "Starting server");

    let definitions = match &cfg.definitions_path {
        Some(path) => Definitions::load(path)?,
        None => Definitions::default(),
    };

    let mut server = GameServer::new(cfg, definitions, Arc::new(MemoryStore::new()))
        .await
        .context("create server")?;
    info!(local = %server.local_addr(), "Server listening");

    // Set up console input channel.
    let (console_tx, console_rx) = mpsc::channel::<String>(32);
    server.set_console_input(console_rx);

    // Spawn stdin reader thread.
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        let mut stdout = std::io::stdout();
        loop {
            print!("] ");
            let _ = stdout.flush();
            let mut line = String::new();
            match stdin.lock().read_line(&mut line) {
                Ok(0) | Err(_) => break,
                Ok(_) => {}
            }
            let line = line.trim().to_string();
            if !line.is_empty() && console_tx.blocking_send(line).is_err() {
                break;
            }
        }
    });

    println!("Server ready. Type 'status' for info, 'players' to list players, 'quit' to exit.");
    println!();

    server.run().await
}
