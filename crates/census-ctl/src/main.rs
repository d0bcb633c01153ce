//! census-ctl — command-line interface for the census daemon.

use anyhow::{Context, Result};
use serde::Deserialize;

const DEFAULT_PORT: u16 = 19092;

// ── Response types ────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct StatusResponse {
    node_id:       String,
    protocol:      String,
    peers:         usize,
    interval_secs: u64,
}

#[derive(Deserialize)]
struct PeersResponse {
    peers: Vec<PeerInfo>,
}

#[derive(Deserialize)]
struct PeerInfo {
    node_id:        String,
    last_seen_secs: u64,
}

// ── HTTP helpers ──────────────────────────────────────────────────────────────

fn base_url(port: u16) -> String {
    format!("http://127.0.0.1:{}", port)
}

async fn get_value(url: &str) -> Result<serde_json::Value> {
    reqwest::get(url)
        .await
        .with_context(|| format!("failed to connect to censusd at {}; is it running?", url))?
        .error_for_status()
        .with_context(|| format!("censusd rejected {}", url))?
        .json::<serde_json::Value>()
        .await
        .context("failed to parse response")
}

async fn get_json<T: for<'de> Deserialize<'de>>(url: &str) -> Result<T> {
    let value = get_value(url).await?;
    serde_json::from_value(value).context("unexpected response shape")
}

// ── Subcommand handlers ───────────────────────────────────────────────────────

async fn cmd_status(port: u16) -> Result<()> {
    let resp: StatusResponse = get_json(&format!("{}/status", base_url(port))).await?;

    println!("═══════════════════════════════════════");
    println!("  Census Daemon Status");
    println!("═══════════════════════════════════════");
    println!("  Node id          : {}", resp.node_id);
    println!("  Protocol         : {}", resp.protocol);
    println!("  Peers visible    : {}", resp.peers);
    println!("  Beacon interval  : {}s", resp.interval_secs);
    Ok(())
}

async fn cmd_peers(port: u16) -> Result<()> {
    let resp: PeersResponse = get_json(&format!("{}/peers", base_url(port))).await?;

    if resp.peers.is_empty() {
        println!("No peers visible yet.");
        return Ok(());
    }

    println!("═══════════════════════════════════════");
    println!("  Visible Peers ({})", resp.peers.len());
    println!("═══════════════════════════════════════");
    for p in &resp.peers {
        println!("  {}  last seen {}s ago", p.node_id, p.last_seen_secs);
    }
    Ok(())
}

/// Dump an endpoint verbatim, for scripts.
async fn cmd_raw(port: u16, path: &str) -> Result<()> {
    let value = get_value(&format!("{}/{}", base_url(port), path)).await?;
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

fn print_usage() {
    println!("Usage: census-ctl [--port <port>] [--json] <command>");
    println!();
    println!("Commands:");
    println!("  status        Show node identity, peer count and beacon interval");
    println!("  peers         List currently visible peers");
    println!();
    println!("Options:");
    println!("  --port <port>   Status endpoint port (default: {})", DEFAULT_PORT);
    println!("  --json          Print the raw JSON response");
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();

    let mut port = DEFAULT_PORT;
    let mut json = false;
    let mut remaining: Vec<&str> = Vec::new();
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--port" => {
                i += 1;
                port = args
                    .get(i)
                    .context("--port requires a value")?
                    .parse()
                    .context("--port must be a number")?;
            }
            "--json" => json = true,
            other => remaining.push(other),
        }
        i += 1;
    }

    match remaining.as_slice() {
        ["status"] | [] if json        => cmd_raw(port, "status").await,
        ["peers"] if json              => cmd_raw(port, "peers").await,
        ["status"] | []                => cmd_status(port).await,
        ["peers"]                      => cmd_peers(port).await,
        ["help"] | ["--help"] | ["-h"] => { print_usage(); Ok(()) }
        other => {
            eprintln!("Unknown command: {}", other.join(" "));
            eprintln!();
            print_usage();
            std::process::exit(1);
        }
    }
}
