//! resonance-admin CLI tool
//!
//! Inspects and clears the shared store of a running node.
//!
//! Usage:
//!   resonance-admin clear-all
//!   resonance-admin count
//!   resonance-admin list-recent [n]
//!   resonance-admin ping

use resonance_core::Entry;
use serde::{Deserialize, Serialize};
use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::UnixStream;
use std::path::PathBuf;

const DEFAULT_LIST_LIMIT: usize = 5;

/// Admin command sent over the socket.
#[derive(Debug, Serialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
enum AdminCommand {
    ClearAll,
    Count,
    ListRecent { limit: usize },
    Ping,
}

/// Response from admin command.
#[derive(Debug, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
enum AdminResponse {
    Ok { message: String },
    Error { error: String },
    Entries { items: Vec<Entry> },
    Count { value: usize },
    Pong,
}

fn print_usage() {
    eprintln!("resonance-admin - Inspect and clear the Resonance store");
    eprintln!();
    eprintln!("Usage:");
    eprintln!("  resonance-admin clear-all        Delete every entry and notify sessions");
    eprintln!("  resonance-admin count            Number of retained entries");
    eprintln!("  resonance-admin list-recent [n]  Newest n entries (default 5)");
    eprintln!("  resonance-admin ping             Check if daemon is running");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  RESONANCE_SOCKET  Path to admin socket (default: ./resonance-data/admin.sock)");
}

fn get_socket_path() -> PathBuf {
    std::env::var("RESONANCE_SOCKET")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("./resonance-data/admin.sock"))
}

fn send_command(cmd: AdminCommand) -> Result<AdminResponse, String> {
    let socket_path = get_socket_path();

    let mut stream = UnixStream::connect(&socket_path).map_err(|e| {
        format!(
            "Failed to connect to resonance-node at {:?}: {}\n\
             Is the resonance-node running?",
            socket_path, e
        )
    })?;

    // Send command
    let cmd_json = serde_json::to_string(&cmd).map_err(|e| e.to_string())?;
    writeln!(stream, "{}", cmd_json).map_err(|e| e.to_string())?;

    // Read response
    let mut reader = BufReader::new(&stream);
    let mut response_line = String::new();
    reader
        .read_line(&mut response_line)
        .map_err(|e| e.to_string())?;

    serde_json::from_str(&response_line).map_err(|e| format!("Invalid response: {}", e))
}

fn main() {
    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        print_usage();
        std::process::exit(1);
    }

    let cmd = match args[1].as_str() {
        "clear-all" => AdminCommand::ClearAll,
        "count" => AdminCommand::Count,
        "list-recent" => {
            let limit = match args.get(2) {
                Some(raw) => match raw.parse() {
                    Ok(n) => n,
                    Err(_) => {
                        eprintln!("Error: list-recent expects a number, got {:?}", raw);
                        std::process::exit(1);
                    }
                },
                None => DEFAULT_LIST_LIMIT,
            };
            AdminCommand::ListRecent { limit }
        }
        "ping" => AdminCommand::Ping,
        "-h" | "--help" | "help" => {
            print_usage();
            std::process::exit(0);
        }
        other => {
            eprintln!("Unknown command: {}", other);
            print_usage();
            std::process::exit(1);
        }
    };

    match send_command(cmd) {
        Ok(response) => match response {
            AdminResponse::Ok { message } => {
                println!("{}", message);
            }
            AdminResponse::Error { error } => {
                eprintln!("Error: {}", error);
                std::process::exit(1);
            }
            AdminResponse::Entries { items } => {
                if items.is_empty() {
                    println!("(none)");
                } else {
                    for e in items {
                        println!(
                            "{} [{}] {} | {} -> {} ({})",
                            e.timestamp,
                            e.id.as_deref().unwrap_or("-"),
                            e.x,
                            e.y,
                            e.z,
                            e.score
                        );
                    }
                }
            }
            AdminResponse::Count { value } => {
                println!("{}", value);
            }
            AdminResponse::Pong => {
                println!("pong - resonance-node is running");
            }
        },
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    }
}
