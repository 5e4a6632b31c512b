//! Operator commands typed on the server's stdin.
//!
//! The console thread never touches server state. It parses lines and sends
//! them into the event loop, which owns everything.

use log::{info, warn};
use std::io::{self, BufRead};
use std::str::FromStr;
use std::thread;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleCommand {
    /// Print the matchmaking queue.
    Queue,
    /// Print the user table.
    Db,
    /// Persist users, notify clients and stop.
    Exit,
}

impl FromStr for ConsoleCommand {
    type Err = String;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        match line.trim() {
            "queue" => Ok(ConsoleCommand::Queue),
            "db" => Ok(ConsoleCommand::Db),
            "exit" => Ok(ConsoleCommand::Exit),
            other => Err(other.to_string()),
        }
    }
}

/// Forwards commands read from `input` until `exit`, end of input, or the
/// event loop going away.
pub fn forward_commands<R>(input: R, commands: mpsc::UnboundedSender<ConsoleCommand>)
where
    R: BufRead,
{
    for line in input.lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                warn!("Failed to read console input: {}", e);
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        info!("Entered a command: {}", line.trim());

        match line.parse::<ConsoleCommand>() {
            Ok(command) => {
                if commands.send(command).is_err() || command == ConsoleCommand::Exit {
                    break;
                }
            }
            Err(_) => println!("Unknown command."),
        }
    }
}

/// Starts the stdin reader on its own OS thread. A blocking stdin read can't
/// be cancelled, so the thread is left detached and dies with the process.
pub fn spawn_stdin(commands: mpsc::UnboundedSender<ConsoleCommand>) -> thread::JoinHandle<()> {
    thread::spawn(move || forward_commands(io::stdin().lock(), commands))
}
