//! # Tic-tac-toe Server Library
//!
//! This library provides the authoritative server for networked tic-tac-toe.
//! Clients register and log in, wait in a matchmaking queue, get paired into
//! one of a fixed number of game sessions, and exchange moves that the server
//! validates and broadcasts until the game is won, drawn or abandoned.
//!
//! ## Architecture Design
//!
//! ### Single-Owner Event Loop
//! One tokio task owns every piece of mutable state: the client table, the
//! user directory, the matchmaking queue and the session pool. Socket readers,
//! socket writers and the operator console only exchange messages with it over
//! channels, so there is no shared mutable state and no locking.
//!
//! ### Text Protocol over TCP
//! Requests and replies are newline-terminated lines of whitespace-separated
//! tokens (see the `shared` crate). Each client has one ordered outgoing
//! channel, so messages such as `restart` followed by `lock` always arrive in
//! the order they were produced.
//!
//! ### Periodic Matchmaking
//! The loop wakes up at least every 500 ms even without traffic and pairs
//! waiting clients whenever a session is free.
//!
//! ## Module Organization
//!
//! - `board`: N×N grid, move application, win/draw evaluation
//! - `session`: fixed pool of sessions with allocation and release
//! - `matchmaking`: FIFO queue of clients waiting for an opponent
//! - `users`: login table with Argon2-hashed credentials and the flat-file store
//! - `game`: request dispatcher tying the above together
//! - `client_manager`: bounded table of connected clients
//! - `network`: TCP accept, per-connection tasks and the event loop
//! - `console`: operator commands read from stdin
//! - `config`: `KEY=VALUE` configuration file
//! - `error`: fatal startup and persistence errors
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::ServerConfig;
//! use server::network::Server;
//! use server::users::UserDirectory;
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServerConfig::load(Path::new("server.config"))?;
//!     let users = UserDirectory::load(&config.db_file)?;
//!
//!     let server = Server::new(&config, users).await?;
//!     server::console::spawn_stdin(server.control_handle());
//!
//!     // Serves until `exit` is typed on stdin.
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod board;
pub mod client_manager;
pub mod config;
pub mod console;
pub mod error;
pub mod game;
pub mod matchmaking;
pub mod network;
pub mod session;
pub mod users;
