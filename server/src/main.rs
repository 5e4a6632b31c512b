use clap::Parser;
use log::{error, info};
use server::config::{ServerConfig, DEFAULT_CONFIG_PATH};
use server::console::{self, ConsoleCommand};
use server::error::Result;
use server::network::Server;
use server::users::UserDirectory;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the KEY=VALUE configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Override the HOST setting
    #[arg(short = 'H', long)]
    host: Option<String>,

    /// Override the PORT setting
    #[arg(short, long)]
    port: Option<u16>,

    /// Override the user database file (DBFILE setting)
    #[arg(long)]
    db: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    match serve(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            eprintln!("{}", e);
            ExitCode::FAILURE
        }
    }
}

async fn serve(args: Args) -> Result<()> {
    let mut config = ServerConfig::load(&args.config)?;
    if let Some(host) = args.host {
        config.host = host;
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(db) = args.db {
        config.db_file = db;
    }
    println!("Config loaded");

    let users = UserDirectory::load(&config.db_file)?;
    println!("Database loaded");

    let server = Server::new(&config, users).await?;
    let control = server.control_handle();
    console::spawn_stdin(control.clone());

    // Ctrl+C shuts down the same way `exit` does.
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl+C, shutting down gracefully...");
            let _ = control.send(ConsoleCommand::Exit);
        }
    });

    println!("Waiting for connections...");
    server.run().await
}
