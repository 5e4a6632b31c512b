//! Line-based client for trying the server by hand.
//!
//! Type protocol commands (`reg alice secret`, `log alice secret`, `put 4`,
//! `again`); server messages are printed as they arrive, together with the
//! board as this client has seen it.

use clap::Parser;
use log::info;
use shared::{encode_line, Command, Mark, ServerMessage, DEFAULT_PORT};
use std::io::{self, BufRead};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::mpsc;

const CELLS: usize = 9;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short = 's', long, default_value_t = format!("127.0.0.1:{}", DEFAULT_PORT))]
    server: String,
}

fn describe(message: &ServerMessage) -> &'static str {
    match message {
        ServerMessage::Status(_) => "status",
        ServerMessage::Restart => "new game, board cleared",
        ServerMessage::Lock => "you move second",
        ServerMessage::Move { .. } => "move",
        ServerMessage::Win => "game won (by the last mover)",
        ServerMessage::Draw => "draw",
        ServerMessage::Disconnect => "opponent left, send `again` to play on",
        ServerMessage::Shutdown => "server is shutting down",
        ServerMessage::Full => "server is full",
    }
}

fn print_board(board: &[Option<Mark>; CELLS]) {
    for row in board.chunks(3) {
        let cells: Vec<String> = row
            .iter()
            .map(|cell| cell.map_or('.', Mark::as_char).to_string())
            .collect();
        println!("    {}", cells.join(" "));
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();

    let stream = TcpStream::connect(&args.server).await?;
    info!("Connected to {}", args.server);
    println!("Connected to {}", args.server);

    let (read_half, mut write_half) = stream.into_split();
    let mut server_lines = BufReader::new(read_half).lines();

    // Blocking stdin reads live on their own thread.
    let (input_tx, mut input_rx) = mpsc::unbounded_channel::<String>();
    std::thread::spawn(move || {
        for line in io::stdin().lock().lines().map_while(Result::ok) {
            if input_tx.send(line).is_err() {
                break;
            }
        }
    });

    let mut board = [None; CELLS];

    loop {
        tokio::select! {
            line = server_lines.next_line() => {
                let Some(line) = line? else {
                    println!("Server closed the connection");
                    break;
                };
                let message = match line.parse::<ServerMessage>() {
                    Ok(message) => message,
                    Err(e) => {
                        println!("< {} ({})", line, e);
                        continue;
                    }
                };
                println!("< {} ({})", line, describe(&message));
                match message {
                    ServerMessage::Restart => board = [None; CELLS],
                    ServerMessage::Move { mark, cell } if cell < CELLS => {
                        board[cell] = Some(mark);
                        print_board(&board);
                    }
                    ServerMessage::Shutdown | ServerMessage::Full => break,
                    message if message.is_terminal() => {
                        println!("Game over, send `again` to play another one");
                    }
                    _ => {}
                }
            }

            Some(line) = input_rx.recv() => {
                match line.parse::<Command>() {
                    Ok(command) => {
                        write_half.write_all(encode_line(&command).as_bytes()).await?;
                        println!("> {}", command);
                    }
                    Err(e) => println!("! {}", e),
                }
            }
        }
    }

    Ok(())
}
