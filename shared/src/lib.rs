//! Text protocol spoken between the tic-tac-toe server and its clients.
//!
//! Every message is a single line of whitespace-delimited ASCII tokens
//! terminated by `\n`. Clients send [`Command`]s, the server answers with
//! [`ServerMessage`]s.

use std::fmt;
use std::str::FromStr;

/// Default TCP port used by the binaries when nothing else is configured.
pub const DEFAULT_PORT: u16 = 8080;

/// Inbound messages longer than this are discarded.
pub const MAX_MESSAGE_LEN: usize = 1024;

/// Line terminator used to frame messages on the stream.
pub const MESSAGE_DELIMITER: u8 = b'\n';

/// Recoverable protocol failures. The connection stays open.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("empty message")]
    Empty,

    #[error("unknown command `{0}`")]
    UnknownVerb(String),

    #[error("`{verb}` is missing argument `{argument}`")]
    MissingArgument {
        verb: &'static str,
        argument: &'static str,
    },

    #[error("invalid cell index `{0}`")]
    InvalidCell(String),

    #[error("unrecognized server message `{0}`")]
    UnknownMessage(String),
}

/// Mark placed on the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Mark {
    X,
    O,
}

impl Mark {
    pub fn other(self) -> Mark {
        match self {
            Mark::X => Mark::O,
            Mark::O => Mark::X,
        }
    }

    pub fn as_char(self) -> char {
        match self {
            Mark::X => 'X',
            Mark::O => 'O',
        }
    }
}

impl fmt::Display for Mark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

/// Requests sent by a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `reg <login> <password>`
    Register { login: String, password: String },
    /// `log <login> <password>`
    Login { login: String, password: String },
    /// `put <cell>`
    Put { cell: usize },
    /// `again`
    Again,
}

impl Command {
    pub fn verb(&self) -> &'static str {
        match self {
            Command::Register { .. } => "reg",
            Command::Login { .. } => "log",
            Command::Put { .. } => "put",
            Command::Again => "again",
        }
    }
}

impl FromStr for Command {
    type Err = ProtocolError;

    /// Tokens past the ones a verb needs are ignored.
    fn from_str(message: &str) -> Result<Self, Self::Err> {
        let mut tokens = message.split_whitespace();
        let verb = tokens.next().ok_or(ProtocolError::Empty)?;

        let mut next = |verb: &'static str, argument: &'static str| {
            tokens
                .next()
                .map(str::to_string)
                .ok_or(ProtocolError::MissingArgument { verb, argument })
        };

        match verb {
            "reg" => Ok(Command::Register {
                login: next("reg", "login")?,
                password: next("reg", "password")?,
            }),
            "log" => Ok(Command::Login {
                login: next("log", "login")?,
                password: next("log", "password")?,
            }),
            "put" => {
                let raw = next("put", "cell")?;
                let cell = raw.parse().map_err(|_| ProtocolError::InvalidCell(raw))?;
                Ok(Command::Put { cell })
            }
            "again" => Ok(Command::Again),
            other => Err(ProtocolError::UnknownVerb(other.to_string())),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Register { login, password } => write!(f, "reg {} {}", login, password),
            Command::Login { login, password } => write!(f, "log {} {}", login, password),
            Command::Put { cell } => write!(f, "put {}", cell),
            Command::Again => write!(f, "again"),
        }
    }
}

/// Numeric replies to `reg` and `log`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    AlreadyExists,
    WrongPassword,
    NotFound,
    AlreadyLoggedIn,
}

impl Status {
    pub fn code(self) -> u16 {
        match self {
            Status::Ok => 200,
            Status::AlreadyExists => 400,
            Status::WrongPassword => 401,
            Status::NotFound => 404,
            Status::AlreadyLoggedIn => 405,
        }
    }

    pub fn from_code(code: u16) -> Option<Status> {
        match code {
            200 => Some(Status::Ok),
            400 => Some(Status::AlreadyExists),
            401 => Some(Status::WrongPassword),
            404 => Some(Status::NotFound),
            405 => Some(Status::AlreadyLoggedIn),
            _ => None,
        }
    }
}

/// Everything the server writes to a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerMessage {
    Status(Status),
    /// A new session started and the board was cleared.
    Restart,
    /// The receiver moves second.
    Lock,
    /// A mark was placed on `cell`.
    Move { mark: Mark, cell: usize },
    Win,
    Draw,
    /// The opponent left the session.
    Disconnect,
    /// The server is terminating; the connection closes right after.
    Shutdown,
    /// No free client slot; the connection closes right after.
    Full,
}

impl ServerMessage {
    /// True for messages after which the receiver's session is over.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ServerMessage::Win
                | ServerMessage::Draw
                | ServerMessage::Disconnect
                | ServerMessage::Shutdown
        )
    }
}

impl fmt::Display for ServerMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerMessage::Status(status) => write!(f, "{}", status.code()),
            ServerMessage::Restart => write!(f, "restart"),
            ServerMessage::Lock => write!(f, "lock"),
            ServerMessage::Move { mark, cell } => write!(f, "{}{}", mark, cell),
            ServerMessage::Win => write!(f, "win"),
            ServerMessage::Draw => write!(f, "draw"),
            ServerMessage::Disconnect => write!(f, "disconnect"),
            ServerMessage::Shutdown => write!(f, "shutdown"),
            ServerMessage::Full => write!(f, "full"),
        }
    }
}

impl FromStr for ServerMessage {
    type Err = ProtocolError;

    fn from_str(message: &str) -> Result<Self, Self::Err> {
        let message = message.trim();
        let unknown = || ProtocolError::UnknownMessage(message.to_string());

        match message {
            "" => Err(ProtocolError::Empty),
            "restart" => Ok(ServerMessage::Restart),
            "lock" => Ok(ServerMessage::Lock),
            "win" => Ok(ServerMessage::Win),
            "draw" => Ok(ServerMessage::Draw),
            "disconnect" => Ok(ServerMessage::Disconnect),
            "shutdown" => Ok(ServerMessage::Shutdown),
            "full" => Ok(ServerMessage::Full),
            _ => {
                if let Ok(code) = message.parse::<u16>() {
                    return Status::from_code(code)
                        .map(ServerMessage::Status)
                        .ok_or_else(unknown);
                }
                let mark = match message.as_bytes()[0] {
                    b'X' => Mark::X,
                    b'O' => Mark::O,
                    _ => return Err(unknown()),
                };
                let cell = message[1..].parse().map_err(|_| unknown())?;
                Ok(ServerMessage::Move { mark, cell })
            }
        }
    }
}

/// Frames a message for the wire.
pub fn encode_line(message: impl fmt::Display) -> String {
    format!("{}\n", message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_register_and_login() {
        assert_eq!(
            "reg alice secret".parse::<Command>().unwrap(),
            Command::Register {
                login: "alice".to_string(),
                password: "secret".to_string(),
            }
        );
        assert_eq!(
            "log  Bob   pw ".parse::<Command>().unwrap(),
            Command::Login {
                login: "Bob".to_string(),
                password: "pw".to_string(),
            }
        );
    }

    #[test]
    fn test_parse_put_and_again() {
        assert_eq!("put 4".parse::<Command>().unwrap(), Command::Put { cell: 4 });
        assert_eq!("again".parse::<Command>().unwrap(), Command::Again);
        assert_eq!("again now".parse::<Command>().unwrap(), Command::Again);
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!("".parse::<Command>(), Err(ProtocolError::Empty));
        assert_eq!("   ".parse::<Command>(), Err(ProtocolError::Empty));
        assert_eq!(
            "jump 3".parse::<Command>(),
            Err(ProtocolError::UnknownVerb("jump".to_string()))
        );
        assert_eq!(
            "reg alice".parse::<Command>(),
            Err(ProtocolError::MissingArgument {
                verb: "reg",
                argument: "password"
            })
        );
        assert_eq!(
            "put".parse::<Command>(),
            Err(ProtocolError::MissingArgument {
                verb: "put",
                argument: "cell"
            })
        );
        assert_eq!(
            "put -1".parse::<Command>(),
            Err(ProtocolError::InvalidCell("-1".to_string()))
        );
    }

    #[test]
    fn test_server_message_wire_format() {
        assert_eq!(ServerMessage::Status(Status::Ok).to_string(), "200");
        assert_eq!(ServerMessage::Status(Status::AlreadyExists).to_string(), "400");
        assert_eq!(ServerMessage::Status(Status::WrongPassword).to_string(), "401");
        assert_eq!(ServerMessage::Status(Status::NotFound).to_string(), "404");
        assert_eq!(ServerMessage::Status(Status::AlreadyLoggedIn).to_string(), "405");
        assert_eq!(
            ServerMessage::Move {
                mark: Mark::X,
                cell: 4
            }
            .to_string(),
            "X4"
        );
        assert_eq!(encode_line(ServerMessage::Lock), "lock\n");
    }

    #[test]
    fn test_server_message_parse() {
        assert_eq!(
            "O8".parse::<ServerMessage>(),
            Ok(ServerMessage::Move {
                mark: Mark::O,
                cell: 8
            })
        );
        assert_eq!(
            "405\r\n".parse::<ServerMessage>(),
            Ok(ServerMessage::Status(Status::AlreadyLoggedIn))
        );
        assert_eq!("shutdown".parse::<ServerMessage>(), Ok(ServerMessage::Shutdown));
        assert!("500".parse::<ServerMessage>().is_err());
        assert!("Xy".parse::<ServerMessage>().is_err());
        assert!("hello".parse::<ServerMessage>().is_err());
    }

    #[test]
    fn test_terminal_messages() {
        assert!(ServerMessage::Win.is_terminal());
        assert!(ServerMessage::Disconnect.is_terminal());
        assert!(!ServerMessage::Lock.is_terminal());
        assert!(!ServerMessage::Status(Status::Ok).is_terminal());
    }

    #[test]
    fn test_mark_other() {
        assert_eq!(Mark::X.other(), Mark::O);
        assert_eq!(Mark::O.other(), Mark::X);
    }
}
