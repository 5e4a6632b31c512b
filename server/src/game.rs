//! Authoritative game state and the request dispatcher.
//!
//! `GameState` owns the user directory, the matchmaking queue and the
//! session registry, and turns client requests into outgoing messages. It
//! never touches sockets: every handler returns the messages to deliver, in
//! order, and the network layer writes them out.
//!
//! Password hashing and verification are too slow for the event loop. `reg`
//! and `log` become [`AuthTask`]s that the caller runs elsewhere and hands
//! back through [`GameState::complete_auth`]. Until then, further messages
//! from the same client are held back so replies keep their order.

use crate::client_manager::SlotId;
use crate::matchmaking::MatchQueue;
use crate::session::{SessionId, SessionRegistry};
use crate::users::{self, LoginOutcome, RegisterOutcome, UserDirectory};
use log::{debug, error, info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shared::{Command, ServerMessage, Status};
use std::collections::{HashMap, VecDeque};
use std::fmt::Write as _;

/// A message addressed to one client slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Outgoing {
    pub to: SlotId,
    pub message: ServerMessage,
}

impl Outgoing {
    pub fn new(to: SlotId, message: ServerMessage) -> Self {
        Self { to, message }
    }
}

/// Identifies one credential check, so results for a connection that has
/// gone away (and whose slot may be reused) are dropped.
pub type Ticket = u64;

#[derive(Debug, Clone, PartialEq, Eq)]
enum AuthJob {
    Hash {
        login: String,
        password: String,
    },
    Verify {
        login: String,
        password: String,
        credential: String,
    },
}

/// Credential work for one `reg` or `log`. [`AuthTask::run`] blocks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthTask {
    pub ticket: Ticket,
    pub client: SlotId,
    job: AuthJob,
}

impl AuthTask {
    pub fn run(self) -> AuthOutcome {
        let result = match self.job {
            AuthJob::Hash { login, password } => AuthResult::Hashed {
                credential: users::hash_password(&password).map_err(|e| e.to_string()),
                login,
            },
            AuthJob::Verify {
                login,
                password,
                credential,
            } => AuthResult::Verified {
                verified: users::verify_password(&password, &credential),
                login,
            },
        };
        AuthOutcome {
            ticket: self.ticket,
            client: self.client,
            result,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthResult {
    Hashed {
        login: String,
        credential: Result<String, String>,
    },
    Verified {
        login: String,
        verified: bool,
    },
}

/// Result of an [`AuthTask`], fed back into [`GameState::complete_auth`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthOutcome {
    pub ticket: Ticket,
    pub client: SlotId,
    pub result: AuthResult,
}

pub struct GameState {
    users: UserDirectory,
    sessions: SessionRegistry,
    queue: MatchQueue,
    /// Slot -> login bound by a successful `log`.
    logins: HashMap<SlotId, String>,
    /// Slot -> ticket of its credential check in flight.
    in_flight: HashMap<SlotId, Ticket>,
    /// Commands that arrived while the slot had a check in flight.
    deferred: HashMap<SlotId, VecDeque<Command>>,
    auth_tasks: Vec<AuthTask>,
    next_ticket: Ticket,
    rng: StdRng,
}

impl GameState {
    pub fn new(users: UserDirectory, session_count: usize) -> Self {
        Self::with_rng(users, session_count, StdRng::from_entropy())
    }

    /// Same as [`GameState::new`] with a caller-provided RNG for the
    /// first-move draw.
    pub fn with_rng(users: UserDirectory, session_count: usize, rng: StdRng) -> Self {
        Self {
            users,
            sessions: SessionRegistry::new(session_count),
            queue: MatchQueue::new(),
            logins: HashMap::new(),
            in_flight: HashMap::new(),
            deferred: HashMap::new(),
            auth_tasks: Vec::new(),
            next_ticket: 0,
            rng,
        }
    }

    pub fn users(&self) -> &UserDirectory {
        &self.users
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    pub fn queue(&self) -> &MatchQueue {
        &self.queue
    }

    pub fn login_of(&self, client: SlotId) -> Option<&str> {
        self.logins.get(&client).map(String::as_str)
    }

    /// Parses and handles one raw message. Malformed input is logged and
    /// dropped; the client gets no reply.
    pub fn handle_message(&mut self, client: SlotId, message: &str) -> Vec<Outgoing> {
        match message.parse::<Command>() {
            Ok(command) => self.handle_command(client, command),
            Err(e) => {
                warn!("Ignoring message from client {}: {}", client, e);
                Vec::new()
            }
        }
    }

    pub fn handle_command(&mut self, client: SlotId, command: Command) -> Vec<Outgoing> {
        debug!("Got {} from {}", command.verb(), client);
        if self.in_flight.contains_key(&client) {
            self.deferred.entry(client).or_default().push_back(command);
            return Vec::new();
        }

        let mut out = Vec::new();
        self.dispatch(client, command, &mut out);
        out
    }

    /// Credential checks queued since the last call. The caller runs them
    /// off the event loop and returns each result to [`GameState::complete_auth`].
    pub fn take_auth_tasks(&mut self) -> Vec<AuthTask> {
        std::mem::take(&mut self.auth_tasks)
    }

    /// Applies a finished credential check and replays whatever the client
    /// sent while it was running.
    pub fn complete_auth(&mut self, outcome: AuthOutcome) -> Vec<Outgoing> {
        let AuthOutcome {
            ticket,
            client,
            result,
        } = outcome;
        let mut out = Vec::new();
        if self.in_flight.get(&client) != Some(&ticket) {
            debug!("Dropping stale credential check {} for client {}", ticket, client);
            return out;
        }
        self.in_flight.remove(&client);

        match result {
            AuthResult::Hashed {
                login,
                credential: Ok(credential),
            } => {
                let outcome = self.users.insert_hashed(&login, credential);
                out.push(Outgoing::new(client, ServerMessage::Status(outcome.into())));
            }
            AuthResult::Hashed {
                login,
                credential: Err(e),
            } => error!("Registration of {} failed: {}", login, e),
            AuthResult::Verified { login, verified } => {
                let outcome = self.users.finish_login(&login, verified);
                out.push(Outgoing::new(client, ServerMessage::Status(outcome.into())));
                if outcome == LoginOutcome::Ok {
                    info!("Client {} logged in as {}", client, login);
                    self.logins.insert(client, login);
                    self.queue.enqueue(client);
                }
            }
        }

        while !self.in_flight.contains_key(&client) {
            let Some(command) = self.deferred.get_mut(&client).and_then(VecDeque::pop_front)
            else {
                break;
            };
            self.dispatch(client, command, &mut out);
        }
        if self.deferred.get(&client).is_some_and(VecDeque::is_empty) {
            self.deferred.remove(&client);
        }
        out
    }

    fn dispatch(&mut self, client: SlotId, command: Command, out: &mut Vec<Outgoing>) {
        match command {
            Command::Register { login, password } => self.register(client, login, password, out),
            Command::Login { login, password } => self.login(client, login, password, out),
            Command::Put { cell } => self.put(client, cell, out),
            Command::Again => self.again(client),
        }
    }

    /// Pairs waiting clients while there are at least two of them and a
    /// free session to put them in.
    pub fn create_sessions(&mut self) -> Vec<Outgoing> {
        let mut out = Vec::new();
        while self.queue.len() >= 2 {
            let Some(session_id) = self.sessions.allocate() else {
                debug!("{} client(s) waiting, no free session", self.queue.len());
                break;
            };
            let Some((first, second)) = self.queue.dequeue_pair() else {
                self.sessions.release(session_id);
                break;
            };
            self.start_session(session_id, first, second, &mut out);
        }
        out
    }

    /// Cleans up after a closed connection: ends its session, notifies the
    /// opponent, logs the user out and drops it from the queue.
    pub fn handle_disconnect(&mut self, client: SlotId) -> Vec<Outgoing> {
        let mut out = Vec::new();
        self.queue.remove(client);
        self.in_flight.remove(&client);
        self.deferred.remove(&client);

        let Some(login) = self.logins.remove(&client) else {
            return out;
        };
        if let Some(session_id) = self.active_session_of(&login) {
            let others: Vec<SlotId> = self
                .sessions
                .participants(session_id)
                .iter()
                .copied()
                .filter(|&id| id != client)
                .collect();
            for other in others {
                out.push(Outgoing::new(other, ServerMessage::Disconnect));
                if let Some(other_login) = self.logins.get(&other) {
                    self.users.clear_playing(other_login);
                }
            }
            self.sessions.release(session_id);
            info!("Session {} closed: {} left", session_id, login);
        }
        self.users.logout(&login);
        out
    }

    /// Text for the `queue` console command.
    pub fn queue_report(&self) -> String {
        let ids: Vec<String> = self.queue.iter().map(|id| id.to_string()).collect();
        format!("{}\n{}", self.queue.len(), ids.join(" "))
    }

    /// Text for the `db` console command. Credentials are left out.
    pub fn db_report(&self) -> String {
        let mut report = String::new();
        for (login, record) in self.users.iter() {
            let session = match record.active_session {
                Some(id) => format!("{} in_use={}", id, self.sessions.is_in_use(id)),
                None => "-".to_string(),
            };
            let _ = writeln!(
                report,
                "{} logged={} playing={} session={}",
                login,
                record.is_logged,
                record.is_playing(),
                session
            );
        }
        report
    }

    fn register(
        &mut self,
        client: SlotId,
        login: String,
        password: String,
        out: &mut Vec<Outgoing>,
    ) {
        if self.users.contains(&login) {
            out.push(Outgoing::new(
                client,
                ServerMessage::Status(RegisterOutcome::AlreadyExists.into()),
            ));
            return;
        }
        self.queue_auth(client, AuthJob::Hash { login, password });
    }

    fn login(
        &mut self,
        client: SlotId,
        login: String,
        password: String,
        out: &mut Vec<Outgoing>,
    ) {
        if let Some(bound) = self.logins.get(&client) {
            warn!("Client {} is already logged in as {}", client, bound);
            out.push(Outgoing::new(
                client,
                ServerMessage::Status(Status::AlreadyLoggedIn),
            ));
            return;
        }

        let Some(credential) = self.users.credential(&login).map(str::to_string) else {
            out.push(Outgoing::new(
                client,
                ServerMessage::Status(LoginOutcome::NotFound.into()),
            ));
            return;
        };
        self.queue_auth(
            client,
            AuthJob::Verify {
                login,
                password,
                credential,
            },
        );
    }

    fn queue_auth(&mut self, client: SlotId, job: AuthJob) {
        let ticket = self.next_ticket;
        self.next_ticket += 1;
        self.in_flight.insert(client, ticket);
        self.auth_tasks.push(AuthTask {
            ticket,
            client,
            job,
        });
    }

    fn put(&mut self, client: SlotId, cell: usize, out: &mut Vec<Outgoing>) {
        let Some(session_id) = self
            .logins
            .get(&client)
            .and_then(|login| self.active_session_of(login))
        else {
            warn!("Client {} sent a move outside of a session", client);
            return;
        };
        let Some(session) = self.sessions.get_mut(session_id) else {
            return;
        };
        if !session.in_use || !session.has_participant(client) {
            warn!("Client {} is not part of session {}", client, session_id);
            return;
        }
        if !session.board.is_free(cell) {
            warn!("Client {} sent an invalid cell {}", client, cell);
            return;
        }
        if session.turn_owner != Some(client) {
            warn!("Client {} moved out of turn", client);
            return;
        }

        // Everyone hears about the move before it lands on the board.
        let mark = session.board.turn();
        for &participant in session.participants() {
            out.push(Outgoing::new(participant, ServerMessage::Move { mark, cell }));
        }
        session.board.apply_move(cell);
        session.turn_owner = session.opponent_of(client);

        let result = if session.board.is_won() {
            ServerMessage::Win
        } else if session.board.is_draw() {
            ServerMessage::Draw
        } else {
            return;
        };

        let participants = session.participants().to_vec();
        for participant in participants {
            out.push(Outgoing::new(participant, result));
            if let Some(login) = self.logins.get(&participant) {
                self.users.clear_playing(login);
            }
        }
        self.sessions.release(session_id);
        info!("Session {} finished: {}", session_id, result);
    }

    fn again(&mut self, client: SlotId) {
        let Some(login) = self.logins.get(&client) else {
            warn!("Client {} asked for a new game without logging in", client);
            return;
        };
        if self.active_session_of(login).is_some() {
            warn!("Client {} asked for a new game while playing", client);
            return;
        }
        if self.queue.enqueue(client) {
            info!("Pushing {} to queue", client);
        }
    }

    fn start_session(
        &mut self,
        session_id: SessionId,
        first: SlotId,
        second: SlotId,
        out: &mut Vec<Outgoing>,
    ) {
        for client in [first, second] {
            if let Some(login) = self.logins.get(&client) {
                self.users.mark_playing(login, session_id);
            }
            self.sessions.add_participant(session_id, client);
        }

        // Uniform draw, independent of queue order.
        let (starter, locked) = if self.rng.gen_bool(0.5) {
            (first, second)
        } else {
            (second, first)
        };
        if let Some(session) = self.sessions.get_mut(session_id) {
            session.board.reset();
            session.turn_owner = Some(starter);
        }

        out.push(Outgoing::new(first, ServerMessage::Restart));
        out.push(Outgoing::new(second, ServerMessage::Restart));
        out.push(Outgoing::new(locked, ServerMessage::Lock));
        info!(
            "Session {} started: {} vs {}, {} moves first ({}/{} sessions in use)",
            session_id,
            first,
            second,
            starter,
            self.sessions.in_use_count(),
            self.sessions.capacity()
        );
    }

    fn active_session_of(&self, login: &str) -> Option<SessionId> {
        self.users.get(login).and_then(|record| record.active_session)
    }
}
