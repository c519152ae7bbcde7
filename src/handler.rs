//! Per-session client handler
//!
//! One handler thread runs per registered session. It reads the session's
//! lines in arrival order, turns each into a broadcast or a control action,
//! and tears the session down when it stops.

use std::io::BufRead;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::command::{self, Command, KICK, KILL};
use crate::message::Message;
use crate::registry::Registry;
use crate::server::ServerControl;
use crate::session::Session;

/// Handler lifecycle; every state except `Active` is terminal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerState {
    /// Reading lines
    Active,
    /// The client sent `bye`
    LoggedOut,
    /// The privileged client stopped the server
    Killed,
    /// A privileged client kicked this one
    Banned,
    /// The connection failed or closed without `bye`
    Faulted,
}

impl HandlerState {
    pub fn is_terminal(self) -> bool {
        self != HandlerState::Active
    }
}

/// Worker bound to one session
pub struct ClientHandler {
    session: Arc<Session>,
    input: Box<dyn BufRead + Send>,
    registry: Arc<Registry>,
    control: Arc<ServerControl>,
}

impl ClientHandler {
    /// Create a handler reading `session`'s lines from `input`
    ///
    /// The session is expected to be registered already; the caller must
    /// have counted this handler with [`ServerControl::handler_started`].
    pub fn new(
        session: Arc<Session>,
        input: impl BufRead + Send + 'static,
        registry: Arc<Registry>,
        control: Arc<ServerControl>,
    ) -> Self {
        Self {
            session,
            input: Box::new(input),
            registry,
            control,
        }
    }

    /// Run until a terminal state is reached, then clean up
    pub fn run(mut self) -> HandlerState {
        let name = self.session.name().to_string();
        info!("Handler for {} started", name);

        let mut state = HandlerState::Active;
        let mut line = String::new();
        while !state.is_terminal() {
            line.clear();
            let read = self.input.read_line(&mut line);

            if self.session.is_banned() {
                info!("{} is banned", name);
                state = HandlerState::Banned;
                break;
            }

            match read {
                Ok(0) => {
                    debug!("{} closed the connection", name);
                    state = HandlerState::Faulted;
                }
                Ok(_) => {
                    let text = line.trim_end_matches(['\r', '\n']);
                    info!("{} > {}", name, text);
                    state = self.handle_line(text);
                }
                Err(e) => {
                    warn!("Read from {} failed: {}", name, e);
                    state = HandlerState::Faulted;
                }
            }
        }

        self.finish(state);
        state
    }

    /// Process one line and return the resulting state
    fn handle_line(&self, line: &str) -> HandlerState {
        let name = self.session.name();
        match Command::parse(line) {
            Command::Say(content) => {
                self.registry.broadcast(&Message::authored(content, name));
                HandlerState::Active
            }
            Command::Bye => {
                self.registry
                    .broadcast(&Message::control(command::logged_out(name)));
                HandlerState::LoggedOut
            }
            Command::Kill => self.kill(),
            Command::Kick(target) => {
                self.kick(target.as_deref());
                HandlerState::Active
            }
            Command::Unrecognised(line) => {
                debug!("Ignoring control line from {}: {}", name, line);
                HandlerState::Active
            }
        }
    }

    fn kill(&self) -> HandlerState {
        let name = self.session.name();
        let guard = self.registry.lock();
        if guard.is_privileged(self.session.id()) {
            info!("{} requested server shutdown", name);
            self.control.stop_listening();
            return HandlerState::Killed;
        }

        info!("Kill request from unprivileged {} denied", name);
        guard.broadcast(&Message::control(command::denied(KILL, None, name)));
        HandlerState::Active
    }

    /// Lookup, ban and announcement happen in one critical section
    fn kick(&self, target: Option<&str>) {
        let requester = self.session.name();
        let guard = self.registry.lock();

        let content = if !guard.is_privileged(self.session.id()) {
            info!("Kick request from unprivileged {} denied", requester);
            command::denied(KICK, target, requester)
        } else {
            match target {
                None => {
                    warn!("Kick request from {} has no client name", requester);
                    command::kick_missing_target(requester)
                }
                Some(target) => match guard.find_by_name(target) {
                    Some(kicked) => {
                        kicked.ban();
                        info!("Client {} kicked by {}", target, requester);
                        command::kick_granted(target, requester)
                    }
                    None => command::kick_unknown(target, requester),
                },
            }
        };

        guard.broadcast(&Message::control(content));
    }

    /// Unregister, release the session, then report to the server
    fn finish(&self, state: HandlerState) {
        let name = self.session.name();
        info!("Handler for {} ending in state {:?}", name, state);

        self.registry.unregister(self.session.id());
        self.session.close();
        let remaining = self.control.handler_finished();
        debug!("{} handlers still running after {} left", remaining, name);
    }
}
