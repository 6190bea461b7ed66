use super::matchmaker::{Matchmaker, Pairing};
use super::session::Session;
use crate::common::{
    Connection, ConnectionEvent, ConnectionId, DuelError, Frame, GameRules, Result, ServerConfig,
    SessionId,
};
use std::collections::{HashMap, HashSet};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread;
use tracing::{debug, error, info, warn};

/// Everything the dispatcher thread reacts to, in one ordered stream.
pub enum ServerEvent {
    Paired(Pairing<Connection>),
    Connection {
        id: ConnectionId,
        event: ConnectionEvent<Frame>,
    },
}

pub struct GameServer {
    listener: TcpListener,
    rules: GameRules,
    matchmaker: Arc<Matchmaker<Connection>>,
}

impl GameServer {
    pub fn bind(config: &ServerConfig) -> Result<Self> {
        let listener = TcpListener::bind(config.bind)?;
        Ok(Self {
            listener,
            rules: GameRules::default(),
            matchmaker: Arc::new(Matchmaker::new()),
        })
    }

    pub fn with_rules(mut self, rules: GameRules) -> Self {
        self.rules = rules;
        self
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accepts forever. Pairing and relaying happen on the dispatcher thread.
    pub fn run(self) -> Result<()> {
        let (events, inbox) = mpsc::channel();
        let dispatcher = Dispatcher::new(Arc::clone(&self.matchmaker), self.rules.clone());
        thread::Builder::new()
            .name("dispatcher".into())
            .spawn(move || dispatcher.run(inbox))?;

        info!("Listening for connections on {}", self.local_addr()?);
        for stream in self.listener.incoming() {
            match stream {
                Ok(stream) => {
                    if let Err(e) = self.accept(stream, &events) {
                        warn!(error = %e, "failed to set up connection");
                    }
                }
                Err(e) => warn!(error = %e, "connection failed"),
            }
        }
        Ok(())
    }

    fn accept(&self, stream: TcpStream, events: &Sender<ServerEvent>) -> Result<()> {
        let id = self.matchmaker.register();
        let (connection, reader) = Connection::open(id, stream)?;
        info!(%id, peer = ?connection.peer_addr(), "accepted connection");

        // The pairing is queued before this reader can produce anything, so
        // the dispatcher always knows the session before its first frame.
        if let Some(pairing) = self.matchmaker.admit(id, connection) {
            events
                .send(ServerEvent::Paired(pairing))
                .map_err(|_| DuelError::NetworkError("dispatcher stopped".into()))?;
        }

        let events = events.clone();
        reader.spawn::<Frame, _>(move |event| {
            let _ = events.send(ServerEvent::Connection { id, event });
        })?;
        Ok(())
    }
}

/// Routes connection events to sessions and cleans up after leavers.
pub(crate) struct Dispatcher {
    matchmaker: Arc<Matchmaker<Connection>>,
    rules: GameRules,
    next_session: u64,
    sessions: HashMap<SessionId, Session<Connection>>,
    routes: HashMap<ConnectionId, SessionId>,
    /// Disconnects that arrived after the matchmaker paired the connection
    /// but before the pairing reached this thread.
    orphans: HashSet<ConnectionId>,
}

impl Dispatcher {
    pub(crate) fn new(matchmaker: Arc<Matchmaker<Connection>>, rules: GameRules) -> Self {
        Self {
            matchmaker,
            rules,
            next_session: 0,
            sessions: HashMap::new(),
            routes: HashMap::new(),
            orphans: HashSet::new(),
        }
    }

    fn run(mut self, inbox: Receiver<ServerEvent>) {
        for event in inbox {
            self.handle(event);
        }
        error!("event channel closed, dispatcher stopping");
    }

    pub(crate) fn handle(&mut self, event: ServerEvent) {
        match event {
            ServerEvent::Paired(pairing) => self.start_session(pairing),
            ServerEvent::Connection { id, event } => self.route(id, event),
        }
    }

    fn start_session(&mut self, pairing: Pairing<Connection>) {
        self.next_session += 1;
        let session_id = SessionId(self.next_session);
        let mut session = Session::new(session_id, pairing.first.1, pairing.second.1);
        session.start(&self.rules);

        let ids = session.connection_ids();
        for id in ids {
            self.routes.insert(id, session_id);
        }
        self.sessions.insert(session_id, session);

        for id in ids {
            if self.orphans.remove(&id) {
                self.route(id, ConnectionEvent::Disconnected);
            }
        }
    }

    fn route(&mut self, id: ConnectionId, event: ConnectionEvent<Frame>) {
        let Some(&session_id) = self.routes.get(&id) else {
            match event {
                ConnectionEvent::Disconnected => {
                    if self.matchmaker.withdraw(id).is_none() {
                        self.orphans.insert(id);
                    }
                }
                ConnectionEvent::Message(frame) => {
                    debug!(%id, tag = %char::from(frame.tag), "ignoring message before game start");
                }
            }
            return;
        };
        let Some(session) = self.sessions.get_mut(&session_id) else {
            return;
        };
        session.handle(id, event);

        if session.is_finished() {
            for id in session.connection_ids() {
                self.routes.remove(&id);
            }
            self.sessions.remove(&session_id);
            info!(session = %session_id, "session closed");
        }
    }

    pub(crate) fn session_count(&self) -> usize {
        self.sessions.len()
    }
}
