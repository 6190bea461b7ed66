use crate::common::{
    ConnectionEvent, ConnectionId, Frame, GameRules, GameStart, Message, Outbox, Role, SessionId,
    Tag,
};
use tracing::{debug, info, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Waiting,
    Active,
    Ended,
}

/// What the session did with one inbound event.
#[derive(Debug, PartialEq, Eq)]
pub enum Relay {
    /// The frame went to the other peer, unchanged.
    Forwarded(u8),
    /// The other peer was told that this one is gone.
    PeerLeft,
    /// Nothing was sent.
    Ignored,
}

struct Seat<P> {
    role: Role,
    peer: P,
    connected: bool,
}

/// Relay between two paired connections.
///
/// The session never interprets payloads and never simulates anything: each
/// frame from one seat goes, byte for byte, to the other seat and only
/// there.
pub struct Session<P> {
    id: SessionId,
    seats: [Seat<P>; 2],
    state: SessionState,
}

impl<P: Outbox> Session<P> {
    /// Seats are assigned from arrival order: `first` plays role 0.
    pub fn new(id: SessionId, first: P, second: P) -> Self {
        let seat = |role, peer| Seat {
            role,
            peer,
            connected: true,
        };
        Self {
            id,
            seats: [seat(Role::First, first), seat(Role::Second, second)],
            state: SessionState::Waiting,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn connection_ids(&self) -> [ConnectionId; 2] {
        [self.seats[0].peer.id(), self.seats[1].peer.id()]
    }

    /// True once neither peer is connected any more.
    pub fn is_finished(&self) -> bool {
        self.seats.iter().all(|seat| !seat.connected)
    }

    /// Sends each peer its mirrored view of the starting positions.
    pub fn start(&mut self, rules: &GameRules) {
        if self.state != SessionState::Waiting {
            return;
        }
        for (me, them) in [(0, 1), (1, 0)] {
            let start = game_start(rules, &self.seats[me], &self.seats[them]);
            self.seats[me].peer.send(&Message::GameStart(start));
        }
        self.state = SessionState::Active;
        let [first, second] = self.connection_ids();
        info!(session = %self.id, %first, %second, "game started");
    }

    pub fn handle(&mut self, from: ConnectionId, event: ConnectionEvent<Frame>) -> Relay {
        let Some(me) = self.seats.iter().position(|seat| seat.peer.id() == from) else {
            warn!(session = %self.id, %from, "event from a connection outside this session");
            return Relay::Ignored;
        };
        let other = 1 - me;

        match event {
            ConnectionEvent::Disconnected => {
                self.seats[me].connected = false;
                if self.state == SessionState::Ended || !self.seats[other].connected {
                    return Relay::Ignored;
                }
                info!(session = %self.id, %from, "player disconnected");
                self.seats[other]
                    .peer
                    .send(&Frame::bare(Tag::Disconnect.byte()));
                self.state = SessionState::Ended;
                Relay::PeerLeft
            }
            ConnectionEvent::Message(frame) => self.relay(from, other, frame),
        }
    }

    fn relay(&mut self, from: ConnectionId, to: usize, frame: Frame) -> Relay {
        if self.state != SessionState::Active || !self.seats[to].connected {
            debug!(session = %self.id, %from, tag = %char::from(frame.tag), "not relaying");
            return Relay::Ignored;
        }
        match frame.known_tag() {
            Some(Tag::GameStart) => {
                warn!(session = %self.id, %from, "clients cannot start games");
                Relay::Ignored
            }
            known => {
                debug!(session = %self.id, %from, tag = %char::from(frame.tag), "relaying");
                self.seats[to].peer.send(&frame);
                if matches!(known, Some(Tag::GameEnd | Tag::Disconnect)) {
                    self.state = SessionState::Ended;
                }
                Relay::Forwarded(frame.tag)
            }
        }
    }
}

fn game_start<P: Outbox>(rules: &GameRules, me: &Seat<P>, them: &Seat<P>) -> GameStart {
    let mine = rules.spawn_point(me.role);
    let theirs = rules.spawn_point(them.role);
    GameStart {
        local_id: me.peer.id(),
        local_texture: rules.texture(me.role).to_string(),
        local_x: mine.x,
        local_y: mine.y,
        remote_id: them.peer.id(),
        remote_texture: rules.texture(them.role).to_string(),
        remote_x: theirs.x,
        remote_y: theirs.y,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::messages::read_message;
    use crate::common::{Direction, Encode, PlayerDamage, PlayerTeleport, Vector2};
    use std::io::Cursor;
    use std::sync::{Arc, Mutex};

    #[derive(Clone)]
    struct RecordingPeer {
        id: ConnectionId,
        sent: Arc<Mutex<Vec<Vec<u8>>>>,
    }

    impl RecordingPeer {
        fn new(id: u64) -> Self {
            Self {
                id: ConnectionId(id),
                sent: Arc::default(),
            }
        }

        fn take(&self) -> Vec<Vec<u8>> {
            std::mem::take(&mut *self.sent.lock().unwrap())
        }
    }

    impl Outbox for RecordingPeer {
        fn id(&self) -> ConnectionId {
            self.id
        }

        fn push(&self, bytes: Vec<u8>) {
            self.sent.lock().unwrap().push(bytes);
        }
    }

    fn frame(message: Message) -> Frame {
        let bytes = message.encode().unwrap();
        read_message(&mut Cursor::new(bytes)).unwrap()
    }

    fn decode(bytes: &[u8]) -> Message {
        read_message(&mut Cursor::new(bytes.to_vec())).unwrap()
    }

    fn started() -> (Session<RecordingPeer>, RecordingPeer, RecordingPeer) {
        let (a, b) = (RecordingPeer::new(1), RecordingPeer::new(2));
        let mut session = Session::new(SessionId(1), a.clone(), b.clone());
        session.start(&GameRules::default());
        a.take();
        b.take();
        (session, a, b)
    }

    #[test]
    fn test_start_sends_mirrored_roles() {
        let (a, b) = (RecordingPeer::new(1), RecordingPeer::new(2));
        let mut session = Session::new(SessionId(1), a.clone(), b.clone());
        assert_eq!(session.state(), SessionState::Waiting);
        session.start(&GameRules::default());
        assert_eq!(session.state(), SessionState::Active);

        let (sent_a, sent_b) = (a.take(), b.take());
        assert_eq!((sent_a.len(), sent_b.len()), (1, 1));
        let (Message::GameStart(first), Message::GameStart(second)) =
            (decode(&sent_a[0]), decode(&sent_b[0]))
        else {
            panic!("expected game starts");
        };
        assert_eq!(first.local_spawn(), Vector2::new(1248.0, 32.0));
        assert_eq!(first.local_texture, "data/player1.png");
        assert_eq!(first.local_id, ConnectionId(1));
        assert_eq!(first.remote_id, ConnectionId(2));
        assert_eq!(second.local_spawn(), first.remote_spawn());
        assert_eq!(second.remote_spawn(), first.local_spawn());
        assert_eq!(second.local_texture, first.remote_texture);
    }

    #[test]
    fn test_bare_tags_go_to_the_other_peer_only() {
        let (mut session, a, b) = started();
        let relay = session.handle(a.id, ConnectionEvent::Message(frame(Message::Move(Direction::Up))));
        assert_eq!(relay, Relay::Forwarded(b'u'));
        assert_eq!(b.take(), vec![vec![b'u']]);
        assert!(a.take().is_empty());

        session.handle(b.id, ConnectionEvent::Message(frame(Message::Die)));
        assert_eq!(a.take(), vec![vec![b'k']]);
        assert!(b.take().is_empty());
    }

    #[test]
    fn test_payload_frames_are_forwarded_verbatim() {
        let (mut session, a, b) = started();
        for message in [
            Message::Teleport(PlayerTeleport { x: 608.0, y: 96.0 }),
            Message::Damage(PlayerDamage { amount: 14 }),
        ] {
            let bytes = message.encode().unwrap();
            session.handle(a.id, ConnectionEvent::Message(frame(message)));
            assert_eq!(b.take(), vec![bytes]);
        }
        assert!(a.take().is_empty());
    }

    #[test]
    fn test_unknown_tags_are_relayed_bare() {
        let (mut session, a, b) = started();
        let relay = session.handle(a.id, ConnectionEvent::Message(Frame::bare(b'x')));
        assert_eq!(relay, Relay::Forwarded(b'x'));
        assert_eq!(b.take(), vec![vec![b'x']]);
    }

    #[test]
    fn test_clients_cannot_start_games() {
        let (mut session, a, b) = started();
        let start = Message::GameStart(GameStart {
            local_id: ConnectionId(1),
            local_texture: String::new(),
            local_x: 0.0,
            local_y: 0.0,
            remote_id: ConnectionId(2),
            remote_texture: String::new(),
            remote_x: 0.0,
            remote_y: 0.0,
        });
        assert_eq!(session.handle(a.id, ConnectionEvent::Message(frame(start))), Relay::Ignored);
        assert!(b.take().is_empty());
    }

    #[test_log::test]
    fn test_disconnect_notifies_survivor_once_then_stops() {
        let (mut session, a, b) = started();
        assert_eq!(session.handle(b.id, ConnectionEvent::Disconnected), Relay::PeerLeft);
        assert_eq!(a.take(), vec![vec![b'2']]);
        assert_eq!(session.state(), SessionState::Ended);

        let relay = session.handle(a.id, ConnectionEvent::Message(frame(Message::Move(Direction::Left))));
        assert_eq!(relay, Relay::Ignored);
        assert!(b.take().is_empty());
        assert!(!session.is_finished());

        assert_eq!(session.handle(a.id, ConnectionEvent::Disconnected), Relay::Ignored);
        assert!(a.take().is_empty() && b.take().is_empty());
        assert!(session.is_finished());
    }

    #[test]
    fn test_game_end_is_relayed_and_ends_the_session() {
        let (mut session, a, b) = started();
        session.handle(a.id, ConnectionEvent::Message(frame(Message::GameEnd)));
        assert_eq!(b.take(), vec![vec![b'3']]);
        assert_eq!(session.state(), SessionState::Ended);
        assert_eq!(session.handle(a.id, ConnectionEvent::Disconnected), Relay::Ignored);
        assert!(b.take().is_empty());
    }

    #[test]
    fn test_strangers_are_ignored() {
        let (mut session, a, b) = started();
        let relay = session.handle(ConnectionId(99), ConnectionEvent::Message(Frame::bare(b'u')));
        assert_eq!(relay, Relay::Ignored);
        assert!(a.take().is_empty() && b.take().is_empty());
    }
}
