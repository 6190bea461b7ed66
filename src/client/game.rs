use super::codemap::CodeMap;
use super::player::{LocalPlayer, PlayerView, RemotePlayer};
use crate::common::{
    Connection, ConnectionEvent, ConnectionId, Direction, GameRules, Message, Outbox,
    PlayerDamage, PlayerRespawn, PlayerTeleport, Result, Role, Vector2,
};
use std::net::{SocketAddr, TcpStream};
use std::sync::mpsc::{self, Receiver};
use tracing::{debug, info, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    Won,
    Lost,
    OpponentLeft,
    ConnectionLost,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    WaitingForStart,
    Playing,
    Ended(Outcome),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AttackTarget {
    Opponent,
    Myself,
}

/// Cursor-style motions, each resolved to a teleport target.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Jump {
    LineStart,
    LineEnd,
    FirstLine,
    LastLine,
    /// One-based line number.
    Line(u32),
    WordForward,
    WordEnd,
    WordBack,
}

/// Applied state transitions, for whatever draws or reports the game.
#[derive(Clone, Debug, PartialEq)]
pub enum ClientEvent {
    Started {
        local_id: ConnectionId,
        remote_id: ConnectionId,
    },
    OpponentMoved(Direction),
    OpponentTeleported(Vector2),
    Damaged {
        amount: u32,
        health: i32,
    },
    Died,
    Respawned(Vector2),
    OpponentDied {
        kills: u32,
    },
    OpponentRespawned(Vector2),
    Ended(Outcome),
}

#[derive(Clone, Debug, PartialEq)]
pub struct Snapshot {
    pub phase: Phase,
    pub local: PlayerView,
    pub remote: PlayerView,
    pub kills: u32,
    pub local_id: Option<ConnectionId>,
    pub remote_id: Option<ConnectionId>,
    pub textures: Option<(String, String)>,
}

struct Link {
    connection: Connection,
    inbox: Receiver<ConnectionEvent<Message>>,
}

/// Client side of one match.
///
/// Inbound messages are queued by the connection's reader thread and applied
/// only in [`GameClient::pump`], so all game state lives on the caller's
/// thread. Outbound messages go out only for requests the local player
/// actually accepted.
pub struct GameClient {
    rules: GameRules,
    link: Option<Link>,
    phase: Phase,
    local: LocalPlayer,
    remote: RemotePlayer,
    kills: u32,
    ids: Option<(ConnectionId, ConnectionId)>,
    textures: Option<(String, String)>,
    code_map: Option<CodeMap>,
    events: Vec<ClientEvent>,
}

impl GameClient {
    fn new(rules: GameRules, link: Option<Link>, phase: Phase) -> Self {
        let local = LocalPlayer::new(rules.spawn_point(Role::First), &rules);
        let remote = RemotePlayer::new(rules.spawn_point(Role::Second), &rules);
        Self {
            rules,
            link,
            phase,
            local,
            remote,
            kills: 0,
            ids: None,
            textures: None,
            code_map: None,
            events: Vec::new(),
        }
    }

    /// Connects and waits in the background for the server to pair us.
    pub fn connect(addr: SocketAddr, rules: GameRules) -> Result<Self> {
        let stream = TcpStream::connect(addr)?;
        let (connection, reader) = Connection::open(ConnectionId::default(), stream)?;
        let (events, inbox) = mpsc::channel();
        reader.spawn::<Message, _>(move |event| {
            let _ = events.send(event);
        })?;
        info!(%addr, "connected, waiting for an opponent");

        let link = Link { connection, inbox };
        Ok(Self::new(rules, Some(link), Phase::WaitingForStart))
    }

    /// A local practice match with a motionless opponent and no network.
    pub fn offline(rules: GameRules) -> Self {
        Self::new(rules, None, Phase::Playing)
    }

    pub fn with_code_map(mut self, code_map: CodeMap) -> Self {
        self.code_map = Some(code_map);
        self
    }

    pub fn rules(&self) -> &GameRules {
        &self.rules
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn kills(&self) -> u32 {
        self.kills
    }

    pub fn local(&self) -> &LocalPlayer {
        &self.local
    }

    pub fn remote(&self) -> &RemotePlayer {
        &self.remote
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            phase: self.phase,
            local: self.local.body().view(&self.rules),
            remote: self.remote.body().view(&self.rules),
            kills: self.kills,
            local_id: self.ids.map(|(local, _)| local),
            remote_id: self.ids.map(|(_, remote)| remote),
            textures: self.textures.clone(),
        }
    }

    /// Everything applied since the last call, oldest first.
    pub fn drain_events(&mut self) -> Vec<ClientEvent> {
        std::mem::take(&mut self.events)
    }

    /// Applies every inbound message queued so far.
    pub fn pump(&mut self) {
        let pending: Vec<_> = match &self.link {
            Some(link) => link.inbox.try_iter().collect(),
            None => return,
        };
        for event in pending {
            match event {
                ConnectionEvent::Message(message) => self.apply(message),
                ConnectionEvent::Disconnected => self.end(Outcome::ConnectionLost),
            }
        }
    }

    /// Advances timers and animations by `dt` milliseconds.
    pub fn update(&mut self, dt: f32) {
        if self.phase != Phase::Playing {
            return;
        }
        if let Some(at) = self.local.update(dt, &self.rules) {
            info!(x = at.x, y = at.y, "respawned");
            self.send(&Message::Respawn(PlayerRespawn { x: at.x, y: at.y }));
            self.events.push(ClientEvent::Respawned(at));
        }
        self.remote.update(dt, &self.rules);
    }

    /// A direction key went down. Returns true if the player moved.
    pub fn request_move(&mut self, direction: Direction) -> bool {
        if self.phase != Phase::Playing || !self.local.press(direction, &self.rules) {
            return false;
        }
        self.send(&Message::Move(direction));
        true
    }

    pub fn release_move(&mut self, direction: Direction) {
        self.local.release(direction);
    }

    pub fn request_teleport(&mut self, x: f32, y: f32) -> bool {
        if self.phase != Phase::Playing
            || !self.local.request_teleport(Vector2::new(x, y), &self.rules)
        {
            return false;
        }
        self.send(&Message::Teleport(PlayerTeleport { x, y }));
        true
    }

    /// Damage is applied by its victim: an attack on the opponent is only a
    /// notice, an attack on ourselves lands here and now.
    pub fn request_attack(&mut self, target: AttackTarget, amount: u32) -> bool {
        if self.phase != Phase::Playing || amount == 0 {
            return false;
        }
        match target {
            AttackTarget::Opponent => {
                if self.link.is_none()
                    || !self.local.body().is_alive()
                    || !self.remote.body().is_alive()
                {
                    return false;
                }
                self.send(&Message::Damage(PlayerDamage { amount }));
                true
            }
            AttackTarget::Myself => self.hit_self(amount),
        }
    }

    pub fn request_kill(&mut self) -> bool {
        let health = self.local.body().health().unsigned_abs();
        self.phase == Phase::Playing && self.hit_self(health)
    }

    pub fn request_jump(&mut self, jump: Jump) -> bool {
        match self.jump_target(jump) {
            Some(target) => self.request_teleport(target.x, target.y),
            None => false,
        }
    }

    /// Flushes anything still queued, such as a final `GameEnd`, then drops
    /// the link.
    pub fn disconnect(&mut self) {
        if let Some(link) = self.link.take() {
            link.connection.close();
            info!("disconnected");
        }
        if !matches!(self.phase, Phase::Ended(_)) {
            self.phase = Phase::Ended(Outcome::ConnectionLost);
        }
    }

    fn jump_target(&self, jump: Jump) -> Option<Vector2> {
        let rules = &self.rules;
        let here = self.local.body().position();
        let target = match jump {
            Jump::LineStart => Vector2::new(rules.edge_margin, here.y),
            Jump::LineEnd => Vector2::new(rules.map_width - rules.edge_margin, here.y),
            Jump::FirstLine => Vector2::new(here.x, rules.edge_margin),
            Jump::LastLine => Vector2::new(here.x, rules.map_height - rules.edge_margin),
            Jump::Line(line) if (1..=rules.line_count()).contains(&line) => Vector2::new(
                here.x,
                (line - 1) as f32 * rules.tile_size + rules.edge_margin,
            ),
            Jump::Line(_) => return None,
            Jump::WordForward => Vector2::new(self.code_map.as_ref()?.next_word_start(here), here.y),
            Jump::WordEnd => Vector2::new(self.code_map.as_ref()?.next_word_end(here), here.y),
            Jump::WordBack => Vector2::new(self.code_map.as_ref()?.previous_word_start(here), here.y),
        };
        Some(target)
    }

    fn hit_self(&mut self, amount: u32) -> bool {
        if !self.local.body().is_alive() {
            return false;
        }
        let died = self.local.take_damage(amount, &self.rules);
        self.events.push(ClientEvent::Damaged {
            amount,
            health: self.local.body().health(),
        });
        if died {
            self.on_local_death();
        }
        true
    }

    fn on_local_death(&mut self) {
        info!("died");
        self.send(&Message::Die);
        self.events.push(ClientEvent::Died);
    }

    fn apply(&mut self, message: Message) {
        match (self.phase, message) {
            (Phase::Ended(_), message) => {
                debug!(tag = %char::from(message.tag_byte()), "match over, ignoring");
            }
            (Phase::WaitingForStart, Message::GameStart(start)) => {
                self.local = LocalPlayer::new(start.local_spawn(), &self.rules);
                self.remote = RemotePlayer::new(start.remote_spawn(), &self.rules);
                self.ids = Some((start.local_id, start.remote_id));
                self.textures = Some((start.local_texture, start.remote_texture));
                self.phase = Phase::Playing;
                info!(local = %start.local_id, remote = %start.remote_id, "game started");
                self.events.push(ClientEvent::Started {
                    local_id: start.local_id,
                    remote_id: start.remote_id,
                });
            }
            (Phase::WaitingForStart, message) => {
                debug!(tag = %char::from(message.tag_byte()), "not started, ignoring");
            }
            (Phase::Playing, message) => self.apply_in_game(message),
        }
    }

    fn apply_in_game(&mut self, message: Message) {
        match message {
            Message::Move(direction) => {
                if self.remote.apply_move(direction, &self.rules) {
                    self.events.push(ClientEvent::OpponentMoved(direction));
                }
            }
            Message::Teleport(PlayerTeleport { x, y }) => {
                let target = Vector2::new(x, y);
                if self.remote.apply_teleport(target, &self.rules) {
                    self.events.push(ClientEvent::OpponentTeleported(target));
                }
            }
            Message::Damage(PlayerDamage { amount }) => {
                if !self.local.body().is_alive() {
                    debug!(amount, "hit while down, ignoring");
                    return;
                }
                let died = self.local.take_damage(amount, &self.rules);
                debug!(amount, health = self.local.body().health(), "took damage");
                self.events.push(ClientEvent::Damaged {
                    amount,
                    health: self.local.body().health(),
                });
                if died {
                    self.on_local_death();
                }
            }
            Message::Die => {
                if !self.remote.die() {
                    return;
                }
                self.kills += 1;
                info!(kills = self.kills, "opponent died");
                self.events.push(ClientEvent::OpponentDied { kills: self.kills });
                if self.kills >= self.rules.kills_to_win {
                    self.send(&Message::GameEnd);
                    self.end(Outcome::Won);
                }
            }
            Message::Respawn(PlayerRespawn { x, y }) => {
                let at = Vector2::new(x, y);
                self.remote.respawn(at, &self.rules);
                self.events.push(ClientEvent::OpponentRespawned(at));
            }
            Message::GameEnd => self.end(Outcome::Lost),
            Message::Disconnect => self.end(Outcome::OpponentLeft),
            Message::GameStart(_) => warn!("second game start, ignoring"),
            Message::Unknown(tag) => debug!(tag = %char::from(tag), "unknown tag, ignoring"),
        }
    }

    fn end(&mut self, outcome: Outcome) {
        if matches!(self.phase, Phase::Ended(_)) {
            return;
        }
        info!(?outcome, "match over");
        self.phase = Phase::Ended(outcome);
        self.events.push(ClientEvent::Ended(outcome));
    }

    fn send(&self, message: &Message) {
        if let Some(link) = &self.link {
            link.connection.send(message);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::messages::read_message;
    use crate::common::{Encode, GameStart};
    use std::io::{BufReader, Write};
    use std::net::TcpListener;
    use std::thread;
    use std::time::{Duration, Instant};

    /// A client plus the raw server-side socket it talks to.
    struct Harness {
        client: GameClient,
        server: TcpStream,
        inbound: BufReader<TcpStream>,
    }

    impl Harness {
        fn new() -> Self {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            let client = GameClient::connect(listener.local_addr().unwrap(), GameRules::default()).unwrap();
            let (server, _) = listener.accept().unwrap();
            server.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
            let inbound = BufReader::new(server.try_clone().unwrap());
            Self {
                client,
                server,
                inbound,
            }
        }

        fn started() -> Self {
            let mut harness = Self::new();
            harness.deliver(&Message::GameStart(GameStart {
                local_id: ConnectionId(2),
                local_texture: "data/player2.png".into(),
                local_x: 32.0,
                local_y: 1248.0,
                remote_id: ConnectionId(1),
                remote_texture: "data/player1.png".into(),
                remote_x: 1248.0,
                remote_y: 32.0,
            }));
            harness.wait_until(|client| client.phase() == Phase::Playing);
            harness.client.drain_events();
            harness
        }

        fn deliver(&mut self, message: &Message) {
            self.server.write_all(&message.encode().unwrap()).unwrap();
        }

        fn wait_until(&mut self, done: impl Fn(&GameClient) -> bool) {
            let deadline = Instant::now() + Duration::from_secs(5);
            loop {
                self.client.pump();
                if done(&self.client) {
                    return;
                }
                assert!(Instant::now() < deadline, "timed out waiting for the client");
                thread::sleep(Duration::from_millis(5));
            }
        }

        fn next_sent(&mut self) -> Message {
            read_message(&mut self.inbound).unwrap()
        }
    }

    #[test]
    fn test_offline_moves_without_a_network() {
        let mut client = GameClient::offline(GameRules::default());
        assert_eq!(client.phase(), Phase::Playing);
        assert!(client.request_move(Direction::Down));
        assert!(!client.request_move(Direction::Down));
        assert_eq!(
            client.local().body().teleport_target(),
            Some(Vector2::new(1248.0, 96.0))
        );
        assert!(!client.request_attack(AttackTarget::Opponent, 12));
    }

    #[test]
    fn test_line_jumps() {
        let rules = GameRules::default();
        let mut client = GameClient::offline(rules.clone());
        assert!(!client.request_jump(Jump::Line(0)));
        assert!(!client.request_jump(Jump::Line(rules.line_count() + 1)));
        assert!(!client.request_jump(Jump::WordForward));
        assert!(client.request_jump(Jump::Line(3)));
        assert_eq!(
            client.local().body().teleport_target(),
            Some(Vector2::new(1248.0, 160.0))
        );

        let mut client = GameClient::offline(rules);
        assert!(client.request_jump(Jump::LineStart));
        assert_eq!(
            client.local().body().teleport_target(),
            Some(Vector2::new(32.0, 32.0))
        );
    }

    #[test]
    fn test_word_jumps_use_the_code_map() {
        let text = format!("{}ab cd\n", " ".repeat(36));
        let mut client =
            GameClient::offline(GameRules::default()).with_code_map(CodeMap::from_text(&text));
        // Spawn is at x = 1248, column 39, on "cd".
        assert!(client.request_jump(Jump::WordBack));
        assert_eq!(
            client.local().body().teleport_target(),
            Some(Vector2::new(36.0 * 32.0, 32.0))
        );
    }

    #[test]
    fn test_self_damage_until_death_then_respawn() {
        let rules = GameRules::default();
        let mut client = GameClient::offline(rules.clone());
        assert!(client.request_attack(AttackTarget::Myself, 60));
        assert!(client.request_attack(AttackTarget::Myself, 60));
        assert!(!client.request_attack(AttackTarget::Myself, 60));
        assert_eq!(
            client.drain_events(),
            vec![
                ClientEvent::Damaged { amount: 60, health: 40 },
                ClientEvent::Damaged { amount: 60, health: 0 },
                ClientEvent::Died,
            ]
        );
        client.update(rules.respawn_delay_ms);
        assert_eq!(
            client.drain_events(),
            vec![ClientEvent::Respawned(rules.spawn_point(Role::First))]
        );
        assert!(client.request_kill());
        assert!(!client.local().body().is_alive());
    }

    #[test_log::test]
    fn test_messages_before_game_start_are_ignored() {
        let mut harness = Harness::new();
        assert!(!harness.client.request_move(Direction::Up));
        harness.deliver(&Message::Move(Direction::Left));
        harness.deliver(&Message::Die);
        let start = Message::GameStart(GameStart {
            local_id: ConnectionId(1),
            local_texture: "data/player1.png".into(),
            local_x: 1248.0,
            local_y: 32.0,
            remote_id: ConnectionId(2),
            remote_texture: "data/player2.png".into(),
            remote_x: 32.0,
            remote_y: 1248.0,
        });
        harness.deliver(&start);
        harness.wait_until(|client| client.phase() == Phase::Playing);

        assert_eq!(
            harness.client.drain_events(),
            vec![ClientEvent::Started {
                local_id: ConnectionId(1),
                remote_id: ConnectionId(2),
            }]
        );
        let snapshot = harness.client.snapshot();
        assert_eq!(snapshot.kills, 0);
        assert_eq!(snapshot.local.position, Vector2::new(1248.0, 32.0));
        assert_eq!(snapshot.remote.position, Vector2::new(32.0, 1248.0));
        assert_eq!(
            snapshot.textures,
            Some(("data/player1.png".into(), "data/player2.png".into()))
        );
    }

    #[test]
    fn test_only_accepted_requests_are_sent() {
        let mut harness = Harness::started();
        assert!(!harness.client.request_teleport(5000.0, 5000.0));
        assert!(harness.client.request_teleport(96.0, 1248.0));
        assert!(!harness.client.request_move(Direction::Up));
        assert_eq!(
            harness.next_sent(),
            Message::Teleport(PlayerTeleport { x: 96.0, y: 1248.0 })
        );

        harness.client.update(5000.0);
        harness.client.update(5000.0);
        harness.client.update(5000.0);
        harness.client.update(5000.0);
        harness.client.update(5000.0);
        harness.client.update(5000.0);
        assert!(harness.client.request_move(Direction::Up));
        assert_eq!(harness.next_sent(), Message::Move(Direction::Up));
    }

    #[test]
    fn test_opponent_moves_drive_the_shadow() {
        let mut harness = Harness::started();
        harness.deliver(&Message::Move(Direction::Right));
        harness.deliver(&Message::Teleport(PlayerTeleport { x: 900.0, y: 100.0 }));
        harness.wait_until(|client| client.remote().body().teleport_target() == Some(Vector2::new(900.0, 100.0)));
        assert_eq!(
            harness.client.drain_events(),
            vec![
                ClientEvent::OpponentMoved(Direction::Right),
                ClientEvent::OpponentTeleported(Vector2::new(900.0, 100.0)),
            ]
        );
    }

    #[test]
    fn test_fatal_damage_reports_death() {
        let mut harness = Harness::started();
        harness.deliver(&Message::Damage(PlayerDamage { amount: 60 }));
        harness.deliver(&Message::Damage(PlayerDamage { amount: 60 }));
        harness.wait_until(|client| !client.local().body().is_alive());
        assert_eq!(harness.next_sent(), Message::Die);

        // Hits while down change nothing.
        harness.deliver(&Message::Damage(PlayerDamage { amount: 60 }));
        harness.client.update(1.0);
        harness.client.update(harness.client.rules().respawn_delay_ms);
        assert_eq!(
            harness.next_sent(),
            Message::Respawn(PlayerRespawn { x: 32.0, y: 1248.0 })
        );
        assert_eq!(harness.client.local().body().health(), 100);
    }

    #[test]
    fn test_tenth_kill_wins() {
        let mut harness = Harness::started();
        for kill in 1..=10 {
            harness.deliver(&Message::Die);
            harness.deliver(&Message::Die);
            harness.deliver(&Message::Respawn(PlayerRespawn { x: 1248.0, y: 32.0 }));
            harness.wait_until(move |client| client.kills() == kill);
        }
        harness.wait_until(|client| client.phase() == Phase::Ended(Outcome::Won));
        assert_eq!(harness.next_sent(), Message::GameEnd);
        assert_eq!(harness.client.kills(), 10);
    }

    #[test_log::test]
    fn test_quitting_right_after_the_win_still_sends_game_end() {
        let mut harness = Harness::started();
        for kill in 1..=10 {
            harness.deliver(&Message::Die);
            harness.deliver(&Message::Die);
            harness.deliver(&Message::Respawn(PlayerRespawn { x: 1248.0, y: 32.0 }));
            harness.wait_until(move |client| client.kills() == kill);
        }
        assert_eq!(harness.client.phase(), Phase::Ended(Outcome::Won));
        harness.client.disconnect();

        assert_eq!(harness.next_sent(), Message::GameEnd);
        let mut rest = Vec::new();
        std::io::Read::read_to_end(&mut harness.inbound, &mut rest).unwrap();
        assert!(rest.is_empty());
        assert_eq!(harness.client.phase(), Phase::Ended(Outcome::Won));
    }

    #[test]
    fn test_game_end_means_lost() {
        let mut harness = Harness::started();
        harness.deliver(&Message::GameEnd);
        harness.deliver(&Message::Disconnect);
        harness.wait_until(|client| matches!(client.phase(), Phase::Ended(_)));
        harness.client.update(16.0);
        assert_eq!(harness.client.phase(), Phase::Ended(Outcome::Lost));
    }

    #[test_log::test]
    fn test_opponent_leaving_is_reported_once() {
        let mut harness = Harness::started();
        harness.deliver(&Message::Disconnect);
        harness.wait_until(|client| matches!(client.phase(), Phase::Ended(_)));
        harness.server.shutdown(std::net::Shutdown::Both).unwrap();
        thread::sleep(Duration::from_millis(50));
        harness.client.pump();

        let ends: Vec<_> = harness
            .client
            .drain_events()
            .into_iter()
            .filter(|event| matches!(event, ClientEvent::Ended(_)))
            .collect();
        assert_eq!(ends, vec![ClientEvent::Ended(Outcome::OpponentLeft)]);
    }

    #[test]
    fn test_lost_transport_ends_the_match() {
        let mut harness = Harness::started();
        harness.server.shutdown(std::net::Shutdown::Both).unwrap();
        harness.wait_until(|client| matches!(client.phase(), Phase::Ended(_)));
        assert_eq!(harness.client.phase(), Phase::Ended(Outcome::ConnectionLost));
    }
}
