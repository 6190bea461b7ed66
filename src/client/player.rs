//! Player state machines.
//!
//! A client owns its [`LocalPlayer`] outright: only that side decrements
//! health, runs the respawn timer and decides whether a teleport is allowed.
//! The opponent is a [`RemotePlayer`] shadow that changes only when a
//! relayed event says so, and never rejects what it is told.
//!
//! All timers count down by the elapsed milliseconds passed to `update`,
//! clamp at zero, and stay expired once they get there.

use crate::common::{Direction, DirectionFlags, GameRules, Vector2};

/// Grow-then-fade square drawn over a teleporting or dying player.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Effect {
    pub size: f32,
    pub alpha: f32,
}

impl Effect {
    const START_SIZE: f32 = 1.0;
    const OPAQUE: f32 = 255.0;

    fn new() -> Self {
        Self {
            size: Self::START_SIZE,
            alpha: Self::OPAQUE,
        }
    }

    pub fn is_done(&self) -> bool {
        self.alpha <= 0.0
    }

    fn is_grown(&self, rules: &GameRules) -> bool {
        self.size >= rules.tile_size
    }

    fn advance(&mut self, dt: f32, rules: &GameRules) {
        let step = dt * rules.effect_speed;
        if self.is_grown(rules) {
            self.alpha = (self.alpha - step).max(0.0);
        } else {
            self.size = (self.size + step).min(rules.tile_size);
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Teleport {
    Idle,
    /// Fading out at the old position.
    Departing { target: Vector2, effect: Effect },
    /// Fading in at the new one.
    Arriving { effect: Effect },
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Life {
    Alive,
    Dying { effect: Effect },
    Dead,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Status {
    Alive,
    Teleporting,
    Dying,
    /// Dead and waiting for a respawn.
    Dead,
}

/// What the rendering side needs to draw one player.
#[derive(Clone, Debug, PartialEq)]
pub struct PlayerView {
    pub position: Vector2,
    pub direction: DirectionFlags,
    pub health: i32,
    pub status: Status,
    pub visible: bool,
    pub effect: Option<Effect>,
    pub teleport_target: Option<Vector2>,
    pub cooldown_ms: f32,
}

/// State shared by both player roles.
#[derive(Clone, Debug, PartialEq)]
pub struct Body {
    position: Vector2,
    direction: DirectionFlags,
    health: i32,
    teleport: Teleport,
    cooldown_ms: f32,
    life: Life,
}

impl Body {
    fn new(spawn: Vector2, rules: &GameRules) -> Self {
        Self {
            position: spawn,
            direction: DirectionFlags::default(),
            health: rules.max_health,
            teleport: Teleport::Idle,
            cooldown_ms: 0.0,
            life: Life::Alive,
        }
    }

    pub fn position(&self) -> Vector2 {
        self.position
    }

    pub fn direction(&self) -> DirectionFlags {
        self.direction
    }

    pub fn health(&self) -> i32 {
        self.health
    }

    pub fn cooldown_ms(&self) -> f32 {
        self.cooldown_ms
    }

    pub fn is_alive(&self) -> bool {
        self.life == Life::Alive
    }

    pub fn is_teleporting(&self) -> bool {
        self.teleport != Teleport::Idle
    }

    pub fn teleport(&self) -> Teleport {
        self.teleport
    }

    pub fn teleport_target(&self) -> Option<Vector2> {
        match self.teleport {
            Teleport::Departing { target, .. } => Some(target),
            Teleport::Arriving { .. } => Some(self.position),
            Teleport::Idle => None,
        }
    }

    pub fn status(&self) -> Status {
        match self.life {
            Life::Dying { .. } => Status::Dying,
            Life::Dead => Status::Dead,
            Life::Alive if self.is_teleporting() => Status::Teleporting,
            Life::Alive => Status::Alive,
        }
    }

    pub fn view(&self, rules: &GameRules) -> PlayerView {
        let (visible, effect) = match (self.life, self.teleport) {
            (Life::Dead, _) => (false, None),
            (Life::Dying { effect }, _) => (!effect.is_grown(rules), Some(effect)),
            (Life::Alive, Teleport::Departing { effect, .. }) => (!effect.is_grown(rules), Some(effect)),
            (Life::Alive, Teleport::Arriving { effect }) => (true, Some(effect)),
            (Life::Alive, Teleport::Idle) => (true, None),
        };
        PlayerView {
            position: self.position,
            direction: self.direction,
            health: self.health,
            status: self.status(),
            visible,
            effect,
            teleport_target: self.teleport_target(),
            cooldown_ms: self.cooldown_ms,
        }
    }

    fn begin_teleport(&mut self, target: Vector2, rules: &GameRules) {
        self.teleport = Teleport::Departing {
            target,
            effect: Effect::new(),
        };
        self.cooldown_ms = rules.teleport_cooldown_ms;
    }

    fn begin_dying(&mut self) {
        self.health = 0;
        self.life = Life::Dying {
            effect: Effect::new(),
        };
        self.teleport = Teleport::Idle;
        self.direction.clear();
    }

    fn reset(&mut self, at: Vector2, rules: &GameRules) {
        *self = Body::new(at, rules);
    }

    fn tick(&mut self, dt: f32, rules: &GameRules) {
        let dt = dt.max(0.0);
        self.cooldown_ms = (self.cooldown_ms - dt).max(0.0);

        self.teleport = match self.teleport {
            Teleport::Idle => Teleport::Idle,
            // Already at the target: nothing to fade back in.
            Teleport::Departing { target, effect } if effect.is_done() && self.position == target => {
                Teleport::Idle
            }
            Teleport::Departing { target, effect } if effect.is_done() => {
                self.position = target;
                Teleport::Arriving {
                    effect: Effect::new(),
                }
            }
            Teleport::Departing { target, mut effect } => {
                effect.advance(dt, rules);
                Teleport::Departing { target, effect }
            }
            Teleport::Arriving { effect } if effect.is_done() => Teleport::Idle,
            Teleport::Arriving { mut effect } => {
                effect.advance(dt, rules);
                Teleport::Arriving { effect }
            }
        };

        self.life = match self.life {
            Life::Dying { effect } if effect.is_done() => Life::Dead,
            Life::Dying { mut effect } => {
                effect.advance(dt, rules);
                Life::Dying { effect }
            }
            other => other,
        };
    }
}

/// The player this client is authoritative for.
#[derive(Clone, Debug, PartialEq)]
pub struct LocalPlayer {
    body: Body,
    spawn: Vector2,
    respawn_in_ms: Option<f32>,
}

impl LocalPlayer {
    pub fn new(spawn: Vector2, rules: &GameRules) -> Self {
        Self {
            body: Body::new(spawn, rules),
            spawn,
            respawn_in_ms: None,
        }
    }

    pub fn body(&self) -> &Body {
        &self.body
    }

    pub fn respawn_in_ms(&self) -> Option<f32> {
        self.respawn_in_ms
    }

    /// A key press. Moves one tile only on the press edge, and only if the
    /// teleport behind the move is accepted.
    pub fn press(&mut self, direction: Direction, rules: &GameRules) -> bool {
        if !self.body.is_alive() || self.body.is_teleporting() {
            return false;
        }
        if self.body.direction.get(direction) {
            return false;
        }
        self.body.direction.set(direction, true);
        let target = self.body.position.add(&direction.step(rules.tile_size));
        self.request_teleport(target, rules)
    }

    pub fn release(&mut self, direction: Direction) {
        self.body.direction.set(direction, false);
    }

    /// Starts a teleport to `target`. A rejected request changes nothing.
    pub fn request_teleport(&mut self, target: Vector2, rules: &GameRules) -> bool {
        if self.body.is_teleporting()
            || self.body.cooldown_ms > 0.0
            || !self.body.is_alive()
            || !rules.contains(target)
        {
            return false;
        }
        self.body.begin_teleport(target, rules);
        true
    }

    /// Returns true exactly when this hit kills the player.
    pub fn take_damage(&mut self, amount: u32, rules: &GameRules) -> bool {
        if !self.body.is_alive() || amount == 0 {
            return false;
        }
        let amount = i32::try_from(amount).unwrap_or(i32::MAX);
        self.body.health = self.body.health.saturating_sub(amount).max(0);
        if self.body.health > 0 {
            return false;
        }
        self.body.begin_dying();
        self.respawn_in_ms = Some(rules.respawn_delay_ms);
        true
    }

    pub fn kill(&mut self, rules: &GameRules) -> bool {
        let remaining = self.body.health.unsigned_abs();
        self.take_damage(remaining, rules)
    }

    /// Advances by `dt` ms. Returns the respawn position when the respawn
    /// timer runs out during this tick.
    pub fn update(&mut self, dt: f32, rules: &GameRules) -> Option<Vector2> {
        self.body.tick(dt, rules);

        let remaining = (self.respawn_in_ms? - dt.max(0.0)).max(0.0);
        if remaining > 0.0 {
            self.respawn_in_ms = Some(remaining);
            return None;
        }
        self.respawn_in_ms = None;
        self.body.reset(self.spawn, rules);
        Some(self.spawn)
    }
}

/// Shadow of the opponent, driven only by relayed events.
#[derive(Clone, Debug, PartialEq)]
pub struct RemotePlayer {
    body: Body,
}

impl RemotePlayer {
    pub fn new(spawn: Vector2, rules: &GameRules) -> Self {
        Self {
            body: Body::new(spawn, rules),
        }
    }

    pub fn body(&self) -> &Body {
        &self.body
    }

    /// Mirrors one movement step. Steps chain from a pending target so a
    /// slower local animation does not drop moves.
    pub fn apply_move(&mut self, direction: Direction, rules: &GameRules) -> bool {
        if !self.body.is_alive() {
            return false;
        }
        let from = self.body.teleport_target().unwrap_or(self.body.position);
        self.body.direction.set(direction, true);
        self.adopt(from.add(&direction.step(rules.tile_size)), rules);
        true
    }

    /// Adopts the target as given: no bounds, cooldown or phase checks.
    pub fn apply_teleport(&mut self, target: Vector2, rules: &GameRules) -> bool {
        if !self.body.is_alive() {
            return false;
        }
        self.adopt(target, rules);
        true
    }

    /// Returns false if the shadow was already down.
    pub fn die(&mut self) -> bool {
        if !self.body.is_alive() {
            return false;
        }
        self.body.begin_dying();
        true
    }

    pub fn respawn(&mut self, at: Vector2, rules: &GameRules) {
        self.body.reset(at, rules);
    }

    /// Plays animations only; a shadow never respawns on its own clock.
    pub fn update(&mut self, dt: f32, rules: &GameRules) {
        let was_teleporting = self.body.is_teleporting();
        self.body.tick(dt, rules);
        if was_teleporting && !self.body.is_teleporting() {
            self.body.direction.clear();
        }
    }

    fn adopt(&mut self, target: Vector2, rules: &GameRules) {
        self.body.begin_teleport(target, rules);
    }
}
