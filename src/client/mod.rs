pub mod codemap;
pub mod game;
pub mod player;

pub use codemap::CodeMap;
pub use game::{AttackTarget, ClientEvent, GameClient, Jump, Outcome, Phase, Snapshot};
pub use player::{LocalPlayer, PlayerView, RemotePlayer, Status};
