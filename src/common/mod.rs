pub mod config;
pub mod connection;
pub mod errors;
pub mod messages;
pub mod types;

pub use config::{resolve_target, ClientConfig, ServerConfig, DEFAULT_PORT};
pub use connection::{Connection, ConnectionEvent, Outbox, Reader};
pub use errors::{DuelError, Result};
pub use messages::{
    Decode, Encode, Frame, GameStart, Message, PlayerDamage, PlayerRespawn, PlayerTeleport, Tag,
};
pub use types::*;
