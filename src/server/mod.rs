pub mod matchmaker;
pub mod network;
pub mod session;

pub use matchmaker::{Matchmaker, Pairing};
pub use network::{GameServer, ServerEvent};
pub use session::{Relay, Session, SessionState};
