//! Wire format: one tag byte, then, for the four tags that declare one, a
//! single compact JSON object. Tags without a payload are a lone byte.

use super::errors::{DuelError, Result};
use super::types::{ConnectionId, Direction, Vector2};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use std::io::{self, BufRead};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Tag {
    GameStart = b'1',
    Disconnect = b'2',
    GameEnd = b'3',
    MoveUp = b'u',
    MoveDown = b'd',
    MoveLeft = b'l',
    MoveRight = b'r',
    Teleport = b't',
    Damage = b'a',
    Die = b'k',
    Respawn = b's',
}

impl Tag {
    pub const ALL: [Tag; 11] = [
        Tag::GameStart,
        Tag::Disconnect,
        Tag::GameEnd,
        Tag::MoveUp,
        Tag::MoveDown,
        Tag::MoveLeft,
        Tag::MoveRight,
        Tag::Teleport,
        Tag::Damage,
        Tag::Die,
        Tag::Respawn,
    ];

    pub fn from_byte(byte: u8) -> Option<Tag> {
        Tag::ALL.into_iter().find(|tag| tag.byte() == byte)
    }

    pub fn byte(self) -> u8 {
        self as u8
    }

    pub fn has_payload(self) -> bool {
        matches!(
            self,
            Tag::GameStart | Tag::Teleport | Tag::Damage | Tag::Respawn
        )
    }

    pub fn movement(direction: Direction) -> Tag {
        match direction {
            Direction::Up => Tag::MoveUp,
            Direction::Down => Tag::MoveDown,
            Direction::Left => Tag::MoveLeft,
            Direction::Right => Tag::MoveRight,
        }
    }
}

/// Sent once per participant when a session starts. Each side gets its own
/// seat as `local_*` and the opponent's as `remote_*`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct GameStart {
    pub local_id: ConnectionId,
    pub local_texture: String,
    pub local_x: f32,
    pub local_y: f32,
    pub remote_id: ConnectionId,
    pub remote_texture: String,
    pub remote_x: f32,
    pub remote_y: f32,
}

impl GameStart {
    pub fn local_spawn(&self) -> Vector2 {
        Vector2::new(self.local_x, self.local_y)
    }

    pub fn remote_spawn(&self) -> Vector2 {
        Vector2::new(self.remote_x, self.remote_y)
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct PlayerTeleport {
    pub x: f32,
    pub y: f32,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct PlayerDamage {
    pub amount: u32,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct PlayerRespawn {
    pub x: f32,
    pub y: f32,
}

/// A fully decoded protocol event.
#[derive(Clone, Debug, PartialEq)]
pub enum Message {
    GameStart(GameStart),
    GameEnd,
    Disconnect,
    Move(Direction),
    Teleport(PlayerTeleport),
    Damage(PlayerDamage),
    Die,
    Respawn(PlayerRespawn),
    /// A tag this build has no meaning for. Never carries a payload.
    Unknown(u8),
}

impl Message {
    pub fn tag_byte(&self) -> u8 {
        match self {
            Message::GameStart(_) => Tag::GameStart.byte(),
            Message::GameEnd => Tag::GameEnd.byte(),
            Message::Disconnect => Tag::Disconnect.byte(),
            Message::Move(direction) => Tag::movement(*direction).byte(),
            Message::Teleport(_) => Tag::Teleport.byte(),
            Message::Damage(_) => Tag::Damage.byte(),
            Message::Die => Tag::Die.byte(),
            Message::Respawn(_) => Tag::Respawn.byte(),
            Message::Unknown(byte) => *byte,
        }
    }
}

/// An undecoded frame: the tag and the exact payload text, if any. This is
/// what the relay moves around so it never interprets payload contents.
#[derive(Clone, Debug)]
pub struct Frame {
    pub tag: u8,
    pub payload: Option<Box<RawValue>>,
}

impl Frame {
    pub fn bare(tag: u8) -> Self {
        Self { tag, payload: None }
    }

    pub fn known_tag(&self) -> Option<Tag> {
        Tag::from_byte(self.tag)
    }
}

impl PartialEq for Frame {
    fn eq(&self, other: &Self) -> bool {
        self.tag == other.tag
            && self.payload.as_ref().map(|raw| raw.get()) == other.payload.as_ref().map(|raw| raw.get())
    }
}

pub trait Encode {
    /// Produces the complete bytes of one message: tag, then payload.
    fn encode(&self) -> Result<Vec<u8>>;
}

pub trait Decode: Sized {
    /// Decodes whatever follows `tag` on the stream.
    fn decode<R: BufRead>(tag: u8, reader: &mut R) -> Result<Self>;
}

impl Encode for Message {
    fn encode(&self) -> Result<Vec<u8>> {
        let mut buf = vec![self.tag_byte()];
        match self {
            Message::GameStart(payload) => serde_json::to_writer(&mut buf, payload)?,
            Message::Teleport(payload) => serde_json::to_writer(&mut buf, payload)?,
            Message::Damage(payload) => serde_json::to_writer(&mut buf, payload)?,
            Message::Respawn(payload) => serde_json::to_writer(&mut buf, payload)?,
            _ => {}
        }
        Ok(buf)
    }
}

impl Decode for Message {
    fn decode<R: BufRead>(tag: u8, reader: &mut R) -> Result<Self> {
        let Some(known) = Tag::from_byte(tag) else {
            return Ok(Message::Unknown(tag));
        };
        let message = match known {
            Tag::GameStart => Message::GameStart(read_payload(tag, reader)?),
            Tag::Teleport => Message::Teleport(read_payload(tag, reader)?),
            Tag::Damage => Message::Damage(read_payload(tag, reader)?),
            Tag::Respawn => Message::Respawn(read_payload(tag, reader)?),
            Tag::GameEnd => Message::GameEnd,
            Tag::Disconnect => Message::Disconnect,
            Tag::Die => Message::Die,
            Tag::MoveUp => Message::Move(Direction::Up),
            Tag::MoveDown => Message::Move(Direction::Down),
            Tag::MoveLeft => Message::Move(Direction::Left),
            Tag::MoveRight => Message::Move(Direction::Right),
        };
        Ok(message)
    }
}

impl Encode for Frame {
    fn encode(&self) -> Result<Vec<u8>> {
        let mut buf = vec![self.tag];
        if let Some(raw) = &self.payload {
            buf.extend_from_slice(raw.get().as_bytes());
        }
        Ok(buf)
    }
}

impl Decode for Frame {
    fn decode<R: BufRead>(tag: u8, reader: &mut R) -> Result<Self> {
        let carries_payload = Tag::from_byte(tag).is_some_and(Tag::has_payload);
        if !carries_payload {
            return Ok(Frame::bare(tag));
        }
        let raw: Box<RawValue> = read_payload(tag, reader)?;
        if !raw.get().starts_with('{') {
            let source = <serde_json::Error as serde::de::Error>::custom("payload is not an object");
            return Err(DuelError::payload(tag, source));
        }
        Ok(Frame {
            tag,
            payload: Some(raw),
        })
    }
}

/// Reads exactly one JSON value and nothing past it. The whole value is
/// consumed before it is parsed, so a payload of the wrong shape still
/// leaves the stream at the next tag.
fn read_payload<T: DeserializeOwned, R: BufRead>(tag: u8, reader: &mut R) -> Result<T> {
    let bytes = read_json_value(reader)?;
    serde_json::from_slice(&bytes).map_err(|e| DuelError::payload(tag, e))
}

/// Collects the bytes of one JSON value: a balanced object or array, a
/// string, or a scalar. Scalars stop at the first byte that cannot continue
/// them, which is left unread.
fn read_json_value<R: BufRead>(reader: &mut R) -> io::Result<Vec<u8>> {
    let first = next_byte(reader)?;
    let mut value = vec![first];
    match first {
        b'{' | b'[' => {
            let mut depth = 1usize;
            let mut in_string = false;
            let mut escaped = false;
            while depth > 0 {
                let byte = next_byte(reader)?;
                value.push(byte);
                if in_string {
                    match byte {
                        _ if escaped => escaped = false,
                        b'\\' => escaped = true,
                        b'"' => in_string = false,
                        _ => {}
                    }
                    continue;
                }
                match byte {
                    b'"' => in_string = true,
                    b'{' | b'[' => depth += 1,
                    b'}' | b']' => depth -= 1,
                    _ => {}
                }
            }
        }
        b'"' => {
            let mut escaped = false;
            loop {
                let byte = next_byte(reader)?;
                value.push(byte);
                match byte {
                    _ if escaped => escaped = false,
                    b'\\' => escaped = true,
                    b'"' => break,
                    _ => {}
                }
            }
        }
        b't' | b'n' => value.extend(read_exact_vec(reader, 3)?),
        b'f' => value.extend(read_exact_vec(reader, 4)?),
        b'-' | b'0'..=b'9' => {
            while let Some(byte) = peek_byte(reader)? {
                if !matches!(byte, b'0'..=b'9' | b'.' | b'e' | b'E' | b'+' | b'-') {
                    break;
                }
                value.push(byte);
                reader.consume(1);
            }
        }
        _ => {}
    }
    Ok(value)
}

fn peek_byte<R: BufRead>(reader: &mut R) -> io::Result<Option<u8>> {
    Ok(reader.fill_buf()?.first().copied())
}

fn next_byte<R: BufRead>(reader: &mut R) -> io::Result<u8> {
    let byte = peek_byte(reader)?.ok_or(io::ErrorKind::UnexpectedEof)?;
    reader.consume(1);
    Ok(byte)
}

fn read_exact_vec<R: BufRead>(reader: &mut R, len: usize) -> io::Result<Vec<u8>> {
    let mut buf = vec![0; len];
    reader.read_exact(&mut buf)?;
    Ok(buf)
}

/// Blocks for the next tag byte, then decodes the rest of that message.
pub fn read_message<M: Decode, R: BufRead>(reader: &mut R) -> Result<M> {
    let mut tag = [0u8; 1];
    reader.read_exact(&mut tag)?;
    M::decode(tag[0], reader)
}
