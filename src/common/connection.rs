//! Framed connection over a TCP stream.
//!
//! Each connection owns two threads. The writer drains an ordered queue of
//! fully encoded messages, so concurrent senders interleave only at message
//! boundaries and never wait on the network. The reader blocks on the next
//! tag byte and hands every decoded message to the handler it was spawned
//! with, followed by exactly one `Disconnected` when the stream dies.

use super::errors::Result;
use super::messages::{read_message, Decode, Encode};
use super::types::ConnectionId;
use std::io::{BufRead, BufReader, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle};
use tracing::{debug, trace, warn};

#[derive(Debug, PartialEq)]
pub enum ConnectionEvent<M> {
    Message(M),
    Disconnected,
}

/// Anything outbound messages can be queued on.
pub trait Outbox {
    fn id(&self) -> ConnectionId;

    /// Queues the bytes of one complete message. Never blocks.
    fn push(&self, bytes: Vec<u8>);

    /// Encodes and queues a message. Sends are best effort: failures are
    /// logged and dropped.
    fn send<E: Encode>(&self, message: &E)
    where
        Self: Sized,
    {
        match message.encode() {
            Ok(bytes) => self.push(bytes),
            Err(e) => warn!(id = %self.id(), error = %e, "failed to encode outbound message"),
        }
    }
}

pub struct Connection {
    id: ConnectionId,
    peer: Option<SocketAddr>,
    outbox: Sender<Vec<u8>>,
    writer: JoinHandle<()>,
    stream: TcpStream,
}

/// The not-yet-started read side of a [`Connection`].
pub struct Reader {
    id: ConnectionId,
    stream: TcpStream,
}

impl Connection {
    /// Starts the writer thread. Reading begins only once the returned
    /// [`Reader`] is spawned.
    pub fn open(id: ConnectionId, stream: TcpStream) -> Result<(Connection, Reader)> {
        let peer = stream.peer_addr().ok();
        let write_half = stream.try_clone()?;
        let read_half = stream.try_clone()?;
        let (outbox, queue) = mpsc::channel();

        let writer = thread::Builder::new()
            .name(format!("{id}-writer"))
            .spawn(move || write_loop(id, write_half, queue))?;

        let connection = Connection {
            id,
            peer,
            outbox,
            writer,
            stream,
        };
        Ok((connection, Reader { id, stream: read_half }))
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer
    }

    /// Flushes everything already queued, then shuts the socket down so the
    /// local reader stops too.
    pub fn close(self) {
        let Connection {
            id,
            outbox,
            writer,
            stream,
            ..
        } = self;
        drop(outbox);
        if writer.join().is_err() {
            warn!(%id, "writer thread panicked");
        }
        if let Err(e) = stream.shutdown(Shutdown::Both) {
            trace!(%id, error = %e, "shutdown on closed stream");
        }
    }
}

impl Outbox for Connection {
    fn id(&self) -> ConnectionId {
        self.id
    }

    fn push(&self, bytes: Vec<u8>) {
        if self.outbox.send(bytes).is_err() {
            debug!(id = %self.id, "writer gone, dropping outbound message");
        }
    }
}

impl Reader {
    pub fn spawn<M, F>(self, mut on_event: F) -> Result<JoinHandle<()>>
    where
        M: Decode + Send + 'static,
        F: FnMut(ConnectionEvent<M>) + Send + 'static,
    {
        let handle = thread::Builder::new()
            .name(format!("{}-reader", self.id))
            .spawn(move || {
                read_loop(self.id, BufReader::new(&self.stream), &mut on_event);
                let _ = self.stream.shutdown(Shutdown::Both);
            })?;
        Ok(handle)
    }
}

/// Reads until the stream dies. Malformed payloads cost one message, not the
/// connection.
pub(crate) fn read_loop<M, R, F>(id: ConnectionId, mut reader: R, on_event: &mut F)
where
    M: Decode,
    R: BufRead,
    F: FnMut(ConnectionEvent<M>),
{
    loop {
        match read_message::<M, _>(&mut reader) {
            Ok(message) => on_event(ConnectionEvent::Message(message)),
            Err(e) if e.is_disconnect() => {
                debug!(%id, error = %e, "stream closed");
                break;
            }
            Err(e) => warn!(%id, error = %e, "dropping malformed message"),
        }
    }
    on_event(ConnectionEvent::Disconnected);
}

fn write_loop(id: ConnectionId, mut stream: TcpStream, queue: Receiver<Vec<u8>>) {
    for bytes in queue {
        if let Err(e) = stream.write_all(&bytes).and_then(|()| stream.flush()) {
            debug!(%id, error = %e, "dropping outbound message");
        }
    }
    // Every sender is gone: nothing more will ever be written.
    let _ = stream.shutdown(Shutdown::Write);
}
