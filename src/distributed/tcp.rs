//! TCP transport in a star topology around the collector
//!
//! The collector listens and accepts one connection per worker. Each
//! worker opens its connection with a `HELLO` frame carrying its rank.
//! Workers only talk to the collector.

use super::message::Message;
use super::transport::{Transport, COLLECTOR_RANK};
use crate::error::TransportError;
use bytes::BytesMut;
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream, ToSocketAddrs};
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

const READ_CHUNK: usize = 64 * 1024;

/// Connection to one peer
#[derive(Debug)]
struct Peer {
    stream: TcpStream,
    buffer: BytesMut,
    rank: usize,
}

impl Peer {
    fn new(stream: TcpStream, rank: usize) -> Result<Self, TransportError> {
        stream.set_nodelay(true)?;
        Ok(Self {
            stream,
            buffer: BytesMut::with_capacity(READ_CHUNK),
            rank,
        })
    }

    fn write(&mut self, message: &Message) -> Result<(), TransportError> {
        let mut frame = BytesMut::new();
        message.encode(&mut frame)?;
        self.stream.write_all(&frame)?;
        self.stream.flush()?;
        Ok(())
    }

    fn read(&mut self) -> Result<Message, TransportError> {
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            if let Some(message) = Message::decode(&mut self.buffer)? {
                return Ok(message);
            }
            let n = self.stream.read(&mut chunk)?;
            if n == 0 {
                return Err(TransportError::Disconnected { rank: self.rank });
            }
            self.buffer.extend_from_slice(&chunk[..n]);
        }
    }
}

/// Connection retry policy of a worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectPolicy {
    /// Attempts before giving up
    pub attempts: u32,
    /// Pause between attempts
    pub interval: Duration,
}

impl Default for ConnectPolicy {
    fn default() -> Self {
        Self {
            attempts: 50,
            interval: Duration::from_millis(100),
        }
    }
}

/// TCP transport
#[derive(Debug)]
pub struct TcpTransport {
    rank: usize,
    size: usize,
    /// Indexed by rank, `None` for ranks without a direct link
    peers: Vec<Option<Peer>>,
}

impl TcpTransport {
    /// Bind `addr` and wait for all `size - 1` workers
    pub fn bind_collector(addr: impl ToSocketAddrs, size: usize) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr)?;
        Self::collector(listener, size)
    }

    /// Accept all `size - 1` workers on an existing listener
    pub fn collector(listener: TcpListener, size: usize) -> Result<Self, TransportError> {
        if size == 0 {
            return Err(TransportError::InvalidRank {
                rank: COLLECTOR_RANK,
                size,
            });
        }

        let mut peers: Vec<Option<Peer>> = (0..size).map(|_| None).collect();
        info!(
            address = ?listener.local_addr().ok(),
            workers = size - 1,
            "Waiting for workers"
        );

        let mut connected = 0;
        while connected < size - 1 {
            let (stream, remote) = listener.accept()?;
            let mut peer = Peer::new(stream, usize::MAX)?;

            let rank = match peer.read()? {
                Message::Hello { rank } => rank as usize,
                other => {
                    return Err(TransportError::UnexpectedMessage {
                        rank: peer.rank,
                        expected: "hello",
                        got: other.kind(),
                    })
                }
            };

            if rank == COLLECTOR_RANK || rank >= size {
                return Err(TransportError::InvalidRank { rank, size });
            }
            if peers[rank].is_some() {
                return Err(TransportError::Connection(format!(
                    "rank {} connected twice",
                    rank
                )));
            }

            debug!(rank, %remote, "Worker connected");
            peer.rank = rank;
            peers[rank] = Some(peer);
            connected += 1;
        }

        info!(ranks = size, "All workers connected");
        Ok(Self {
            rank: COLLECTOR_RANK,
            size,
            peers,
        })
    }

    /// Connect worker `rank` to the collector at `addr`
    pub fn worker(
        addr: impl ToSocketAddrs + Clone,
        rank: usize,
        size: usize,
        policy: ConnectPolicy,
    ) -> Result<Self, TransportError> {
        if rank == COLLECTOR_RANK || rank >= size {
            return Err(TransportError::InvalidRank { rank, size });
        }

        let mut attempt = 0;
        let stream = loop {
            attempt += 1;
            match TcpStream::connect(addr.clone()) {
                Ok(stream) => break stream,
                Err(e) if attempt < policy.attempts.max(1) => {
                    debug!(rank, attempt, error = %e, "Collector not reachable yet");
                    thread::sleep(policy.interval);
                }
                Err(e) => {
                    warn!(rank, attempts = attempt, "Giving up connecting to collector");
                    return Err(TransportError::Connection(format!(
                        "rank {} could not reach the collector after {} attempts: {}",
                        rank, attempt, e
                    )));
                }
            }
        };

        let mut collector = Peer::new(stream, COLLECTOR_RANK)?;
        collector.write(&Message::Hello { rank: rank as u64 })?;

        let mut peers: Vec<Option<Peer>> = (0..size).map(|_| None).collect();
        peers[COLLECTOR_RANK] = Some(collector);

        debug!(rank, "Connected to collector");
        Ok(Self { rank, size, peers })
    }

    fn peer(&mut self, rank: usize) -> Result<&mut Peer, TransportError> {
        let size = self.size;
        self.peers
            .get_mut(rank)
            .and_then(Option::as_mut)
            .ok_or(TransportError::InvalidRank { rank, size })
    }
}

impl Transport for TcpTransport {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn send(&mut self, dest: usize, message: Message) -> Result<(), TransportError> {
        self.peer(dest)?.write(&message)
    }

    fn recv(&mut self, src: usize) -> Result<Message, TransportError> {
        self.peer(src)?.read()
    }
}
