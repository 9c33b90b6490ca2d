//! Blocking point-to-point transport between ranks

use super::message::Message;
use crate::error::TransportError;
use crossbeam_channel::{unbounded, Receiver, Sender};

/// Rank that collects results and coordinates the barrier
pub const COLLECTOR_RANK: usize = 0;

/// Synchronous message passing between a fixed set of ranks
///
/// Messages between one pair of ranks are delivered in send order. `recv`
/// blocks until a message from the given rank is available or the peer
/// disconnects.
pub trait Transport: Send {
    /// This process's rank
    fn rank(&self) -> usize;

    /// Number of ranks
    fn size(&self) -> usize;

    /// Send `message` to `dest`
    fn send(&mut self, dest: usize, message: Message) -> Result<(), TransportError>;

    /// Receive the next message from `src`
    fn recv(&mut self, src: usize) -> Result<Message, TransportError>;

    /// Block until every rank reached the barrier
    ///
    /// Workers report to the collector and wait for its release.
    fn barrier(&mut self) -> Result<(), TransportError> {
        if self.rank() == COLLECTOR_RANK {
            for rank in 1..self.size() {
                expect(self.recv(rank)?, rank, Message::Barrier)?;
            }
            for rank in 1..self.size() {
                self.send(rank, Message::Release)?;
            }
        } else {
            self.send(COLLECTOR_RANK, Message::Barrier)?;
            expect(self.recv(COLLECTOR_RANK)?, COLLECTOR_RANK, Message::Release)?;
        }
        Ok(())
    }
}

fn expect(got: Message, rank: usize, wanted: Message) -> Result<(), TransportError> {
    if got == wanted {
        Ok(())
    } else {
        Err(TransportError::UnexpectedMessage {
            rank,
            expected: wanted.kind(),
            got: got.kind(),
        })
    }
}

/// In-process ranks connected by channels
///
/// Each ordered pair of ranks gets its own unbounded channel. Dropping a
/// rank disconnects every channel it sends on.
#[derive(Debug)]
pub struct LocalTransport {
    rank: usize,
    senders: Vec<Sender<Message>>,
    receivers: Vec<Receiver<Message>>,
}

impl LocalTransport {
    /// Create `size` fully connected ranks, indexed by rank
    pub fn cluster(size: usize) -> Vec<LocalTransport> {
        let mut senders: Vec<Vec<Sender<Message>>> = (0..size).map(|_| Vec::with_capacity(size)).collect();
        let mut receivers: Vec<Vec<Receiver<Message>>> =
            (0..size).map(|_| Vec::with_capacity(size)).collect();

        for src in 0..size {
            for dst in 0..size {
                let (tx, rx) = unbounded();
                senders[src].push(tx);
                receivers[dst].push(rx);
            }
        }

        senders
            .into_iter()
            .zip(receivers)
            .enumerate()
            .map(|(rank, (senders, receivers))| LocalTransport {
                rank,
                senders,
                receivers,
            })
            .collect()
    }

    fn check_rank(&self, rank: usize) -> Result<(), TransportError> {
        if rank >= self.senders.len() {
            return Err(TransportError::InvalidRank {
                rank,
                size: self.senders.len(),
            });
        }
        Ok(())
    }
}

impl Transport for LocalTransport {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.senders.len()
    }

    fn send(&mut self, dest: usize, message: Message) -> Result<(), TransportError> {
        self.check_rank(dest)?;
        self.senders[dest]
            .send(message)
            .map_err(|_| TransportError::Disconnected { rank: dest })
    }

    fn recv(&mut self, src: usize) -> Result<Message, TransportError> {
        self.check_rank(src)?;
        self.receivers[src]
            .recv()
            .map_err(|_| TransportError::Disconnected { rank: src })
    }
}
