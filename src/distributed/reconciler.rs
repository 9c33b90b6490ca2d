//! Gather of per-rank partitions into one global partition
//!
//! Every rank clusters a disjoint slice of the complete bursts. Cluster ids
//! are correlated back to bursts through their source-trace line, which is
//! unique across the whole trace.
//!
//! Exchange, rank 0 collecting:
//!
//! ```text
//! worker r                       collector
//!   for id in NOISE..=max_id       for id = NOISE, ... while any work left
//!     SIZE(n)      ───────────▶      own lines of id
//!     LINES(n)     ───────────▶      SIZE + LINES from ranks 1..P in order
//!   DONE           ───────────▶      (DONE retires the rank)
//!   BARRIER        ◀──────────▶    BARRIER / RELEASE
//! ```
//!
//! Ranks may hold a different number of clusters; the `DONE` marker tells
//! the collector a rank has no more ids. Verdict checks run on the collector
//! only, after the barrier.

use super::message::Message;
use super::transport::{Transport, COLLECTOR_RANK};
use crate::clustering::Partition;
use crate::error::{Error, ReconciliationError, Result, TransportError};
use crate::metrics;
use crate::types::{ClusterId, Line, NOISE};
use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap};
use std::time::Instant;
use tracing::{debug, error, info};

/// Reassembles a global partition over a [`Transport`]
pub struct PartitionReconciler<'a> {
    transport: &'a mut dyn Transport,
}

impl<'a> PartitionReconciler<'a> {
    /// Reconciler running over `transport`
    pub fn new(transport: &'a mut dyn Transport) -> Self {
        Self { transport }
    }

    /// Run the exchange
    ///
    /// `local` clusters the bursts whose lines are `local_lines`, position
    /// by position. `known_lines` are the lines of every complete burst the
    /// collector knows, in the order of the returned global partition; it
    /// is ignored on workers.
    ///
    /// Returns the global partition on the collector and `None` on workers.
    pub fn reconcile(
        &mut self,
        local: &Partition,
        local_lines: &[Line],
        known_lines: &[Line],
    ) -> Result<Option<Partition>> {
        if local.len() != local_lines.len() {
            return Err(ReconciliationError::LocalMismatch {
                assignments: local.len(),
                lines: local_lines.len(),
            }
            .into());
        }

        let start = Instant::now();
        let result = if self.transport.rank() == COLLECTOR_RANK {
            self.collect(local, local_lines, known_lines).map(Some)
        } else {
            self.contribute(local, local_lines).map(|()| None)
        };
        metrics::record_stage("reconciliation", start.elapsed());

        if let Err(e) = &result {
            metrics::record_error("reconciliation");
            error!(rank = self.transport.rank(), error = %e, "Reconciliation failed");
        }
        result
    }

    fn contribute(&mut self, local: &Partition, local_lines: &[Line]) -> Result<()> {
        let buckets = buckets(local, local_lines);
        let rank = self.transport.rank();

        for id in NOISE..=local.max_id() {
            let lines = buckets.get(&id).cloned().unwrap_or_default();
            self.send(Message::ClusterSize(lines.len() as u64))?;
            self.send(Message::ClusterLines(lines))?;
        }
        self.send(Message::Done)?;

        self.transport.barrier()?;
        debug!(rank, clusters = local.cluster_count(), "Local partition sent");
        Ok(())
    }

    fn send(&mut self, message: Message) -> std::result::Result<(), TransportError> {
        debug!(
            rank = self.transport.rank(),
            message = message.kind(),
            "Sending to collector"
        );
        metrics::record_message("sent", message.kind());
        self.transport.send(COLLECTOR_RANK, message)
    }

    fn recv(&mut self, src: usize) -> std::result::Result<Message, TransportError> {
        let message = self.transport.recv(src)?;
        debug!(src, message = message.kind(), "Received from worker");
        metrics::record_message("received", message.kind());
        Ok(message)
    }

    fn collect(
        &mut self,
        local: &Partition,
        local_lines: &[Line],
        known_lines: &[Line],
    ) -> Result<Partition> {
        let size = self.transport.size();
        let own = buckets(local, local_lines);
        let own_max = local.max_id();

        let mut active = vec![true; size];
        active[COLLECTOR_RANK] = false;
        let mut gathered: Vec<(ClusterId, Vec<Line>)> = Vec::new();

        let mut id = NOISE;
        while id <= own_max || active.iter().any(|&a| a) {
            let mut bucket = own.get(&id).cloned().unwrap_or_default();

            for src in 1..size {
                if !active[src] {
                    continue;
                }
                match self.recv(src)? {
                    Message::ClusterSize(n) => {
                        let lines = match self.recv(src)? {
                            Message::ClusterLines(lines) => lines,
                            other => {
                                return Err(TransportError::UnexpectedMessage {
                                    rank: src,
                                    expected: "lines",
                                    got: other.kind(),
                                }
                                .into())
                            }
                        };
                        if lines.len() as u64 != n {
                            return Err(ReconciliationError::Protocol(format!(
                                "rank {} announced {} lines for cluster {} but sent {}",
                                src,
                                n,
                                id,
                                lines.len()
                            ))
                            .into());
                        }
                        bucket.extend(lines);
                    }
                    Message::Done => {
                        debug!(src, clusters = id, "Worker finished sending");
                        active[src] = false;
                    }
                    other => {
                        return Err(TransportError::UnexpectedMessage {
                            rank: src,
                            expected: "size",
                            got: other.kind(),
                        }
                        .into())
                    }
                }
            }

            if !bucket.is_empty() {
                gathered.push((id, bucket));
            }
            id = id.checked_add(1).ok_or_else(|| {
                Error::from(ReconciliationError::Protocol("cluster id overflow".to_string()))
            })?;
        }

        self.transport.barrier()?;

        let mut line_to_cluster: HashMap<Line, ClusterId> = HashMap::new();
        for (id, lines) in &gathered {
            for &line in lines {
                match line_to_cluster.entry(line) {
                    Entry::Vacant(slot) => {
                        slot.insert(*id);
                    }
                    Entry::Occupied(slot) if slot.get() != id => {
                        return Err(ReconciliationError::DuplicateLine {
                            line,
                            first: *slot.get(),
                            second: *id,
                        }
                        .into());
                    }
                    Entry::Occupied(_) => {}
                }
            }
        }

        if line_to_cluster.len() != known_lines.len() {
            return Err(ReconciliationError::LineCountMismatch {
                gathered: line_to_cluster.len(),
                known: known_lines.len(),
            }
            .into());
        }

        let assignment = known_lines
            .iter()
            .map(|line| {
                line_to_cluster
                    .get(line)
                    .copied()
                    .ok_or(ReconciliationError::UnknownLine(*line))
            })
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let partition = Partition::from_assignment(assignment);
        info!(
            ranks = size,
            bursts = partition.len(),
            clusters = partition.cluster_count(),
            "Global partition reconciled"
        );
        Ok(partition)
    }
}

/// Lines of each cluster of `partition`, in local order
fn buckets(partition: &Partition, lines: &[Line]) -> BTreeMap<ClusterId, Vec<Line>> {
    let mut buckets: BTreeMap<ClusterId, Vec<Line>> = BTreeMap::new();
    for (&id, &line) in partition.assignment().iter().zip(lines) {
        buckets.entry(id).or_default().push(line);
    }
    buckets
}
