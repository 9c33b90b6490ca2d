//! Multi-rank execution
//!
//! Ranks split the trace's tasks into contiguous blocks, cluster their own
//! block and send the result to rank 0, which rebuilds one global
//! partition over every complete burst.

pub mod distribution;
pub mod message;
pub mod reconciler;
pub mod tcp;
pub mod transport;

pub use distribution::{validate_rank, TaskDistribution};
pub use message::Message;
pub use reconciler::PartitionReconciler;
pub use tcp::{ConnectPolicy, TcpTransport};
pub use transport::{LocalTransport, Transport, COLLECTOR_RANK};
