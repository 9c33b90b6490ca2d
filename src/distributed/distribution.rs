//! Assignment of application tasks to ranks

use crate::error::ValidationError;
use crate::types::TaskId;
use std::ops::Range;

/// Validate a rank within a communicator of `ranks` processes
pub fn validate_rank(rank: usize, ranks: usize) -> Result<(), ValidationError> {
    if ranks == 0 {
        return Err(ValidationError::OutOfRange {
            field: "distributed.ranks".to_string(),
            value: "0".to_string(),
            min: "1".to_string(),
            max: usize::MAX.to_string(),
        });
    }
    if rank >= ranks {
        return Err(ValidationError::OutOfRange {
            field: "distributed.rank".to_string(),
            value: rank.to_string(),
            min: "0".to_string(),
            max: (ranks - 1).to_string(),
        });
    }
    Ok(())
}

/// Contiguous block distribution of tasks over ranks
///
/// Every rank gets `tasks / ranks` consecutive tasks and the first
/// `tasks % ranks` ranks take one extra.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskDistribution {
    rank: usize,
    ranks: usize,
    tasks: TaskId,
}

impl TaskDistribution {
    /// Rank of the collecting process
    pub const COLLECTOR: usize = 0;

    /// Distribution of `tasks` tasks as seen from `rank`
    pub fn new(rank: usize, ranks: usize, tasks: TaskId) -> Result<Self, ValidationError> {
        validate_rank(rank, ranks)?;
        Ok(Self { rank, ranks, tasks })
    }

    /// Single-process distribution owning every task
    pub fn single(tasks: TaskId) -> Self {
        Self {
            rank: Self::COLLECTOR,
            ranks: 1,
            tasks,
        }
    }

    /// This process's rank
    pub fn rank(&self) -> usize {
        self.rank
    }

    /// Number of ranks
    pub fn ranks(&self) -> usize {
        self.ranks
    }

    /// Total number of tasks
    pub fn tasks(&self) -> TaskId {
        self.tasks
    }

    /// Whether this rank gathers the global result
    pub fn is_collector(&self) -> bool {
        self.rank == Self::COLLECTOR
    }

    /// Tasks owned by `rank`
    pub fn range_of(&self, rank: usize) -> Range<TaskId> {
        let ranks = self.ranks as u64;
        let tasks = self.tasks as u64;
        let rank = rank as u64;

        let per_rank = tasks / ranks;
        let remainder = tasks % ranks;
        let start = rank * per_rank + rank.min(remainder);
        let len = per_rank + u64::from(rank < remainder);
        let end = (start + len).min(tasks);

        start.min(tasks) as TaskId..end as TaskId
    }

    /// Tasks owned by this rank
    pub fn local_range(&self) -> Range<TaskId> {
        self.range_of(self.rank)
    }

    /// Whether this rank clusters the bursts of `task`
    pub fn owns(&self, task: TaskId) -> bool {
        self.local_range().contains(&task)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_even_split() {
        let d = TaskDistribution::new(1, 4, 8).unwrap();
        assert_eq!(d.local_range(), 2..4);
        assert!(d.owns(3));
        assert!(!d.owns(4));
    }

    #[test]
    fn test_remainder_goes_to_lowest_ranks() {
        let ranges: Vec<_> = (0..3)
            .map(|r| TaskDistribution::new(r, 3, 8).unwrap().local_range())
            .collect();
        assert_eq!(ranges, vec![0..3, 3..6, 6..8]);
    }

    #[test]
    fn test_more_ranks_than_tasks() {
        let ranges: Vec<_> = (0..4)
            .map(|r| TaskDistribution::new(r, 4, 2).unwrap().local_range())
            .collect();
        assert_eq!(ranges, vec![0..1, 1..2, 2..2, 2..2]);
    }

    #[test]
    fn test_every_task_owned_once() {
        for ranks in 1..7 {
            for tasks in 0..20 {
                let mut owners = vec![0; tasks as usize];
                for r in 0..ranks {
                    let d = TaskDistribution::new(r, ranks, tasks).unwrap();
                    for t in d.local_range() {
                        owners[t as usize] += 1;
                    }
                }
                assert!(owners.iter().all(|&o| o == 1), "ranks={} tasks={}", ranks, tasks);
            }
        }
    }

    #[test]
    fn test_invalid_rank() {
        assert!(TaskDistribution::new(2, 2, 4).is_err());
        assert!(TaskDistribution::new(0, 0, 4).is_err());
        assert!(TaskDistribution::single(5).is_collector());
    }
}
