use std::fmt::Display;
use std::fmt::Formatter;
use std::ops::Deref;
use std::ops::DerefMut;

use crate::basic_types::Operation;
use crate::bracken_assert_simple;

/// An elimination sequence: operations in production order.
///
/// The invariant maintained by every producer is that an operation's
/// dependencies either appear earlier in the sequence or are elemental
/// Jacobians. The DAG queries below are derived from
/// [`Operation::consumes`]: the *children* of an operation are the
/// operations whose results it consumes, its *parent* is the unique
/// operation consuming its result.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Sequence {
    operations: Vec<Operation>,
}

impl Sequence {
    pub fn new() -> Sequence {
        Sequence::default()
    }

    pub fn push(&mut self, op: Operation) {
        self.operations.push(op);
    }

    pub fn pop(&mut self) -> Option<Operation> {
        self.operations.pop()
    }

    /// Maximum end time over all operations, or over the operations of a
    /// single thread. All considered operations must be scheduled.
    pub fn makespan(&self, thread: Option<usize>) -> usize {
        let mut cost = 0;
        for op in &self.operations {
            if thread.map_or(true, |t| op.thread == t) {
                bracken_assert_simple!(op.is_scheduled, "makespan of an unscheduled operation");
                cost = cost.max(op.end_time());
            }
        }

        cost
    }

    /// Total work of the sequence: the makespan of a single-threaded
    /// schedule.
    pub fn sequential_makespan(&self) -> usize {
        self.operations.iter().map(|op| op.fma).sum()
    }

    /// Indices of the operations whose results `op_idx` consumes.
    pub fn children(&self, op_idx: usize) -> Vec<usize> {
        let op = &self.operations[op_idx];
        (0..self.operations.len())
            .filter(|&c| op.consumes(&self.operations[c]))
            .collect()
    }

    /// Index of the operation consuming the result of `op_idx`, if any.
    pub fn parent(&self, op_idx: usize) -> Option<usize> {
        let op = &self.operations[op_idx];
        (0..self.operations.len()).find(|&p| self.operations[p].consumes(op))
    }

    /// Distance from the terminal operation: the root has level 1, its
    /// operands level 2, and so on. Deeper operations must be scheduled
    /// first.
    pub fn level(&self, op_idx: usize) -> usize {
        match self.parent(op_idx) {
            Some(parent) => self.level(parent) + 1,
            None => 1,
        }
    }

    /// Earliest point in time at which `op_idx` may start: the maximum
    /// end time of its children under the current schedule.
    pub fn earliest_start(&self, op_idx: usize) -> usize {
        let op = &self.operations[op_idx];
        self.operations
            .iter()
            .filter(|child| op.consumes(child))
            .map(|child| child.end_time())
            .max()
            .unwrap_or(0)
    }

    /// Whether all children of `op_idx` are scheduled.
    pub fn is_schedulable(&self, op_idx: usize) -> bool {
        let op = &self.operations[op_idx];
        self.operations
            .iter()
            .all(|child| !op.consumes(child) || child.is_scheduled)
    }

    /// Whether every operation of the sequence is scheduled.
    pub fn is_scheduled(&self) -> bool {
        self.operations.iter().all(|op| op.is_scheduled)
    }

    /// Longest root-to-leaf chain of costs over the partial order,
    /// respecting the start times already assigned. For an unscheduled
    /// sequence this is the pure-work critical path, a lower bound on
    /// the makespan of any schedule.
    pub fn critical_path(&self) -> usize {
        (0..self.operations.len())
            .map(|op_idx| self.critical_path_from(op_idx, 0))
            .max()
            .unwrap_or(0)
    }

    fn critical_path_from(&self, op_idx: usize, start_time: usize) -> usize {
        let op = &self.operations[op_idx];
        let end_time = start_time.max(op.start_time) + op.fma;

        match self.parent(op_idx) {
            Some(parent) => self.critical_path_from(parent, end_time),
            None => end_time,
        }
    }
}

impl Deref for Sequence {
    type Target = [Operation];

    fn deref(&self) -> &Self::Target {
        &self.operations
    }
}

impl DerefMut for Sequence {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.operations
    }
}

impl Display for Sequence {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for op in &self.operations {
            writeln!(f, "{op}")?;
        }

        Ok(())
    }
}
