use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::basic_types::Sequence;
use crate::bracken_assert_simple;

/// Greedy priority-list scheduling.
///
/// Operations are ordered by level (deepest first) and work, so every
/// operation is scheduled after all of its children. Each popped
/// operation is placed on the thread yielding the earliest start, ties
/// broken towards the smallest idle gap in front of it.
/// `O(n log n + n * threads)` per call plus the level precomputation.
#[derive(Debug, Default)]
pub struct PriorityListScheduler;

#[derive(PartialEq, Eq)]
struct PrioritisedOperation {
    level: usize,
    fma: usize,
    op_idx: usize,
}

impl Ord for PrioritisedOperation {
    fn cmp(&self, other: &PrioritisedOperation) -> Ordering {
        // Max-heap on (level, fma); equal priorities pop in sequence
        // order for determinism.
        self.level
            .cmp(&other.level)
            .then(self.fma.cmp(&other.fma))
            .then(other.op_idx.cmp(&self.op_idx))
    }
}

impl PartialOrd for PrioritisedOperation {
    fn partial_cmp(&self, other: &PrioritisedOperation) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PriorityListScheduler {
    pub(crate) fn schedule_impl(
        &self,
        sequence: &mut Sequence,
        usable_threads: usize,
        _upper_bound: usize,
    ) -> usize {
        if sequence.is_empty() {
            return 0;
        }
        bracken_assert_simple!(usable_threads > 0);

        // Reset a potential previous schedule.
        for op in sequence.iter_mut() {
            op.is_scheduled = false;
        }

        let mut queue: BinaryHeap<PrioritisedOperation> = (0..sequence.len())
            .map(|op_idx| PrioritisedOperation {
                level: sequence.level(op_idx),
                fma: sequence[op_idx].fma,
                op_idx,
            })
            .collect();

        let mut thread_loads = vec![0_usize; usable_threads];
        while let Some(PrioritisedOperation { op_idx, .. }) = queue.pop() {
            // All children carry a deeper level, so they are already
            // scheduled and their end times are final.
            let earliest_start = sequence.earliest_start(op_idx);

            let mut thread = 0;
            let mut start_time = thread_loads[0].max(earliest_start);
            let mut idle_time = start_time - thread_loads[0];

            for (t, &load) in thread_loads.iter().enumerate().skip(1) {
                let start_on_t = load.max(earliest_start);
                let idle_on_t = start_on_t - load;

                if start_on_t < start_time || (start_on_t == start_time && idle_on_t < idle_time) {
                    thread = t;
                    start_time = start_on_t;
                    idle_time = idle_on_t;
                }
            }

            let op = &mut sequence[op_idx];
            op.thread = thread;
            op.start_time = start_time;
            op.is_scheduled = true;
            thread_loads[thread] = start_time + op.fma;
        }

        sequence.makespan(None)
    }
}
