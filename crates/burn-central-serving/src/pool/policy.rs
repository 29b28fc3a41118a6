use crate::config::{BatchConfig, ScalingConfig};

/// One reading of a pool's load, taken by the coordinator on every tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadObservation {
    pub queue_depth: usize,
    pub live_workers: usize,
    pub busy_workers: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalingDecision {
    Hold,
    ScaleUp(usize),
    ScaleDown(usize),
}

impl ScalingDecision {
    /// Worker count after applying this decision to `live` workers.
    pub fn target(self, live: usize) -> usize {
        match self {
            ScalingDecision::Hold => live,
            ScalingDecision::ScaleUp(n) => live + n,
            ScalingDecision::ScaleDown(n) => live.saturating_sub(n),
        }
    }
}

/// Queue-depth driven scaling with hysteresis.
///
/// * The pool is *saturated* when jobs are waiting and every live worker is busy. After
///   `scale_up_after` consecutive saturated observations it grows by enough workers to
///   take the backlog in one round of full batches: `ceil(queue_depth / max_batch_size)`.
/// * The pool is *idle* when nothing is waiting and at least one worker has nothing to do.
///   After `scale_down_after` consecutive idle observations it shrinks by one worker.
/// * A live count outside `[min_workers, max_workers]` is corrected on the next
///   observation. Every decision lands inside those bounds.
///
/// Both streaks reset whenever a decision other than `Hold` is taken.
#[derive(Debug, Clone)]
pub struct ScalingPolicy {
    min_workers: usize,
    max_workers: usize,
    max_batch_size: usize,
    scale_up_after: u32,
    scale_down_after: u32,
    saturated_streak: u32,
    idle_streak: u32,
}

impl ScalingPolicy {
    pub fn new(scaling: &ScalingConfig, batch: &BatchConfig) -> Self {
        Self {
            min_workers: scaling.min_workers,
            max_workers: scaling.max_workers,
            max_batch_size: batch.max_batch_size.max(1),
            scale_up_after: scaling.scale_up_after.max(1),
            scale_down_after: scaling.scale_down_after.max(1),
            saturated_streak: 0,
            idle_streak: 0,
        }
    }

    pub fn observe(&mut self, load: LoadObservation) -> ScalingDecision {
        let live = load.live_workers;
        if live < self.min_workers {
            return self.decide(ScalingDecision::ScaleUp(self.min_workers - live));
        }
        if live > self.max_workers {
            return self.decide(ScalingDecision::ScaleDown(live - self.max_workers));
        }

        let saturated = load.queue_depth > 0 && load.busy_workers >= live;
        let idle = load.queue_depth == 0 && load.busy_workers < live;
        if saturated {
            self.saturated_streak += 1;
            self.idle_streak = 0;
        } else if idle {
            self.idle_streak += 1;
            self.saturated_streak = 0;
        } else {
            self.saturated_streak = 0;
            self.idle_streak = 0;
        }

        if self.saturated_streak >= self.scale_up_after && live < self.max_workers {
            let wanted = load.queue_depth.div_ceil(self.max_batch_size).max(1);
            let target = (live + wanted).min(self.max_workers);
            return self.decide(ScalingDecision::ScaleUp(target - live));
        }
        if self.idle_streak >= self.scale_down_after && live > self.min_workers {
            return self.decide(ScalingDecision::ScaleDown(1));
        }
        ScalingDecision::Hold
    }

    fn decide(&mut self, decision: ScalingDecision) -> ScalingDecision {
        self.saturated_streak = 0;
        self.idle_streak = 0;
        decision
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::time::Duration;

    fn policy(min: usize, max: usize, up: u32, down: u32) -> ScalingPolicy {
        let scaling = ScalingConfig::new(min, max, 100).with_hysteresis(up, down);
        ScalingPolicy::new(&scaling, &BatchConfig::new(4, Duration::ZERO))
    }

    fn load(queue_depth: usize, live_workers: usize, busy_workers: usize) -> LoadObservation {
        LoadObservation {
            queue_depth,
            live_workers,
            busy_workers,
        }
    }

    #[test]
    fn grows_only_after_sustained_saturation() {
        let mut policy = policy(1, 8, 2, 5);

        assert_eq!(policy.observe(load(10, 1, 1)), ScalingDecision::Hold);
        assert_eq!(policy.observe(load(10, 1, 1)), ScalingDecision::ScaleUp(3));
    }

    #[test]
    fn a_single_quiet_tick_resets_saturation() {
        let mut policy = policy(1, 8, 2, 5);

        assert_eq!(policy.observe(load(10, 2, 2)), ScalingDecision::Hold);
        assert_eq!(policy.observe(load(10, 2, 1)), ScalingDecision::Hold);
        assert_eq!(policy.observe(load(10, 2, 2)), ScalingDecision::Hold);
    }

    #[test]
    fn shrinks_one_worker_at_a_time_after_sustained_idleness() {
        let mut policy = policy(1, 4, 1, 3);
        let mut live = 4;
        for _ in 0..20 {
            live = policy.observe(load(0, live, 0)).target(live);
        }
        assert_eq!(live, 1);
    }

    #[test]
    fn sustained_backlog_reaches_max_workers() {
        let mut policy = policy(0, 5, 1, 3);
        let mut live = 0;
        for _ in 0..20 {
            live = policy.observe(load(1, live, live)).target(live);
        }
        assert_eq!(live, 5);
    }

    #[rstest]
    #[case::below_min(0, ScalingDecision::ScaleUp(2))]
    #[case::above_max(7, ScalingDecision::ScaleDown(3))]
    #[case::within(3, ScalingDecision::Hold)]
    fn corrects_out_of_bound_counts(#[case] live: usize, #[case] expected: ScalingDecision) {
        let mut policy = policy(2, 4, 3, 3);
        assert_eq!(policy.observe(load(0, live, live)), expected);
    }

    #[rstest]
    #[case(0, 0, 1)]
    #[case(1, 1, 3)]
    #[case(2, 5, 1)]
    #[case(3, 3, 2)]
    fn decisions_never_leave_bounds(#[case] min: usize, #[case] max: usize, #[case] up: u32) {
        let mut policy = policy(min, max, up, 1);
        let mut live = min;
        let loads = [(50, true), (0, false), (7, true), (0, false), (3, true)];
        for _ in 0..10 {
            for (depth, busy) in loads {
                let busy_workers = if busy { live } else { 0 };
                live = policy.observe(load(depth, live, busy_workers)).target(live);
                assert!((min..=max).contains(&live), "live {live} outside [{min}, {max}]");
            }
        }
    }
}
