//! Priority queue broker: three FIFO lanes with bounded strict priority.
//!
//! Priority-lane jobs are dequeued before normal, normal before bulk,
//! but never unboundedly: after `burst_limit` consecutive claims from a
//! lane while lower lanes wait, one claim is forced from the highest
//! non-empty lower lane. Within a lane, order is FIFO relative to
//! enqueue order.

use std::collections::VecDeque;
use std::sync::Mutex;

use tokio::sync::Notify;
use tracing::trace;

use conductor_core::defaults::LANE_BURST_LIMIT;
use conductor_core::{JobDescriptor, Lane};

#[derive(Debug, Default)]
struct LaneQueues {
    priority: VecDeque<JobDescriptor>,
    normal: VecDeque<JobDescriptor>,
    bulk: VecDeque<JobDescriptor>,
    /// Consecutive priority-lane claims while lower lanes were waiting.
    priority_run: u32,
    /// Consecutive normal-lane claims while bulk was waiting.
    normal_run: u32,
}

/// In-process broker coordinating orchestrator and workers.
///
/// Claiming is atomic: the internal mutex guarantees no two workers
/// observe the same job as unclaimed.
pub struct QueueBroker {
    lanes: Mutex<LaneQueues>,
    notify: Notify,
    burst_limit: u32,
}

impl QueueBroker {
    /// Broker with the default anti-starvation bound.
    pub fn new() -> Self {
        Self::with_burst_limit(LANE_BURST_LIMIT)
    }

    /// Broker with an explicit bound on consecutive higher-lane claims.
    pub fn with_burst_limit(burst_limit: u32) -> Self {
        Self {
            lanes: Mutex::new(LaneQueues::default()),
            notify: Notify::new(),
            burst_limit: burst_limit.max(1),
        }
    }

    /// Enqueue a job into its assigned lane.
    pub fn enqueue(&self, job: JobDescriptor) {
        {
            let mut lanes = self.lanes.lock().expect("broker mutex poisoned");
            trace!(job_id = %job.id, lane = %job.lane, "Enqueue");
            match job.lane {
                Lane::Priority => lanes.priority.push_back(job),
                Lane::Normal => lanes.normal.push_back(job),
                Lane::Bulk => lanes.bulk.push_back(job),
            }
        }
        self.notify.notify_one();
    }

    /// Claim the next job, or `None` when every lane is empty.
    pub fn claim(&self) -> Option<JobDescriptor> {
        let mut lanes = self.lanes.lock().expect("broker mutex poisoned");

        let lower_waiting = !lanes.normal.is_empty() || !lanes.bulk.is_empty();
        if !lanes.priority.is_empty() {
            if lanes.priority_run >= self.burst_limit && lower_waiting {
                // Forced lower-lane claim bounds bulk latency.
                lanes.priority_run = 0;
                return Some(self.claim_lower(&mut lanes));
            }
            lanes.priority_run += 1;
            return lanes.priority.pop_front();
        }

        lanes.priority_run = 0;
        if lanes.normal.is_empty() && lanes.bulk.is_empty() {
            return None;
        }
        Some(self.claim_lower(&mut lanes))
    }

    /// Claim from normal or bulk. The burst bound cascades: normal
    /// cannot starve bulk any more than priority can starve normal.
    fn claim_lower(&self, lanes: &mut LaneQueues) -> JobDescriptor {
        if lanes.normal.is_empty() {
            lanes.normal_run = 0;
            return lanes.bulk.pop_front().expect("bulk non-empty");
        }
        if !lanes.bulk.is_empty() && lanes.normal_run >= self.burst_limit {
            lanes.normal_run = 0;
            return lanes.bulk.pop_front().expect("bulk non-empty");
        }
        lanes.normal_run += 1;
        lanes.normal.pop_front().expect("normal non-empty")
    }

    /// Claim the next job, waiting until one is available.
    pub async fn claim_waiting(&self) -> JobDescriptor {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            // Register interest before checking so an enqueue between
            // the check and the await cannot be missed.
            notified.as_mut().enable();
            if let Some(job) = self.claim() {
                // Pass the wakeup on in case more jobs are queued.
                self.notify.notify_one();
                return job;
            }
            notified.await;
        }
    }

    /// Number of jobs waiting in one lane.
    pub fn lane_len(&self, lane: Lane) -> usize {
        let lanes = self.lanes.lock().expect("broker mutex poisoned");
        match lane {
            Lane::Priority => lanes.priority.len(),
            Lane::Normal => lanes.normal.len(),
            Lane::Bulk => lanes.bulk.len(),
        }
    }

    /// Total jobs waiting across all lanes.
    pub fn len(&self) -> usize {
        let lanes = self.lanes.lock().expect("broker mutex poisoned");
        lanes.priority.len() + lanes.normal.len() + lanes.bulk.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for QueueBroker {
    fn default() -> Self {
        Self::new()
    }
}
