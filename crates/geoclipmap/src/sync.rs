//! CPU/GPU frame throttling.
//!
//! Instance buffers are reused every frame, so the CPU may only rewrite them
//! once the GPU has finished the previous frame's draws. A fence inserted
//! after the draws marks that point; the next frame waits on it before
//! touching any buffer.

use crate::config::SyncPolicy;
use std::time::Duration;

/// Result of a single bounded wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FenceStatus {
    Signaled,
    TimeoutExpired,
    WaitFailed,
}

/// Fence primitive of the graphics backend.
pub trait GpuFences {
    type Fence;

    /// Marks the end of all commands issued so far.
    fn insert_fence(&mut self) -> Self::Fence;
    fn client_wait(&mut self, fence: &Self::Fence, timeout: Duration) -> FenceStatus;
    fn release_fence(&mut self, fence: Self::Fence);
}

/// How the wait on the previous frame ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FenceOutcome {
    /// No fence was pending (first frame).
    Idle,
    Signaled { retries: u32 },
    /// The fence was invalid; the frame proceeds unsynchronised.
    WaitFailed,
    /// Every retry timed out; the frame proceeds unsynchronised.
    GaveUp { retries: u32 },
}

impl FenceOutcome {
    pub fn is_synchronised(&self) -> bool {
        matches!(self, FenceOutcome::Idle | FenceOutcome::Signaled { .. })
    }
}

/// Bounded-retry waiter with exponential backoff between timeouts.
#[derive(Debug, Clone)]
pub struct FrameThrottle {
    policy: SyncPolicy,
    sleeper: fn(Duration),
}

impl FrameThrottle {
    pub fn new(policy: SyncPolicy) -> Self {
        Self {
            policy,
            sleeper: std::thread::sleep,
        }
    }

    /// Replaces the backoff sleep, e.g. with a no-op in tests.
    pub fn with_sleeper(mut self, sleeper: fn(Duration)) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn policy(&self) -> &SyncPolicy {
        &self.policy
    }

    /// Waits for `fence` and releases it whatever the outcome.
    pub fn wait<G: GpuFences + ?Sized>(&self, gpu: &mut G, fence: Option<G::Fence>) -> FenceOutcome {
        let Some(fence) = fence else {
            return FenceOutcome::Idle;
        };

        let mut retries = 0;
        let outcome = loop {
            match gpu.client_wait(&fence, self.policy.timeout) {
                FenceStatus::Signaled => break FenceOutcome::Signaled { retries },
                FenceStatus::WaitFailed => {
                    log::error!("Fence wait failed; rendering without synchronisation");
                    break FenceOutcome::WaitFailed;
                }
                FenceStatus::TimeoutExpired => {
                    if retries >= self.policy.max_retries {
                        log::error!(
                            "Fence still unsignaled after {} retries; rendering without synchronisation",
                            retries
                        );
                        break FenceOutcome::GaveUp { retries };
                    }
                    log::warn!(
                        "Fence wait timed out after {:?} (retry {}), slow GPU frame",
                        self.policy.timeout,
                        retries + 1
                    );
                    (self.sleeper)(self.policy.backoff(retries));
                    retries += 1;
                }
            }
        };

        gpu.release_fence(fence);
        outcome
    }
}
