//! Single-slot auto-close scheduler.
//!
//! The [`Scheduler`] holds at most one live deferred action.  Arming a new
//! one supersedes whatever was armed before: every [`Handle`] carries the
//! generation it was armed with, and a deferred action only runs if its
//! generation is still the current one *and* nobody cancelled it.  That
//! check, the transition to [`Status::Fired`] and the action itself all
//! happen under the scheduler's lock, so a concurrent [`cancel`] or
//! [`arm`] either wins outright or waits for the action to finish.
//! The flip side is that an action must not wait on anything that calls
//! back into the same scheduler.
//!
//! [`cancel`]: Scheduler::cancel
//! [`arm`]: Scheduler::arm

use log::{debug, warn};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Lifecycle of a [`Handle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Armed, deadline not reached, not cancelled.
    Pending,
    /// The action ran (or is running).
    Fired,
    /// Cancelled before the deadline.
    Cancelled,
    /// A newer handle has been armed since.
    Superseded,
}

/// Identifies one armed deferred action.
#[derive(Debug, Clone)]
pub struct Handle {
    generation: u64,
    deadline: Option<Instant>,
}

impl Handle {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// When the action is due, or `None` if the duration reaches past what
    /// [`Instant`] can represent (the action then only ends by cancel or
    /// supersession).
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }
}

#[derive(Debug)]
struct Slot {
    /// Generation of the most recently armed handle (0 = never armed).
    generation: u64,
    status: Status,
}

#[derive(Debug)]
struct Shared {
    slot: Mutex<Slot>,
    wake: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Slot> {
        // A panicking action must not wedge the daemon.
        self.slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Deferred-action primitive with at most one pending instance.
///
/// Cloning a `Scheduler` yields another view of the same slot.
#[derive(Debug, Clone)]
pub struct Scheduler {
    shared: Arc<Shared>,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                slot: Mutex::new(Slot {
                    generation: 0,
                    status: Status::Cancelled,
                }),
                wake: Condvar::new(),
            }),
        }
    }

    /// Schedule `action` to run once `duration` has elapsed.
    ///
    /// Any previously armed handle is superseded and its action will never
    /// run.  A zero duration is legal and fires as soon as the timer thread
    /// gets scheduled.  A duration too large for [`Instant`] never fires.
    pub fn arm<F>(&self, duration: Duration, action: F) -> Handle
    where
        F: FnOnce() + Send + 'static,
    {
        let deadline = Instant::now().checked_add(duration);
        if deadline.is_none() {
            warn!("timer duration {:?} out of range, it will never fire", duration);
        }
        let generation = {
            let mut slot = self.shared.lock();
            slot.generation += 1;
            slot.status = Status::Pending;
            slot.generation
        };
        // Wake the superseded timer thread (if any) so it can exit early.
        self.shared.wake.notify_all();
        debug!("armed timer #{} for {:?}", generation, duration);

        let shared = Arc::clone(&self.shared);
        std::thread::spawn(move || wait_and_fire(&shared, generation, deadline, action));

        Handle {
            generation,
            deadline,
        }
    }

    /// Cancel `handle`.
    ///
    /// Returns `true` if the handle was pending and is now cancelled.  An
    /// action that already fired is not undone, and cancelling a superseded
    /// handle has no effect on the current one.
    pub fn cancel(&self, handle: &Handle) -> bool {
        let mut slot = self.shared.lock();
        if slot.generation != handle.generation || slot.status != Status::Pending {
            return false;
        }
        slot.status = Status::Cancelled;
        drop(slot);
        self.shared.wake.notify_all();
        debug!("cancelled timer #{}", handle.generation);
        true
    }

    /// `true` iff `handle` has neither fired nor been cancelled or
    /// superseded.
    pub fn is_pending(&self, handle: &Handle) -> bool {
        self.status(handle) == Status::Pending
    }

    pub fn status(&self, handle: &Handle) -> Status {
        let slot = self.shared.lock();
        if slot.generation == handle.generation {
            slot.status
        } else {
            Status::Superseded
        }
    }
}

fn wait_and_fire<F: FnOnce()>(
    shared: &Shared,
    generation: u64,
    deadline: Option<Instant>,
    action: F,
) {
    let mut slot = shared.lock();
    loop {
        if slot.generation != generation || slot.status != Status::Pending {
            debug!("timer #{} dropped before firing", generation);
            return;
        }
        slot = match deadline {
            Some(deadline) => {
                let now = Instant::now();
                if now >= deadline {
                    break;
                }
                match shared.wake.wait_timeout(slot, deadline - now) {
                    Ok((guard, _)) => guard,
                    Err(poisoned) => poisoned.into_inner().0,
                }
            }
            None => shared
                .wake
                .wait(slot)
                .unwrap_or_else(|poisoned| poisoned.into_inner()),
        };
    }

    slot.status = Status::Fired;
    debug!("timer #{} fired", generation);
    // Run with the lock held: a cancel or re-arm arriving now waits for the
    // action instead of overlapping it.
    action();
    drop(slot);
}

//  Tests
