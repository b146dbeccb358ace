//! Actions deferred by a number of logic ticks.
//!
//! A [`DelayedActions`] queue holds boxed closures together with the tick on
//! which they become due. The [`GameLoop`](crate::tick::GameLoop) owns one
//! and advances it once per tick after the Systems ran; a System that needs
//! timed behavior of its own can also own a queue and advance it from
//! `execute()`.

use std::fmt;

use tracing::trace;

use dungeon_ecs::world::World;

/// Handle to a scheduled action, usable to cancel it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ActionHandle(u64);

type Action = Box<dyn FnOnce(&mut World)>;

struct Scheduled {
    handle: ActionHandle,
    due: u64,
    action: Action,
}

/// A queue of actions, each run once when its delay has elapsed.
///
/// Actions due on the same tick run in the order they were scheduled.
#[derive(Default)]
pub struct DelayedActions {
    elapsed: u64,
    next_handle: u64,
    queue: Vec<Scheduled>,
}

impl DelayedActions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `action` on the `delay_ticks`-th following [`advance`](Self::advance).
    /// A delay of zero behaves like one.
    pub fn schedule<F>(&mut self, delay_ticks: u64, action: F) -> ActionHandle
    where
        F: FnOnce(&mut World) + 'static,
    {
        let handle = ActionHandle(self.next_handle);
        self.next_handle += 1;
        let due = self.elapsed + delay_ticks.max(1);
        trace!(handle = handle.0, due, "action scheduled");
        self.queue.push(Scheduled {
            handle,
            due,
            action: Box::new(action),
        });
        handle
    }

    /// Drop a pending action. Returns `false` if it already ran or was
    /// cancelled.
    pub fn cancel(&mut self, handle: ActionHandle) -> bool {
        let before = self.queue.len();
        self.queue.retain(|s| s.handle != handle);
        self.queue.len() != before
    }

    pub fn is_pending(&self, handle: ActionHandle) -> bool {
        self.queue.iter().any(|s| s.handle == handle)
    }

    /// Ticks left until a pending action runs.
    pub fn remaining(&self, handle: ActionHandle) -> Option<u64> {
        self.queue
            .iter()
            .find(|s| s.handle == handle)
            .map(|s| s.due - self.elapsed)
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Drop every pending action.
    pub fn clear(&mut self) {
        self.queue.clear();
    }

    /// Count one tick and run every action that became due. Returns how many
    /// ran.
    pub fn advance(&mut self, world: &mut World) -> usize {
        self.elapsed += 1;
        let (due, waiting): (Vec<Scheduled>, Vec<Scheduled>) = std::mem::take(&mut self.queue)
            .into_iter()
            .partition(|s| s.due <= self.elapsed);
        self.queue = waiting;
        let ran = due.len();
        for scheduled in due {
            trace!(handle = scheduled.handle.0, "action running");
            (scheduled.action)(world);
        }
        ran
    }
}

impl fmt::Debug for DelayedActions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DelayedActions")
            .field("elapsed", &self.elapsed)
            .field("pending", &self.queue.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
