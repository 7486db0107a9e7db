use tokio::time::Instant;

/// Identifies one arming of a [`TimerSlot`]. Re-arming or cancelling the slot
/// makes every earlier handle stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerHandle {
    generation: u64,
}

/// A single pending deadline of one kind.
#[derive(Debug, Default)]
pub struct TimerSlot {
    deadline: Option<Instant>,
    generation: u64,
}

impl TimerSlot {
    pub fn arm(&mut self, deadline: Instant) -> TimerHandle {
        self.generation += 1;
        self.deadline = Some(deadline);
        TimerHandle {
            generation: self.generation,
        }
    }

    pub fn cancel(&mut self) {
        if self.deadline.take().is_some() {
            self.generation += 1;
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn is_current(&self, handle: TimerHandle) -> bool {
        self.deadline.is_some() && handle.generation == self.generation
    }

    /// Handle of the armed deadline if it has passed at `now`.
    pub fn due(&self, now: Instant) -> Option<TimerHandle> {
        match self.deadline {
            Some(deadline) if deadline <= now => Some(TimerHandle {
                generation: self.generation,
            }),
            _ => None,
        }
    }

    /// Disarms the slot if `handle` is still current.
    pub(crate) fn consume(&mut self, handle: TimerHandle) -> bool {
        if !self.is_current(handle) {
            return false;
        }
        self.deadline = None;
        true
    }
}
