//! Pending operations of one radio session.
//!
//! Every wait is a slot holding its start time, its duration and what to do
//! once it expires. Starting a slot again replaces the pending operation.

use crate::device::timer::elapsed_us;

/// Independent timers of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub(crate) enum Slot {
    /// Reply from the peer.
    ReplyWait = 0,
    PeerSearch = 1,
    Range = 2,
    App = 3,
}

const SLOT_COUNT: usize = 4;

/// What runs when a pending operation expires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub(crate) enum Continuation {
    /// Next peer request may go out.
    PeerRequestInterval,
    /// The initiator did not confirm the offered address.
    PeerConfirmTimeout,
    /// The peer did not answer a request of the PER initiator.
    ReplyTimeout,
    /// Next beacon of a host driven range test.
    RangeBeacon,
    /// Next beacon of the stand-alone range test.
    LegacyRangeBeacon,
    /// End of a continuous wave pulse.
    StopPulse,
    /// Deferred restart after the peer disconnected.
    AppReset,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub(crate) struct PendingOp {
    pub(crate) started_at: u32,
    pub(crate) duration_us: u32,
    pub(crate) continuation: Continuation,
}

impl PendingOp {
    fn expired(&self, now: u32) -> bool {
        elapsed_us(self.started_at, now) >= self.duration_us
    }
}

#[derive(Debug, Default)]
pub(crate) struct Scheduler {
    slots: [Option<PendingOp>; SLOT_COUNT],
}

impl Scheduler {
    pub(crate) const fn new() -> Self {
        Self { slots: [None; SLOT_COUNT] }
    }

    pub(crate) fn start(
        &mut self,
        slot: Slot,
        now: u32,
        duration_us: u32,
        continuation: Continuation,
    ) {
        trace!("start {} for {} us", slot, duration_us);
        self.slots[slot as usize] = Some(PendingOp { started_at: now, duration_us, continuation });
    }

    pub(crate) fn stop(&mut self, slot: Slot) {
        self.slots[slot as usize] = None;
    }

    pub(crate) fn is_running(&self, slot: Slot) -> bool {
        self.slots[slot as usize].is_some()
    }

    pub(crate) fn clear(&mut self) {
        self.slots = [None; SLOT_COUNT];
    }

    /// Remove and return the first expired operation, in slot order.
    pub(crate) fn take_expired(&mut self, now: u32) -> Option<Continuation> {
        let slot = self.slots.iter_mut().find(|op| matches!(op, Some(p) if p.expired(now)))?;
        slot.take().map(|op| op.continuation)
    }
}
