//! Two-phase timing policy for batch release.
//!
//! A worker's timer is always in one of two phases. FIXED is a short probe:
//! it gives an ingress burst a cheap chance to grow the batch past the lower
//! threshold. UNDERFILLED is the long deadline that bounds latency for
//! batches the burst never filled. Full batches bypass the timer entirely.
//!
//! The decisions here are pure functions over batch size and phase so the
//! whole policy can be tested without clocks or channels; the worker loop
//! owns the actual timer.

/// Timer phase of a batch worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TimerPhase {
    /// Short-probe phase. Entered after every flush and on fresh batches.
    Fixed,
    /// Long-deadline phase. Entered when a probe expired below the lower
    /// threshold.
    Underfilled,
}

/// What the worker does right after appending an item to its batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ArrivalAction {
    /// The batch reached `max_size`; hand it off without consulting timers.
    FlushNow,
    /// Restart the probe timer at `fixed_wait`.
    RestartFixedTimer,
    /// The UNDERFILLED deadline is absolute; leave it untouched.
    KeepDeadline,
}

/// What the worker does when its timer fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ExpiryAction {
    /// Hand off whatever the batch holds.
    Flush,
    /// The probe found too few items; arm the long deadline.
    EnterUnderfilled,
    /// Nothing is buffered; leave the timer unarmed until the next item.
    Disarm,
}

/// Decision taken on item arrival, after the item has been appended.
pub(crate) fn on_item(len_after_push: usize, max_size: usize, phase: TimerPhase) -> ArrivalAction {
    if len_after_push >= max_size {
        return ArrivalAction::FlushNow;
    }

    match phase {
        TimerPhase::Fixed => ArrivalAction::RestartFixedTimer,
        TimerPhase::Underfilled => ArrivalAction::KeepDeadline,
    }
}

/// Decision taken on timer expiry.
pub(crate) fn on_expiry(len: usize, lower_threshold: usize, phase: TimerPhase) -> ExpiryAction {
    match phase {
        TimerPhase::Fixed if len >= lower_threshold => ExpiryAction::Flush,
        TimerPhase::Fixed if len > 0 => ExpiryAction::EnterUnderfilled,
        TimerPhase::Fixed => ExpiryAction::Disarm,
        TimerPhase::Underfilled if len > 0 => ExpiryAction::Flush,
        TimerPhase::Underfilled => ExpiryAction::Disarm,
    }
}
