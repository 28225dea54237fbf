//! Update batching and reentrancy protection.
//!
//! Pure state machine, no callbacks: the manager asks the gate whether a
//! report may fire now and the gate records the request otherwise. The
//! mechanism is a suspension counter plus two busy flags plus a pending
//! flag; the suspension depth is independent of the busy phases, which is
//! why this is not collapsed into a single enum.

/// Decides when a "state updated" report may be dispatched.
///
/// Rules:
/// - a request fires only when not suspended, not reporting, and not
///   rebuilding; otherwise it is recorded as pending;
/// - beginning a report absorbs the pending flag (the report satisfies it);
/// - requests arriving *during* a report or rebuild re-set pending and are
///   dispatched at the next resume-to-zero or next idle request — never
///   synchronously from inside the busy section, and never twice.
#[derive(Debug, Default)]
pub(crate) struct UpdateGate {
    suspensions: u32,
    reporting: bool,
    rebuilding: bool,
    pending: bool,
}

impl UpdateGate {
    fn idle(&self) -> bool {
        self.suspensions == 0 && !self.reporting && !self.rebuilding
    }

    /// Request an update. Returns true when the caller should dispatch a
    /// report immediately; otherwise the request is recorded as pending.
    pub fn request(&mut self) -> bool {
        if self.idle() {
            true
        } else {
            self.pending = true;
            false
        }
    }

    pub fn suspend(&mut self) {
        self.suspensions += 1;
    }

    /// Drop one suspension level. Returns true when the caller should
    /// dispatch the report that was requested while suspended.
    pub fn resume(&mut self) -> bool {
        self.suspensions = self.suspensions.saturating_sub(1);
        if self.idle() && self.pending {
            self.pending = false;
            true
        } else {
            false
        }
    }

    pub fn begin_report(&mut self) {
        self.reporting = true;
        self.pending = false;
    }

    pub fn end_report(&mut self) {
        self.reporting = false;
    }

    pub fn begin_rebuild(&mut self) {
        self.rebuilding = true;
    }

    pub fn end_rebuild(&mut self) {
        self.rebuilding = false;
    }

    #[cfg(test)]
    pub fn is_pending(&self) -> bool {
        self.pending
    }
}
