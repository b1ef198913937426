//! Turn stall watchdog.
//!
//! Bounds how long a turn may stay in flight before the transcript gets a
//! warning. The watchdog only stops *waiting*: the underlying request is not
//! aborted, and a late reply is still appended as a normal turn.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use hearth_core::transcript::{ConversationState, Role, Turn};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::warn;

pub const STALL_WARNING: &str =
    "⚠️ Response is taking unusually long. You can retry your question or check backend connectivity.";

/// In-flight bookkeeping for the current turn. Sequence numbers keep one
/// turn's completion from cancelling a different turn's watchdog.
#[derive(Debug, Default)]
pub(crate) struct TurnFlight {
    seq: AtomicU64,
    in_flight: AtomicBool,
}

impl TurnFlight {
    pub fn begin(&self) -> u64 {
        let seq = self.seq.fetch_add(1, Ordering::SeqCst) + 1;
        self.in_flight.store(true, Ordering::SeqCst);
        seq
    }

    /// Clears the in-flight flag if `seq` is still the current turn; returns
    /// whether this call performed the transition. Last write wins, so a
    /// fired watchdog and a late completion can both call this safely.
    pub fn clear(&self, seq: u64) -> bool {
        if self.seq.load(Ordering::SeqCst) == seq {
            self.in_flight.swap(false, Ordering::SeqCst)
        } else {
            false
        }
    }
}

pub struct Watchdog {
    bound: Duration,
}

impl Watchdog {
    pub fn new(bound: Duration) -> Self {
        Self { bound }
    }

    /// Starts a timer for the turn identified by `seq`. The returned handle
    /// must be disarmed on normal completion (success or handled failure).
    pub(crate) fn arm(
        &self,
        flight: Arc<TurnFlight>,
        seq: u64,
        state: Arc<Mutex<ConversationState>>,
        revision: Arc<watch::Sender<u64>>,
    ) -> WatchdogHandle {
        let bound = self.bound;
        let task = tokio::spawn(async move {
            tokio::time::sleep(bound).await;
            if !flight.clear(seq) {
                return;
            }
            warn!(turn_seq = seq, bound_secs = bound.as_secs(), "turn stalled past watchdog bound");
            let mut state = state.lock().await;
            if !stall_already_warned(state.turns()) {
                state.append_turn(Turn::assistant(STALL_WARNING));
                revision.send_modify(|value| *value += 1);
            }
        });
        WatchdogHandle { task }
    }
}

pub(crate) struct WatchdogHandle {
    task: JoinHandle<()>,
}

impl WatchdogHandle {
    pub fn disarm(self) {
        self.task.abort();
    }
}

/// A warning is deduplicated per stall: only assistant turns since the most
/// recent user turn count.
fn stall_already_warned(turns: &[Turn]) -> bool {
    turns
        .iter()
        .rev()
        .take_while(|turn| turn.role == Role::Assistant)
        .any(|turn| turn.content == STALL_WARNING)
}
