//! Microphone gate
//!
//! Audio may only be captured while the assistant is neither speaking nor
//! paused. State changes are published over a watch channel so waiters
//! suspend until the gate opens instead of polling.

use tokio::sync::watch;

/// Speaking and paused flags of one session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GateState {
    pub speaking: bool,
    pub paused: bool,
}

impl GateState {
    /// Listening is permitted
    #[must_use]
    pub const fn is_open(&self) -> bool {
        !self.speaking && !self.paused
    }
}

/// Shared speaking/paused state with change notification
#[derive(Debug)]
pub struct VoiceGate {
    tx: watch::Sender<GateState>,
}

impl Default for VoiceGate {
    fn default() -> Self {
        Self::new()
    }
}

impl VoiceGate {
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(GateState::default());
        Self { tx }
    }

    /// Current flags
    #[must_use]
    pub fn state(&self) -> GateState {
        *self.tx.borrow()
    }

    #[must_use]
    pub fn is_speaking(&self) -> bool {
        self.state().speaking
    }

    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.state().paused
    }

    pub fn set_speaking(&self, speaking: bool) {
        self.tx.send_if_modified(|state| {
            let changed = state.speaking != speaking;
            state.speaking = speaking;
            changed
        });
    }

    pub fn set_paused(&self, paused: bool) {
        self.tx.send_if_modified(|state| {
            let changed = state.paused != paused;
            state.paused = paused;
            changed
        });
    }

    /// Wait until neither speaking nor paused
    pub async fn wait_open(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives in `self`, so the channel cannot close here
        let _ = rx.wait_for(GateState::is_open).await;
    }

    /// Wait until not speaking, ignoring the paused flag
    pub async fn wait_silent(&self) {
        let mut rx = self.tx.subscribe();
        let _ = rx.wait_for(|state| !state.speaking).await;
    }
}
