//! Speech recognition: activity oracle, transcription, and the shared
//! inference gate.

pub mod oracle;
pub mod transcriber;

pub use oracle::{EnergyOracle, MockOracle, SpeechActivityOracle};
pub use transcriber::{
    HttpTranscriptionService, MockTranscriptionService, Transcript, TranscriptionService,
};

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Serializes every oracle and transcription call. Neither backend is
/// assumed safe for concurrent invocation, and a barge-in probe can
/// overlap a speculative transcription, so both hold this gate for the
/// duration of each call.
#[derive(Clone, Default)]
pub struct InferenceGate {
    lock: Arc<Mutex<()>>,
}

impl InferenceGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquires the gate, recovering from a poisoned lock (a panicked
    /// holder leaves no state behind the unit value).
    pub fn acquire(&self) -> MutexGuard<'_, ()> {
        self.lock.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
