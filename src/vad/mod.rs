//! Voice activity detection gate.

pub mod gate;

pub use gate::{GateConfig, GateEvent, GateState, VoiceActivityGate};
