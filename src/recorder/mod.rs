//! Recording sessions, continuation probing, and the segmented recorder.

pub mod probe;
pub mod segmented;
pub mod session;

pub use probe::{ProbeOutcome, probe_speech_start};
pub use segmented::{RecorderIo, RecordingOutcome, SegmentedRecorder};
pub use session::run_session;
