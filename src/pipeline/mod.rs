//! Streaming reply pipeline and per-turn orchestration.

pub mod stream;
pub mod turn;

pub use stream::{
    PipelineOutcome, PipelineReport, QueueItem, SpokenSentence, StreamingResponsePipeline,
};
pub use turn::{TurnEngine, TurnEvent};
