pub mod assembler;
pub mod corpus;
pub mod error;
pub mod executor;
pub mod history;
pub mod pipeline;
pub mod planner;
pub mod prompts;
pub mod sink;
pub mod streamer;

pub use corpus::CorpusProfile;
pub use error::TurnError;
pub use pipeline::{TurnConfig, TurnPipeline};
pub use sink::{EventSink, SinkClosed};
