//! Channel lifecycle: classify messages, decide staleness, warn, archive.

pub mod classifier;
pub mod engine;
pub mod exclusion;
pub mod markup;
pub mod staleness;
pub mod state;

pub use engine::LifecycleEngine;
pub use exclusion::{ArchiveBlock, ChannelIgnoreList};
pub use markup::MarkupResolver;
pub use staleness::StalenessEvaluator;
pub use state::{ChannelState, Outcome, RunReport};
