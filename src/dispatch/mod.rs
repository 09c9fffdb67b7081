pub mod effects;
pub mod estimate;
pub mod locks;
pub mod matching;
pub mod orchestrator;

pub use matching::{MatchOutcome, MatchingService};
pub use orchestrator::Dispatcher;
