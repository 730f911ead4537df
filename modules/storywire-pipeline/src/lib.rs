pub mod budget;
pub mod clusterer;
pub mod normalizer;
pub mod og_image;
pub mod ranker;
pub mod runner;
pub mod similarity;
pub mod store;
#[cfg(feature = "test-utils")]
pub mod testutil;

pub use clusterer::Clusterer;
pub use normalizer::Normalizer;
pub use ranker::Ranker;
pub use runner::{CycleReport, PipelineRunner, SourceDefinition};
pub use store::RawSignalStore;
