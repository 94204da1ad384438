pub mod processor;
pub mod scorer;

pub use processor::{Hit, Processor};
pub use scorer::{Ranker, Scorer};
