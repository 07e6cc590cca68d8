pub mod definitions;
pub mod executor;
pub mod graph;
pub mod prompts;

pub use executor::{GenerateError, Generator, StepInput, TaskGraphExecutor};
pub use graph::{GraphError, StepId, TaskGraph};
