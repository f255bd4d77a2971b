pub mod config;
pub mod context;
pub mod error;
pub mod locks;
pub mod runner;

#[cfg(test)]
pub(crate) mod testing;

pub use config::PipelineConfig;
pub use context::PipelineContext;
pub use error::{PipelineError, PipelineWarning};
pub use locks::LabelLocks;
pub use runner::Pipeline;
