//! Guarded command execution.
//!
//! Keep the public surface small: an [`Executor`], its builder, the future a command
//! resolves through, and the [`Outcome`] labels.
//! Implementation details are split into submodules under `src/executor/`.

pub mod builder;
mod command;
pub mod core;
pub mod outcome;

pub use builder::ExecutorBuilder;
pub use command::CommandFuture;
pub use self::core::Executor;
pub use outcome::{outcome_label, Outcome};
