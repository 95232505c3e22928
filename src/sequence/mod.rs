//! Sequences: operation catalog, declarative runner, config loader

pub mod loader;
pub mod operations;
pub mod runner;

pub use loader::{LoaderError, SequenceConfigLoader, StaticTokenResolver, TokenResolver};
pub use operations::{Operation, OperationsFacade, UnknownOperation};
pub use runner::{
    OperationResolver, SequenceRequest, SequenceResult, SequenceRunner, SequenceStep, StepOutcome,
};
