pub mod error;
pub mod evaluator;
pub mod functions;
pub mod runtime;
