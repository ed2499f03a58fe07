//! Evaluation: argument resolution, call frames and the run loop

pub mod evaluator;
pub mod frame;
pub mod options;
pub mod resolver;

pub use evaluator::Vm;
pub use frame::{CallFrame, CallStack};
pub use options::VmOptions;
pub use resolver::{Location, Resolver};
