//! Intermediate representation: argument descriptors, IR nodes and programs
//!
//! The lowering pass produces ordered `Vec<Expression>` bodies; the VM walks them.

pub mod argument;
pub mod expression;
pub mod program;

pub use argument::{step_type, Argument, DerefOp, FieldRef, IndexSource, PassBy, Storage};
pub use expression::{Expression, FunctionRef, OpCode, Operator, ParamSpec, Signature};
pub use program::{Function, Program, ProgramBuilder};

/// Renders lowered IR as pretty-printed JSON for diagnostics
pub fn dump(body: &[Expression]) -> String {
    serde_json::to_string_pretty(body).unwrap_or_else(|e| format!("<unprintable IR: {}>", e))
}
