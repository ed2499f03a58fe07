//! # arenavm - an arena-backed execution core
//!
//! All program state lives in one growable byte [`Arena`]. Values are addressed by
//! integer offsets, never native pointers: globals and literals sit in a data segment,
//! call frames in a stack segment, and strings and slices in a bump-allocated heap as
//! `[count: u32][elements]` objects.
//!
//! ## Pipeline
//!
//! 1. A front end builds small `to` / `from` node sequences and hands them to
//!    [`Lowering`], which merges them into linear IR ([`Expression`]s).
//! 2. [`FunctionBuilder`] binds names to frame offsets or globals, links struct
//!    fields and checks every node against its operator's signature.
//! 3. [`Vm`] runs the laid-out [`Program`], resolving every [`Argument`] against the
//!    arena just in time and dispatching native operators from an [`OpcodeTable`].
//!
//! ## Quick Start
//!
//! ```rust
//! use arenavm::{
//!     Argument, AssignOp, Expression, FunctionBuilder, Lowering, OpcodeTable, ProgramBuilder,
//!     TypeKind, Value, Vm, VmOptions,
//! };
//!
//! # fn main() -> arenavm::Result<()> {
//! let opcodes = OpcodeTable::new();
//! let mut program = ProgramBuilder::new();
//! let seven = program.literal(Value::I64(7), TypeKind::I64)?;
//! let three = program.literal(Value::I64(3), TypeKind::I64)?;
//!
//! let mut main = FunctionBuilder::new("main", "main").returns("q", TypeKind::I64);
//! {
//!     let mut lowering = Lowering::new(&program, &opcodes, "main");
//!     let div = Expression::op(opcodes.operator("i64.div")?).input(seven).input(three);
//!     main.extend(lowering.assignment(
//!         vec![Expression::value(Argument::new("q"))],
//!         AssignOp::Assign,
//!         vec![div],
//!     )?);
//! }
//! let main = main.build(&program)?;
//! program.add_function(main);
//!
//! let mut vm = Vm::new(program.build()?, opcodes, VmOptions::default())?;
//! let results = vm.run()?;
//! assert_eq!(results[0], 2i64.to_le_bytes().to_vec());
//! # Ok(())
//! # }
//! ```
//!
//! ## Errors
//!
//! Every fallible operation returns [`Result`]. Errors raised while executing a node
//! are wrapped in [`Error::Evaluation`] with the node's source location; a failed run
//! leaves the call stack empty and never writes a partial operator result.
//!
//! ## Adapters
//!
//! Host libraries register extra opcodes (see [`adapters::window`]). Callbacks from
//! host threads are queued on a [`CallbackQueue`] and run by the VM on its own thread.

#![warn(missing_docs)]

pub mod adapters;
pub mod error;
pub mod ir;
pub mod lowering;
pub mod memory;
pub mod opcodes;
pub mod types;
pub mod vm;

pub use adapters::{CallbackQueue, PendingCallback};
pub use error::{Error, ErrorSeverity, Result, SourceLoc};
pub use ir::{
    Argument, DerefOp, Expression, Function, FunctionRef, OpCode, Operator, PassBy, Program,
    ProgramBuilder, Signature, Storage,
};
pub use lowering::{AssignOp, FunctionBuilder, Lowering};
pub use memory::{Arena, Offset, Value};
pub use opcodes::{OpContext, Opcode, OpcodeTable};
pub use types::{StructTable, TypeKind};
pub use vm::{Vm, VmOptions};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
