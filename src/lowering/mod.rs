//! Lowering of assignment statements into IR node sequences
//!
//! A front end hands the lowering pass two short node sequences: `to`, whose last
//! node's output is the assignment target, and `from`, whose last node produces the
//! value. The pass merges them into one sequence ending in a node that writes the
//! target. Bodies are then laid out by [`FunctionBuilder`].

pub mod assignment;
pub mod layout;

pub use layout::FunctionBuilder;

use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result, SourceLoc};
use crate::ir::{Argument, Expression, Operator, ProgramBuilder};
use crate::opcodes::OpcodeTable;
use crate::types::TypeKind;

/// Assignment operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssignOp {
    /// `=`
    Assign,
    /// `:=`
    Define,
    /// `+=`
    Add,
    /// `-=`
    Sub,
    /// `*=`
    Mul,
    /// `/=`
    Div,
    /// `%=`
    Mod,
    /// `<<=`
    Shl,
    /// `>>=`
    Shr,
    /// `&=`
    And,
    /// `|=`
    Or,
    /// `^=`
    Xor,
}

impl AssignOp {
    /// Type-generic opcode applied by a compound operator
    pub fn opcode(&self) -> Option<&'static str> {
        match self {
            AssignOp::Assign | AssignOp::Define => None,
            AssignOp::Add => Some("und.add"),
            AssignOp::Sub => Some("und.sub"),
            AssignOp::Mul => Some("und.mul"),
            AssignOp::Div => Some("und.div"),
            AssignOp::Mod => Some("und.mod"),
            AssignOp::Shl => Some("und.shl"),
            AssignOp::Shr => Some("und.shr"),
            AssignOp::And => Some("und.and"),
            AssignOp::Or => Some("und.or"),
            AssignOp::Xor => Some("und.xor"),
        }
    }

    /// Is this one of the `op=` forms?
    pub fn is_compound(&self) -> bool {
        self.opcode().is_some()
    }

    fn symbol(&self) -> &'static str {
        match self {
            AssignOp::Assign => "=",
            AssignOp::Define => ":=",
            AssignOp::Add => "+=",
            AssignOp::Sub => "-=",
            AssignOp::Mul => "*=",
            AssignOp::Div => "/=",
            AssignOp::Mod => "%=",
            AssignOp::Shl => "<<=",
            AssignOp::Shr => ">>=",
            AssignOp::And => "&=",
            AssignOp::Or => "|=",
            AssignOp::Xor => "^=",
        }
    }
}

impl FromStr for AssignOp {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Ok(match s {
            "=" => AssignOp::Assign,
            ":=" => AssignOp::Define,
            "+=" => AssignOp::Add,
            "-=" => AssignOp::Sub,
            "*=" => AssignOp::Mul,
            "/=" => AssignOp::Div,
            "%=" => AssignOp::Mod,
            "<<=" => AssignOp::Shl,
            ">>=" => AssignOp::Shr,
            "&=" => AssignOp::And,
            "|=" => AssignOp::Or,
            "^=" => AssignOp::Xor,
            other => {
                return Err(Error::invalid_assignment(format!(
                    "unknown assignment operator {:?}",
                    other
                )))
            }
        })
    }
}

impl fmt::Display for AssignOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Lowering state for one function body
pub struct Lowering<'a> {
    program: &'a ProgramBuilder,
    opcodes: &'a OpcodeTable,
    package: String,
    location: SourceLoc,
    gensyms: usize,
}

impl<'a> Lowering<'a> {
    /// Creates a lowering context for code in `package`
    pub fn new(program: &'a ProgramBuilder, opcodes: &'a OpcodeTable, package: impl Into<String>) -> Self {
        Lowering {
            program,
            opcodes,
            package: package.into(),
            location: SourceLoc::default(),
            gensyms: 0,
        }
    }

    /// Sets the source location stamped on synthesized nodes
    pub fn at(&mut self, file: impl Into<String>, line: u32) -> &mut Self {
        self.location = SourceLoc::new(file, line);
        self
    }

    /// Package being lowered
    pub fn package(&self) -> &str {
        &self.package
    }

    /// Fresh local name, unique within this lowering context
    pub fn gensym(&mut self) -> String {
        let name = format!("$lcl{}", self.gensyms);
        self.gensyms += 1;
        name
    }

    /// Empty node in this package at the current location
    fn node(&self, operator: Option<Operator>) -> Expression {
        Expression::new(operator)
            .in_package(self.package.clone())
            .at(self.location.clone())
    }

    fn argument(&self, name: impl Into<String>) -> Argument {
        Argument::new(name)
            .in_package(self.package.clone())
            .at(self.location.clone())
    }

    fn native(&self, name: &str) -> Result<Operator> {
        self.opcodes.operator(name)
    }

    /// Value type of `arg`, or `Undefined` when its base type is not known yet
    fn known_type(&self, arg: &Argument) -> Result<TypeKind> {
        if !arg.ty.is_defined() {
            return Ok(TypeKind::Undefined);
        }
        arg.value_type(self.program.structs())
    }

    /// Type a value-producing node yields: the operator's first declared result type,
    /// or, for operators whose result follows their operands, the first input's type.
    pub fn output_type(&self, expr: &Expression) -> Result<TypeKind> {
        let signature = expr
            .operator
            .as_ref()
            .and_then(Operator::signature)
            .ok_or_else(|| {
                Error::invalid_assignment(format!("{} does not produce a value", expr.operator_name()))
            })?;
        let first = signature.outputs.first().ok_or_else(|| {
            Error::invalid_assignment(format!("{} has no result", expr.operator_name()))
        })?;
        if first.ty.is_defined() {
            return Ok(first.ty.clone());
        }
        match expr.inputs.first() {
            Some(input) => self.known_type(input),
            None => Ok(TypeKind::Undefined),
        }
    }
}

/// Target argument of a `to` sequence: the first output of its last node
fn target_of(to: &[Expression]) -> Result<&Argument> {
    to.last()
        .and_then(|expr| expr.outputs.first())
        .ok_or_else(|| Error::invalid_assignment("assignment has no target"))
}
