//! IR nodes

use std::fmt;

use serde::{Deserialize, Serialize};

use super::argument::{Argument, PassBy};
use crate::error::SourceLoc;
use crate::types::TypeKind;

/// Identifier of a registered native opcode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OpCode(pub u32);

/// Declared shape of one operator parameter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamSpec {
    /// Accepted type; `Undefined` accepts any type (inputs) or copies the type of the
    /// first input (outputs)
    pub ty: TypeKind,
    /// Pass mode
    pub pass_by: PassBy,
    /// Result escapes to the heap
    pub escapes: bool,
    /// Types an untyped input is restricted to; empty accepts every type
    #[serde(default)]
    pub one_of: Vec<TypeKind>,
    /// Input must have the same type as input 0
    #[serde(default)]
    pub same_as_first: bool,
}

impl ParamSpec {
    /// Parameter of type `ty`, passed by value
    pub fn of(ty: TypeKind) -> Self {
        ParamSpec {
            ty,
            pass_by: PassBy::Value,
            escapes: false,
            one_of: Vec::new(),
            same_as_first: false,
        }
    }

    /// Parameter accepting any type
    pub fn any() -> Self {
        Self::of(TypeKind::Undefined)
    }

    /// Input accepting any of `types`
    pub fn one_of(types: Vec<TypeKind>) -> Self {
        ParamSpec {
            one_of: types,
            ..Self::any()
        }
    }

    /// Input whose type must equal the type of input 0
    pub fn same_as_first() -> Self {
        ParamSpec {
            same_as_first: true,
            ..Self::any()
        }
    }

    /// Whether an input of type `ty` satisfies the declared type and type set
    pub fn accepts(&self, ty: &TypeKind) -> bool {
        if self.ty.is_defined() {
            return self.ty == *ty;
        }
        self.one_of.is_empty() || self.one_of.contains(ty)
    }
}

/// Static type signature of an operator
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    /// Input parameters, in order
    pub inputs: Vec<ParamSpec>,
    /// Output parameters, in order
    pub outputs: Vec<ParamSpec>,
}

impl Signature {
    /// Builds a signature from plain input and output types
    pub fn new(inputs: Vec<TypeKind>, outputs: Vec<TypeKind>) -> Self {
        Signature {
            inputs: inputs.into_iter().map(ParamSpec::of).collect(),
            outputs: outputs.into_iter().map(ParamSpec::of).collect(),
        }
    }
}

/// User function named by package and name
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FunctionRef {
    /// Package name
    pub package: String,
    /// Function name
    pub name: String,
}

impl FunctionRef {
    /// Creates a function reference
    pub fn new(package: impl Into<String>, name: impl Into<String>) -> Self {
        FunctionRef {
            package: package.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for FunctionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.package, self.name)
    }
}

/// Operator of an IR node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Operator {
    /// Registered native opcode
    Native {
        /// Registry identifier
        code: OpCode,
        /// Registered name, for diagnostics
        name: String,
        /// Static signature
        signature: Signature,
    },
    /// User-defined function
    Call {
        /// Callee
        function: FunctionRef,
        /// Callee's parameter and return types
        signature: Signature,
    },
    /// Relative branch; takes an optional bool input. The counts are nodes skipped
    /// past the next one, so `0` falls through.
    Jump {
        /// Taken when the condition is true or absent
        then_lines: i32,
        /// Taken when the condition is false
        else_lines: i32,
    },
}

impl Operator {
    /// Signature of native and call operators
    pub fn signature(&self) -> Option<&Signature> {
        match self {
            Operator::Native { signature, .. } | Operator::Call { signature, .. } => {
                Some(signature)
            }
            Operator::Jump { .. } => None,
        }
    }

    /// Display name
    pub fn name(&self) -> String {
        match self {
            Operator::Native { name, .. } => name.clone(),
            Operator::Call { function, .. } => function.to_string(),
            Operator::Jump { .. } => "jmp".to_string(),
        }
    }

    /// True for the native identity move
    pub fn is_identity(&self) -> bool {
        matches!(self, Operator::Native { name, .. } if name == "identity")
    }
}

/// One IR node: an operator applied to input descriptors, writing output descriptors
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expression {
    /// `None` for declarations, literals and bare moves
    pub operator: Option<Operator>,
    /// Input descriptors
    pub inputs: Vec<Argument>,
    /// Output descriptors
    pub outputs: Vec<Argument>,
    /// Package the node was lowered in
    pub package: String,
    /// Source position
    pub location: SourceLoc,
    /// Receiver-style call (`obj.method()`); the receiver travels as an output
    pub is_method_call: bool,
    /// Element initializer of an array literal
    pub is_array_literal: bool,
    /// Field initializer of a struct literal
    pub is_struct_literal: bool,
}

impl Expression {
    /// Creates an empty node with the given operator
    pub fn new(operator: Option<Operator>) -> Self {
        Expression {
            operator,
            inputs: Vec::new(),
            outputs: Vec::new(),
            package: String::new(),
            location: SourceLoc::default(),
            is_method_call: false,
            is_array_literal: false,
            is_struct_literal: false,
        }
    }

    /// Node applying `operator`
    pub fn op(operator: Operator) -> Self {
        Self::new(Some(operator))
    }

    /// Literal or assignment target: no operator, one output
    pub fn value(arg: Argument) -> Self {
        Self::new(None).output(arg)
    }

    /// Declaration of `arg` (zero-initialised on execution)
    pub fn declaration(arg: Argument) -> Self {
        Self::value(arg)
    }

    /// Appends an input
    pub fn input(mut self, arg: Argument) -> Self {
        self.inputs.push(arg);
        self
    }

    /// Appends an output
    pub fn output(mut self, arg: Argument) -> Self {
        self.outputs.push(arg);
        self
    }

    /// Sets the package
    pub fn in_package(mut self, package: impl Into<String>) -> Self {
        self.package = package.into();
        self
    }

    /// Stamps a source location
    pub fn at(mut self, location: SourceLoc) -> Self {
        self.location = location;
        self
    }

    /// Marks a receiver-style call
    pub fn method_call(mut self) -> Self {
        self.is_method_call = true;
        self
    }

    /// Marks an array-literal element initializer
    pub fn array_literal(mut self) -> Self {
        self.is_array_literal = true;
        self
    }

    /// Marks a struct-literal field initializer
    pub fn struct_literal(mut self) -> Self {
        self.is_struct_literal = true;
        self
    }

    /// True for nodes without an operator
    pub fn is_bare(&self) -> bool {
        self.operator.is_none()
    }

    /// Display name of the operator
    pub fn operator_name(&self) -> String {
        self.operator
            .as_ref()
            .map(Operator::name)
            .unwrap_or_else(|| "move".to_string())
    }
}
