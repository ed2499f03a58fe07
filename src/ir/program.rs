//! Functions, programs and the program builder

use std::collections::HashMap;

use super::argument::Argument;
use super::expression::{FunctionRef, Operator, ParamSpec, Signature};
use super::Expression;
use crate::error::{Error, Result};
use crate::memory::codec::{self, Value};
use crate::memory::NIL_GUARD;
use crate::types::{StructDef, StructTable, TypeKind};

/// A laid-out user function
#[derive(Debug, Clone)]
pub struct Function {
    /// Owning package
    pub package: String,
    /// Function name
    pub name: String,
    /// Parameters, bound to frame offsets
    pub params: Vec<Argument>,
    /// Return slots, bound to frame offsets
    pub returns: Vec<Argument>,
    /// Lowered body
    pub body: Vec<Expression>,
    /// Bytes of stack this function's frame occupies
    pub frame_size: usize,
}

impl Function {
    /// Reference to this function
    pub fn reference(&self) -> FunctionRef {
        FunctionRef::new(&self.package, &self.name)
    }

    /// Parameter and return types
    pub fn signature(&self) -> Signature {
        Signature {
            inputs: self.params.iter().map(|p| ParamSpec::of(p.ty.clone())).collect(),
            outputs: self
                .returns
                .iter()
                .map(|r| ParamSpec::of(r.ty.clone()))
                .collect(),
        }
    }
}

/// An executable program: functions, struct layouts and the initial data segment
#[derive(Debug, Clone, Default)]
pub struct Program {
    structs: StructTable,
    data: Vec<u8>,
    globals: HashMap<(String, String), Argument>,
    functions: HashMap<FunctionRef, Function>,
}

impl Program {
    /// Struct layouts
    pub fn structs(&self) -> &StructTable {
        &self.structs
    }

    /// Initial data segment image (globals and literals)
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Looks up a function
    pub fn function(&self, function: &FunctionRef) -> Result<&Function> {
        self.functions
            .get(function)
            .ok_or_else(|| Error::unresolved(function.to_string()))
    }

    /// Looks up a function by package and name
    pub fn lookup(&self, package: &str, name: &str) -> Result<&Function> {
        self.function(&FunctionRef::new(package, name))
    }

    /// Looks up a package global
    pub fn global(&self, package: &str, name: &str) -> Option<&Argument> {
        self.globals.get(&(package.to_string(), name.to_string()))
    }

    /// Number of functions
    pub fn function_count(&self) -> usize {
        self.functions.len()
    }
}

/// Accumulates struct layouts, globals, literals and functions into a [`Program`]
#[derive(Debug, Clone)]
pub struct ProgramBuilder {
    structs: StructTable,
    data: Vec<u8>,
    globals: HashMap<(String, String), Argument>,
    signatures: HashMap<FunctionRef, Signature>,
    functions: HashMap<FunctionRef, Function>,
    literal_count: usize,
}

impl ProgramBuilder {
    /// Creates a builder with an empty data segment (apart from the nil guard)
    pub fn new() -> Self {
        ProgramBuilder {
            structs: StructTable::new(),
            data: vec![0; NIL_GUARD],
            globals: HashMap::new(),
            signatures: HashMap::new(),
            functions: HashMap::new(),
            literal_count: 0,
        }
    }

    /// Struct layouts defined so far
    pub fn structs(&self) -> &StructTable {
        &self.structs
    }

    /// Defines a struct layout
    pub fn define_struct(&mut self, name: &str, fields: &[(&str, TypeKind)]) -> Result<&StructDef> {
        self.structs.define(name, fields)
    }

    /// Reserves a zeroed package global in the data segment
    pub fn global(&mut self, package: &str, name: &str, ty: TypeKind) -> Result<Argument> {
        let size = ty.size(&self.structs)?;
        let offset = self.data.len();
        self.data.resize(offset + size, 0);

        let arg = Argument::new(name)
            .with_type(ty)
            .global(offset)
            .in_package(package)
            .declared();
        self.globals
            .insert((package.to_string(), name.to_string()), arg.clone());
        Ok(arg)
    }

    /// Looks up a package global
    pub fn lookup_global(&self, package: &str, name: &str) -> Option<&Argument> {
        self.globals.get(&(package.to_string(), name.to_string()))
    }

    /// Writes a literal into the data segment and returns a descriptor for it.
    ///
    /// Strings and slices are stored as a heap-style object followed by a handle slot;
    /// the descriptor points at the handle slot.
    pub fn literal(&mut self, value: Value, ty: TypeKind) -> Result<Argument> {
        let name = format!("$lit{}", self.literal_count);
        self.literal_count += 1;

        let bytes = codec::encode(&value, &ty)?;
        let offset = if matches!(ty, TypeKind::Str | TypeKind::Slice(_)) {
            let object = self.data.len();
            self.data.extend_from_slice(&bytes);
            let slot = self.data.len();
            self.data.extend_from_slice(&codec::handle_bytes(object)?);
            slot
        } else {
            let offset = self.data.len();
            self.data.extend_from_slice(&bytes);
            offset
        };

        Ok(Argument::new(name).with_type(ty).global(offset).declared())
    }

    /// Declares a function signature ahead of its body (for recursion and forward calls)
    pub fn declare_function(&mut self, package: &str, name: &str, signature: Signature) {
        self.signatures
            .insert(FunctionRef::new(package, name), signature);
    }

    /// Adds a laid-out function
    pub fn add_function(&mut self, function: Function) {
        let reference = function.reference();
        self.signatures
            .insert(reference.clone(), function.signature());
        self.functions.insert(reference, function);
    }

    /// Operator calling a declared or added function
    pub fn call_operator(&self, package: &str, name: &str) -> Result<Operator> {
        let function = FunctionRef::new(package, name);
        let signature = self
            .signatures
            .get(&function)
            .cloned()
            .ok_or_else(|| Error::unresolved(function.to_string()))?;
        Ok(Operator::Call {
            function,
            signature,
        })
    }

    /// Finishes the program. Every declared function must have a body.
    pub fn build(self) -> Result<Program> {
        if let Some(missing) = self
            .signatures
            .keys()
            .find(|f| !self.functions.contains_key(*f))
        {
            return Err(Error::unresolved(missing.to_string()));
        }

        tracing::debug!(
            functions = self.functions.len(),
            data = self.data.len(),
            "program built"
        );

        Ok(Program {
            structs: self.structs,
            data: self.data,
            globals: self.globals,
            functions: self.functions,
        })
    }
}

impl Default for ProgramBuilder {
    fn default() -> Self {
        Self::new()
    }
}
