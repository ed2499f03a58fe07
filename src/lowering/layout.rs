//! Function layout
//!
//! [`FunctionBuilder`] turns a lowered body into a [`Function`]: every argument name is
//! bound to a parameter, return slot, local or package global; locals get frame offsets
//! in first-declaration order; field references are linked to their struct layouts; and
//! every node is checked against its operator's static signature.

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::ir::{
    step_type, Argument, DerefOp, Expression, Function, IndexSource, Operator, PassBy, ProgramBuilder,
    Signature, Storage,
};
use crate::types::{StructTable, TypeKind};

#[derive(Debug, Clone)]
struct Slot {
    offset: usize,
    ty: TypeKind,
}

/// Builds one function's frame layout and checks its body
#[derive(Debug, Clone)]
pub struct FunctionBuilder {
    package: String,
    name: String,
    params: Vec<(String, TypeKind)>,
    returns: Vec<(String, TypeKind)>,
    locals: Vec<(String, TypeKind)>,
    body: Vec<Expression>,
}

impl FunctionBuilder {
    /// Starts a function `package.name`
    pub fn new(package: impl Into<String>, name: impl Into<String>) -> Self {
        FunctionBuilder {
            package: package.into(),
            name: name.into(),
            params: Vec::new(),
            returns: Vec::new(),
            locals: Vec::new(),
            body: Vec::new(),
        }
    }

    /// Adds a parameter
    pub fn param(mut self, name: impl Into<String>, ty: TypeKind) -> Self {
        self.params.push((name.into(), ty));
        self
    }

    /// Adds a named return slot
    pub fn returns(mut self, name: impl Into<String>, ty: TypeKind) -> Self {
        self.returns.push((name.into(), ty));
        self
    }

    /// Declares a local up front (locals declared by declaration nodes need not be listed)
    pub fn local(mut self, name: impl Into<String>, ty: TypeKind) -> Self {
        self.locals.push((name.into(), ty));
        self
    }

    /// Appends a node
    pub fn push(&mut self, expr: Expression) {
        self.body.push(expr);
    }

    /// Appends lowered nodes
    pub fn extend(&mut self, exprs: impl IntoIterator<Item = Expression>) {
        self.body.extend(exprs);
    }

    /// Number of nodes so far
    pub fn len(&self) -> usize {
        self.body.len()
    }

    /// Is the body empty?
    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }

    /// Parameter and return types, for forward declarations
    pub fn signature(&self) -> Signature {
        Signature::new(
            self.params.iter().map(|(_, ty)| ty.clone()).collect(),
            self.returns.iter().map(|(_, ty)| ty.clone()).collect(),
        )
    }

    /// Lays out the frame, binds and links every argument, and type-checks the body
    pub fn build(self, program: &ProgramBuilder) -> Result<Function> {
        let structs = program.structs();
        let mut layout = Layout {
            package: &self.package,
            program,
            structs,
            symbols: HashMap::new(),
            size: 0,
        };

        let params = layout.slots(&self.params)?;
        let returns = layout.slots(&self.returns)?;
        for (name, ty) in &self.locals {
            layout.declare(name, ty)?;
        }

        for expr in &self.body {
            if expr.is_bare() && expr.inputs.is_empty() {
                for output in &expr.outputs {
                    if output.is_plain() && output.storage == Storage::Unassigned {
                        layout.declare(&output.name, &output.ty)?;
                    }
                }
            }
        }

        let mut body = self.body;
        let len = body.len();
        for (pc, expr) in body.iter_mut().enumerate() {
            if expr.package.is_empty() {
                expr.package = self.package.clone();
            }
            let location = expr.location.clone();
            layout
                .bind_node(expr)
                .and_then(|_| layout.check_node(expr, pc, len))
                .map_err(|e| e.at(&location))?;
        }

        tracing::debug!(
            function = %format!("{}.{}", self.package, self.name),
            nodes = len,
            frame_size = layout.size,
            "function laid out"
        );

        Ok(Function {
            package: self.package.clone(),
            name: self.name.clone(),
            params,
            returns,
            body,
            frame_size: layout.size,
        })
    }
}

struct Layout<'a> {
    package: &'a str,
    program: &'a ProgramBuilder,
    structs: &'a StructTable,
    symbols: HashMap<String, Slot>,
    size: usize,
}

impl Layout<'_> {
    /// Reserves a frame slot for `name`. Redeclaring with the same type reuses the slot.
    fn declare(&mut self, name: &str, ty: &TypeKind) -> Result<usize> {
        if !ty.is_defined() {
            return Err(Error::type_mismatch(
                format!("declaration of {}", name),
                "a concrete type",
                ty,
            ));
        }
        if let Some(slot) = self.symbols.get(name) {
            if &slot.ty != ty {
                return Err(Error::type_mismatch(
                    format!("redeclaration of {}", name),
                    &slot.ty,
                    ty,
                ));
            }
            return Ok(slot.offset);
        }

        let offset = self.size;
        self.size += ty.size(self.structs)?;
        self.symbols.insert(
            name.to_string(),
            Slot {
                offset,
                ty: ty.clone(),
            },
        );
        Ok(offset)
    }

    fn slots(&mut self, list: &[(String, TypeKind)]) -> Result<Vec<Argument>> {
        list.iter()
            .map(|(name, ty)| {
                let offset = self.declare(name, ty)?;
                Ok(Argument::new(name.clone())
                    .with_type(ty.clone())
                    .local(offset)
                    .in_package(self.package)
                    .declared())
            })
            .collect()
    }

    fn bind_node(&self, expr: &mut Expression) -> Result<()> {
        for arg in expr.inputs.iter_mut().chain(expr.outputs.iter_mut()) {
            self.bind(arg)?;
        }
        Ok(())
    }

    fn bind(&self, arg: &mut Argument) -> Result<()> {
        if arg.storage == Storage::Unassigned {
            let (storage, ty) = if let Some(slot) = self.symbols.get(&arg.name) {
                (Storage::Local { offset: slot.offset }, slot.ty.clone())
            } else {
                let package = if arg.package.is_empty() {
                    self.package
                } else {
                    arg.package.as_str()
                };
                let global = self
                    .program
                    .lookup_global(package, &arg.name)
                    .ok_or_else(|| Error::unresolved(arg.name.clone()))?;
                (global.storage, global.ty.clone())
            };

            if arg.ty.is_defined() && arg.ty != ty {
                return Err(Error::type_mismatch(format!("use of {}", arg.name), &ty, &arg.ty));
            }
            arg.storage = storage;
            arg.ty = ty;
        }
        if arg.package.is_empty() {
            arg.package = self.package.to_string();
        }

        self.link(arg)
    }

    /// Fills field offsets and types along the dereference chain and binds dynamic indexes
    fn link(&self, arg: &mut Argument) -> Result<()> {
        let mut ty = arg.ty.clone();
        for op in arg.derefs.iter_mut() {
            match op {
                DerefOp::Field(field) => {
                    let name = match &ty {
                        TypeKind::Struct(name) => name.clone(),
                        TypeKind::Pointer(inner) => match inner.as_ref() {
                            TypeKind::Struct(name) => name.clone(),
                            other => {
                                return Err(Error::type_mismatch(
                                    format!("field access .{}", field.name),
                                    "a struct",
                                    other,
                                ))
                            }
                        },
                        other => {
                            return Err(Error::type_mismatch(
                                format!("field access .{}", field.name),
                                "a struct",
                                other,
                            ))
                        }
                    };
                    let def = self.structs.field(&name, &field.name)?;
                    field.offset = def.offset;
                    field.ty = def.ty.clone();
                }
                DerefOp::Index(IndexSource::Arg(index)) => {
                    self.bind(index)?;
                    let index_ty = index.value_type(self.structs)?;
                    if !index_ty.is_integer() {
                        return Err(Error::type_mismatch("index", "an integer", index_ty));
                    }
                }
                DerefOp::Index(IndexSource::Const(_)) | DerefOp::Pointer => {}
            }
            ty = step_type(&ty, op, self.structs)?;
        }
        Ok(())
    }

    /// Type an input presents to its operator
    fn input_type(&self, arg: &Argument) -> Result<TypeKind> {
        let ty = arg.value_type(self.structs)?;
        Ok(match arg.pass_by {
            PassBy::Reference => TypeKind::pointer_to(ty),
            PassBy::Value => ty,
        })
    }

    fn check_node(&self, expr: &Expression, pc: usize, len: usize) -> Result<()> {
        match &expr.operator {
            None => self.check_bare(expr),
            Some(Operator::Jump {
                then_lines,
                else_lines,
            }) => {
                match expr.inputs.as_slice() {
                    [] => {}
                    [condition] => {
                        let ty = self.input_type(condition)?;
                        if ty != TypeKind::Bool {
                            return Err(Error::type_mismatch("jmp", TypeKind::Bool, ty));
                        }
                    }
                    _ => {
                        return Err(Error::InvalidArguments {
                            op: "jmp".to_string(),
                            reason: format!("expected at most 1 input, got {}", expr.inputs.len()),
                        })
                    }
                }
                for lines in [*then_lines, *else_lines] {
                    let target = pc as i64 + 1 + lines as i64;
                    if target < 0 || target > len as i64 {
                        return Err(Error::InvalidArguments {
                            op: "jmp".to_string(),
                            reason: format!("target {} outside body of {} nodes", target, len),
                        });
                    }
                }
                Ok(())
            }
            Some(op @ Operator::Native { signature, .. }) => {
                if expr.outputs.len() != signature.outputs.len() {
                    return Err(arity(op, "outputs", signature.outputs.len(), expr.outputs.len()));
                }
                self.check_signature(op, signature, expr)
            }
            Some(op @ Operator::Call { signature, .. }) => {
                if expr.outputs.len() > signature.outputs.len() {
                    return Err(arity(op, "outputs", signature.outputs.len(), expr.outputs.len()));
                }
                self.check_signature(op, signature, expr)
            }
        }
    }

    fn check_signature(&self, op: &Operator, signature: &Signature, expr: &Expression) -> Result<()> {
        if expr.inputs.len() != signature.inputs.len() {
            return Err(arity(op, "inputs", signature.inputs.len(), expr.inputs.len()));
        }

        let mut input_types = Vec::with_capacity(expr.inputs.len());
        for (i, (arg, spec)) in expr.inputs.iter().zip(&signature.inputs).enumerate() {
            let ty = self.input_type(arg)?;
            let context = || format!("{} input {}", op.name(), i);
            if !spec.accepts(&ty) {
                let expected = if spec.ty.is_defined() {
                    spec.ty.to_string()
                } else {
                    let names: Vec<String> = spec.one_of.iter().map(|t| t.to_string()).collect();
                    format!("one of {}", names.join(", "))
                };
                return Err(Error::type_mismatch(context(), expected, ty));
            }
            if spec.same_as_first {
                if let Some(first) = input_types.first() {
                    if *first != ty {
                        return Err(Error::type_mismatch(context(), first, ty));
                    }
                }
            }
            input_types.push(ty);
        }

        for (i, (arg, spec)) in expr.outputs.iter().zip(&signature.outputs).enumerate() {
            let expected = if spec.ty.is_defined() {
                spec.ty.clone()
            } else if let Some(first) = input_types.first() {
                first.clone()
            } else {
                continue;
            };
            let ty = arg.value_type(self.structs)?;
            if ty != expected {
                return Err(Error::type_mismatch(
                    format!("{} output {}", op.name(), i),
                    expected,
                    ty,
                ));
            }
        }
        Ok(())
    }

    fn check_bare(&self, expr: &Expression) -> Result<()> {
        if expr.inputs.is_empty() {
            return Ok(());
        }
        match (expr.inputs.as_slice(), expr.outputs.as_slice()) {
            ([input], [output]) => {
                let from = self.input_type(input)?;
                let to = output.value_type(self.structs)?;
                if from != to {
                    return Err(Error::type_mismatch("move", to, from));
                }
                Ok(())
            }
            _ => Err(Error::InvalidArguments {
                op: "move".to_string(),
                reason: format!(
                    "{} inputs and {} outputs",
                    expr.inputs.len(),
                    expr.outputs.len()
                ),
            }),
        }
    }
}

fn arity(op: &Operator, what: &str, expected: usize, got: usize) -> Error {
    Error::InvalidArguments {
        op: op.name(),
        reason: format!("expected {} {}, got {}", expected, what, got),
    }
}
