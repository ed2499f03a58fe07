//! Argument descriptors
//!
//! An [`Argument`] describes how to find a value: a base location (frame-local or
//! global), the declared type at that base, and a chain of dereference operations
//! applied left to right. Descriptors are built once by lowering with the consuming
//! builder methods below; the resolver only ever reads them.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result, SourceLoc};
use crate::types::{StructTable, TypeKind};

/// Where the base of an argument lives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Storage {
    /// Not yet bound by the function layout pass
    #[default]
    Unassigned,
    /// Offset from the frame pointer
    Local {
        /// Byte offset inside the frame
        offset: usize,
    },
    /// Absolute offset in the data segment
    Global {
        /// Arena offset
        offset: usize,
    },
}

/// How an input is handed to its operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PassBy {
    /// The operator receives the decoded value
    #[default]
    Value,
    /// The operator receives the resolved address as a pointer
    Reference,
}

/// Source of an array/slice index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum IndexSource {
    /// Index known at lowering time
    Const(i64),
    /// Index read from another argument at evaluation time
    Arg(Box<Argument>),
}

/// Field access, linked to the struct layout by the function layout pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldRef {
    /// Field name
    pub name: String,
    /// Byte offset inside the struct (valid once `ty` is defined)
    pub offset: usize,
    /// Field type (`Undefined` until linked)
    pub ty: TypeKind,
}

impl FieldRef {
    /// Unlinked reference to `name`
    pub fn named(name: impl Into<String>) -> Self {
        FieldRef {
            name: name.into(),
            offset: 0,
            ty: TypeKind::Undefined,
        }
    }
}

/// One step of a dereference chain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DerefOp {
    /// Read the 4-byte handle at the current location and move there
    Pointer,
    /// Advance to an array or slice element
    Index(IndexSource),
    /// Advance to a struct field
    Field(FieldRef),
}

/// Compile-time description of how to locate a value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Argument {
    /// Symbol name
    pub name: String,
    /// Declared type of the base symbol
    pub ty: TypeKind,
    /// Base location
    pub storage: Storage,
    /// Dereference chain, applied in order
    pub derefs: Vec<DerefOp>,
    /// How the value is passed when used as an input
    pub pass_by: PassBy,
    /// Declared pointer whose pointee is heap allocated on declaration
    pub escapes: bool,
    /// Marks the outermost expression of `&T{...}`
    pub decl_pointer: bool,
    /// Struct name a struct-literal field output belongs to
    pub custom_type: Option<String>,
    /// Already declared; later lookups must not redeclare it
    pub previously_declared: bool,
    /// Declared with `:=`
    pub is_short_declaration: bool,
    /// Where the argument appeared
    pub location: SourceLoc,
    /// Package the symbol belongs to
    pub package: String,
}

impl Argument {
    /// Creates an untyped, unbound argument
    pub fn new(name: impl Into<String>) -> Self {
        Argument {
            name: name.into(),
            ty: TypeKind::Undefined,
            storage: Storage::Unassigned,
            derefs: Vec::new(),
            pass_by: PassBy::Value,
            escapes: false,
            decl_pointer: false,
            custom_type: None,
            previously_declared: false,
            is_short_declaration: false,
            location: SourceLoc::default(),
            package: String::new(),
        }
    }

    /// Sets the declared type
    pub fn with_type(mut self, ty: TypeKind) -> Self {
        self.ty = ty;
        self
    }

    /// Binds the argument to a frame offset
    pub fn local(mut self, offset: usize) -> Self {
        self.storage = Storage::Local { offset };
        self
    }

    /// Binds the argument to a data-segment offset
    pub fn global(mut self, offset: usize) -> Self {
        self.storage = Storage::Global { offset };
        self
    }

    /// Appends a dereference step
    pub fn deref(mut self, op: DerefOp) -> Self {
        self.derefs.push(op);
        self
    }

    /// Appends a field access
    pub fn field(self, name: impl Into<String>) -> Self {
        self.deref(DerefOp::Field(FieldRef::named(name)))
    }

    /// Appends a constant index
    pub fn index(self, index: i64) -> Self {
        self.deref(DerefOp::Index(IndexSource::Const(index)))
    }

    /// Appends an index read from `arg`
    pub fn index_by(self, arg: Argument) -> Self {
        self.deref(DerefOp::Index(IndexSource::Arg(Box::new(arg))))
    }

    /// Passes the argument by reference
    pub fn by_reference(mut self) -> Self {
        self.pass_by = PassBy::Reference;
        self
    }

    /// Marks a pointer whose pointee escapes to the heap
    pub fn escaping(mut self) -> Self {
        self.escapes = true;
        self
    }

    /// Marks the outermost output of a `&T{...}` literal
    pub fn pointer_decl(mut self) -> Self {
        self.decl_pointer = true;
        self
    }

    /// Marks a struct-literal field output of struct `name`
    pub fn field_of(mut self, name: impl Into<String>) -> Self {
        self.custom_type = Some(name.into());
        self
    }

    /// Marks the argument as already declared
    pub fn declared(mut self) -> Self {
        self.previously_declared = true;
        self
    }

    /// Stamps a source location
    pub fn at(mut self, location: SourceLoc) -> Self {
        self.location = location;
        self
    }

    /// Sets the owning package
    pub fn in_package(mut self, package: impl Into<String>) -> Self {
        self.package = package.into();
        self
    }

    /// True when the argument names a symbol directly, with no dereference chain
    pub fn is_plain(&self) -> bool {
        self.derefs.is_empty()
    }

    /// Type of the value after applying the dereference chain
    pub fn value_type(&self, structs: &StructTable) -> Result<TypeKind> {
        let mut ty = self.ty.clone();
        for op in &self.derefs {
            ty = step_type(&ty, op, structs)?;
        }
        Ok(ty)
    }
}

/// Type reached by applying `op` to a value of type `ty`.
/// Slices, pointers to arrays and pointers to structs are followed implicitly.
pub fn step_type(ty: &TypeKind, op: &DerefOp, structs: &StructTable) -> Result<TypeKind> {
    match (op, ty) {
        (DerefOp::Pointer, TypeKind::Pointer(inner)) => Ok((**inner).clone()),
        (DerefOp::Index(_), TypeKind::Array { elem, .. } | TypeKind::Slice(elem)) => {
            Ok((**elem).clone())
        }
        (DerefOp::Index(_), TypeKind::Pointer(inner)) if inner.element().is_some() => {
            step_type(inner, op, structs)
        }
        (DerefOp::Field(field), TypeKind::Struct(name)) => {
            Ok(structs.field(name, &field.name)?.ty.clone())
        }
        (DerefOp::Field(_), TypeKind::Pointer(inner)) if matches!(**inner, TypeKind::Struct(_)) => {
            step_type(inner, op, structs)
        }
        (DerefOp::Pointer, other) => Err(Error::type_mismatch("dereference", "a pointer", other)),
        (DerefOp::Index(_), other) => {
            Err(Error::type_mismatch("index", "an array or slice", other))
        }
        (DerefOp::Field(field), other) => Err(Error::type_mismatch(
            format!("field access .{}", field.name),
            "a struct",
            other,
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_chain() {
        let arg = Argument::new("items")
            .with_type(TypeKind::slice_of(TypeKind::Struct("Item".into())))
            .local(16)
            .index(2)
            .field("x")
            .in_package("main");

        assert_eq!(arg.storage, Storage::Local { offset: 16 });
        assert_eq!(arg.derefs.len(), 2);
        assert!(!arg.is_plain());
        assert_eq!(arg.package, "main");
    }

    #[test]
    fn test_value_type_follows_chain() {
        let mut structs = StructTable::new();
        structs
            .define("Item", &[("x", TypeKind::I32), ("tags", TypeKind::slice_of(TypeKind::Str))])
            .unwrap();

        let arg = Argument::new("p")
            .with_type(TypeKind::pointer_to(TypeKind::Struct("Item".into())))
            .field("tags")
            .index(0);
        assert_eq!(arg.value_type(&structs).unwrap(), TypeKind::Str);

        let bad = Argument::new("n").with_type(TypeKind::I64).field("x");
        assert!(matches!(
            bad.value_type(&structs),
            Err(Error::TypeMismatch { .. })
        ));
    }
}
