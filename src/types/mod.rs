//! Type descriptors and compile-time struct layout
//!
//! Types exist only at lowering and IR time; the arena stores untagged bytes whose
//! width is fixed by the [`TypeKind`] used to encode them.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Width of an encoded arena offset (slice, string and pointer handles)
pub const POINTER_SIZE: usize = 4;

/// Declared type of a value
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TypeKind {
    /// Not yet known; in an opcode signature it means "any" (inputs) or
    /// "same as the first input" (outputs)
    Undefined,
    /// Boolean (1 byte)
    Bool,
    /// 8-bit signed integer
    I8,
    /// 16-bit signed integer
    I16,
    /// 32-bit signed integer
    I32,
    /// 64-bit signed integer
    I64,
    /// 8-bit unsigned integer
    U8,
    /// 16-bit unsigned integer
    U16,
    /// 32-bit unsigned integer
    U32,
    /// 64-bit unsigned integer
    U64,
    /// 32-bit float
    F32,
    /// 64-bit float
    F64,
    /// String handle (offset of a length-prefixed byte object)
    Str,
    /// Fixed-size array stored inline
    Array {
        /// Element type
        elem: Box<TypeKind>,
        /// Number of elements
        len: u32,
    },
    /// Slice handle (offset of a length-prefixed element object)
    Slice(Box<TypeKind>),
    /// Pointer handle
    Pointer(Box<TypeKind>),
    /// Named struct, laid out by [`StructTable`]
    Struct(String),
}

impl TypeKind {
    /// Slice of `elem`
    pub fn slice_of(elem: TypeKind) -> Self {
        TypeKind::Slice(Box::new(elem))
    }

    /// Pointer to `inner`
    pub fn pointer_to(inner: TypeKind) -> Self {
        TypeKind::Pointer(Box::new(inner))
    }

    /// Inline array of `len` elements
    pub fn array_of(elem: TypeKind, len: u32) -> Self {
        TypeKind::Array {
            elem: Box::new(elem),
            len,
        }
    }

    /// Size of a value of this type when it does not depend on a struct layout
    pub fn fixed_size(&self) -> Option<usize> {
        match self {
            TypeKind::Bool | TypeKind::I8 | TypeKind::U8 => Some(1),
            TypeKind::I16 | TypeKind::U16 => Some(2),
            TypeKind::I32 | TypeKind::U32 | TypeKind::F32 => Some(4),
            TypeKind::I64 | TypeKind::U64 | TypeKind::F64 => Some(8),
            TypeKind::Str | TypeKind::Slice(_) | TypeKind::Pointer(_) => Some(POINTER_SIZE),
            TypeKind::Array { elem, len } => elem.fixed_size().and_then(|w| w.checked_mul(*len as usize)),
            TypeKind::Struct(_) | TypeKind::Undefined => None,
        }
    }

    /// Size in bytes, resolving struct layouts through `structs`
    pub fn size(&self, structs: &StructTable) -> Result<usize> {
        match self {
            TypeKind::Struct(name) => Ok(structs.get(name)?.size),
            TypeKind::Array { elem, len } => elem
                .size(structs)?
                .checked_mul(*len as usize)
                .ok_or_else(|| Error::InvalidArguments {
                    op: "layout".to_string(),
                    reason: format!("size of {} overflows", self),
                }),
            TypeKind::Undefined => Err(Error::type_mismatch("layout", "a sized type", self)),
            other => other
                .fixed_size()
                .ok_or_else(|| Error::type_mismatch("layout", "a sized type", other)),
        }
    }

    /// Element type of an array or slice
    pub fn element(&self) -> Option<&TypeKind> {
        match self {
            TypeKind::Array { elem, .. } | TypeKind::Slice(elem) => Some(elem),
            _ => None,
        }
    }

    /// True for fixed-width integer types
    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            TypeKind::I8
                | TypeKind::I16
                | TypeKind::I32
                | TypeKind::I64
                | TypeKind::U8
                | TypeKind::U16
                | TypeKind::U32
                | TypeKind::U64
        )
    }

    /// True for f32/f64
    pub fn is_float(&self) -> bool {
        matches!(self, TypeKind::F32 | TypeKind::F64)
    }

    /// True for types encoded directly by the value codec (no layout lookup)
    pub fn is_scalar(&self) -> bool {
        self.is_integer() || self.is_float() || *self == TypeKind::Bool
    }

    /// True for types stored as a 4-byte offset into the arena
    pub fn is_handle(&self) -> bool {
        matches!(
            self,
            TypeKind::Str | TypeKind::Slice(_) | TypeKind::Pointer(_)
        )
    }

    /// True when the type is known
    pub fn is_defined(&self) -> bool {
        *self != TypeKind::Undefined
    }

    /// Parses a type name: `i64`, `str`, `[]i32`, `[4]f64`, `*Item`, `Item`
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        if let Some(rest) = s.strip_prefix("[]") {
            return TypeKind::parse(rest).map(TypeKind::slice_of);
        }
        if let Some(rest) = s.strip_prefix('*') {
            return TypeKind::parse(rest).map(TypeKind::pointer_to);
        }
        if let Some(rest) = s.strip_prefix('[') {
            let (len, elem) = rest.split_once(']')?;
            let len = len.parse().ok()?;
            return TypeKind::parse(elem).map(|e| TypeKind::array_of(e, len));
        }
        let kind = match s {
            "bool" => TypeKind::Bool,
            "i8" => TypeKind::I8,
            "i16" => TypeKind::I16,
            "i32" => TypeKind::I32,
            "i64" => TypeKind::I64,
            "u8" | "byte" => TypeKind::U8,
            "u16" => TypeKind::U16,
            "u32" => TypeKind::U32,
            "u64" => TypeKind::U64,
            "f32" => TypeKind::F32,
            "f64" => TypeKind::F64,
            "str" => TypeKind::Str,
            "" => return None,
            name if name.chars().all(|c| c.is_alphanumeric() || c == '_') => {
                TypeKind::Struct(name.to_string())
            }
            _ => return None,
        };
        Some(kind)
    }
}

impl fmt::Display for TypeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeKind::Undefined => write!(f, "undefined"),
            TypeKind::Bool => write!(f, "bool"),
            TypeKind::I8 => write!(f, "i8"),
            TypeKind::I16 => write!(f, "i16"),
            TypeKind::I32 => write!(f, "i32"),
            TypeKind::I64 => write!(f, "i64"),
            TypeKind::U8 => write!(f, "u8"),
            TypeKind::U16 => write!(f, "u16"),
            TypeKind::U32 => write!(f, "u32"),
            TypeKind::U64 => write!(f, "u64"),
            TypeKind::F32 => write!(f, "f32"),
            TypeKind::F64 => write!(f, "f64"),
            TypeKind::Str => write!(f, "str"),
            TypeKind::Array { elem, len } => write!(f, "[{}]{}", len, elem),
            TypeKind::Slice(elem) => write!(f, "[]{}", elem),
            TypeKind::Pointer(inner) => write!(f, "*{}", inner),
            TypeKind::Struct(name) => write!(f, "{}", name),
        }
    }
}

/// A field in a struct definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructField {
    /// The name of the field
    pub name: String,
    /// The type of the field
    pub ty: TypeKind,
    /// The byte offset of this field from the start of the struct
    pub offset: usize,
}

/// A struct definition (compile-time metadata)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructDef {
    /// The name of the struct
    pub name: String,
    /// The fields in declaration order, with offsets
    pub fields: Vec<StructField>,
    /// The total size of the struct in bytes
    pub size: usize,
}

impl StructDef {
    /// Looks up a field by name
    pub fn field(&self, name: &str) -> Result<&StructField> {
        self.fields
            .iter()
            .find(|f| f.name == name)
            .ok_or_else(|| Error::unresolved(format!("{}.{}", self.name, name)))
    }
}

/// Struct layouts known to a program
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StructTable {
    defs: HashMap<String, StructDef>,
}

impl StructTable {
    /// Creates an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Lays out and registers a struct. Fields are packed in declaration order;
    /// nested struct fields must already be defined. A name can be defined once.
    pub fn define(&mut self, name: &str, fields: &[(&str, TypeKind)]) -> Result<&StructDef> {
        if self.has(name) {
            return Err(Error::InvalidArguments {
                op: "struct definition".to_string(),
                reason: format!("struct {} is already defined", name),
            });
        }
        let mut offset: usize = 0;
        let mut laid_out = Vec::with_capacity(fields.len());
        for (field_name, ty) in fields {
            let size = ty.size(self)?;
            laid_out.push(StructField {
                name: field_name.to_string(),
                ty: ty.clone(),
                offset,
            });
            offset = offset.checked_add(size).ok_or_else(|| Error::InvalidArguments {
                op: "layout".to_string(),
                reason: format!("size of struct {} overflows", name),
            })?;
        }

        let def = StructDef {
            name: name.to_string(),
            fields: laid_out,
            size: offset,
        };
        self.defs.insert(name.to_string(), def);
        self.get(name)
    }

    /// Gets a struct definition by name
    pub fn get(&self, name: &str) -> Result<&StructDef> {
        self.defs
            .get(name)
            .ok_or_else(|| Error::unresolved(format!("struct {}", name)))
    }

    /// Looks up `field` of struct `name`
    pub fn field(&self, name: &str, field: &str) -> Result<&StructField> {
        self.get(name)?.field(field)
    }

    /// Check if a struct exists
    pub fn has(&self, name: &str) -> bool {
        self.defs.contains_key(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_roundtrips_display() {
        for name in ["i64", "[]i32", "[4]f64", "*Item", "[][]u8", "str", "bool"] {
            let ty = TypeKind::parse(name).unwrap();
            assert_eq!(ty.to_string(), name);
        }
        assert_eq!(TypeKind::parse("[x]i32"), None);
    }

    #[test]
    fn test_struct_layout_packs_fields() {
        let mut structs = StructTable::new();
        structs
            .define("Point", &[("x", TypeKind::I32), ("y", TypeKind::I64)])
            .unwrap();
        let def = structs
            .define(
                "Item",
                &[
                    ("flag", TypeKind::Bool),
                    ("pos", TypeKind::Struct("Point".into())),
                    ("tags", TypeKind::slice_of(TypeKind::Str)),
                ],
            )
            .unwrap();

        assert_eq!(def.size, 1 + 12 + POINTER_SIZE);
        assert_eq!(structs.field("Item", "tags").unwrap().offset, 13);
        assert_eq!(
            TypeKind::array_of(TypeKind::Struct("Point".into()), 3)
                .size(&structs)
                .unwrap(),
            36
        );
    }

    #[test]
    fn test_oversized_nested_array_is_rejected() {
        let structs = StructTable::new();
        let inner = TypeKind::array_of(TypeKind::I64, u32::MAX);
        let huge = TypeKind::array_of(TypeKind::array_of(inner, u32::MAX), u32::MAX);

        assert!(matches!(
            huge.size(&structs),
            Err(Error::InvalidArguments { .. })
        ));
        assert_eq!(huge.fixed_size(), None);
    }

    #[test]
    fn test_struct_cannot_be_redefined() {
        let mut structs = StructTable::new();
        structs.define("Point", &[("x", TypeKind::I32)]).unwrap();

        let err = structs
            .define("Point", &[("x", TypeKind::I64), ("y", TypeKind::I64)])
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArguments { .. }));
        assert_eq!(structs.get("Point").unwrap().size, 4);
    }

    #[test]
    fn test_unknown_struct_is_unresolved() {
        let structs = StructTable::new();
        let err = TypeKind::Struct("Ghost".into()).size(&structs).unwrap_err();
        assert!(matches!(err, Error::UnresolvedSymbol { .. }));
    }
}
