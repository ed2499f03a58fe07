//! Argument resolution
//!
//! Turns an [`Argument`] into a concrete arena location for one frame. Resolution is
//! recomputed on every use; nothing here caches an address across operator calls.

use crate::error::{Error, Result};
use crate::ir::{Argument, DerefOp, IndexSource, Storage};
use crate::memory::{codec, Arena, Offset, HEADER_SIZE, NIL};
use crate::types::{StructTable, TypeKind};

/// Resolved address of an argument
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    /// First byte of the value
    pub offset: Offset,
    /// Type of the value at `offset`
    pub ty: TypeKind,
    /// Width of the value in bytes
    pub size: usize,
}

/// Read-only view used to resolve argument descriptors
pub struct Resolver<'a> {
    arena: &'a Arena,
    structs: &'a StructTable,
}

impl<'a> Resolver<'a> {
    /// Creates a resolver over `arena`
    pub fn new(arena: &'a Arena, structs: &'a StructTable) -> Self {
        Resolver { arena, structs }
    }

    /// Resolves `arg` against the frame at `fp`.
    ///
    /// The dereference chain is applied left to right. Index bounds and nil handles
    /// are checked before the location is returned, so a failed resolution never
    /// leads to a read or write.
    pub fn resolve(&self, fp: Offset, arg: &Argument) -> Result<Location> {
        let mut offset = match arg.storage {
            Storage::Local { offset } => fp + offset,
            Storage::Global { offset } => offset,
            Storage::Unassigned => return Err(Error::unresolved(&arg.name)),
        };
        let mut ty = arg.ty.clone();

        for op in &arg.derefs {
            match op {
                DerefOp::Pointer => {
                    let inner = match ty {
                        TypeKind::Pointer(inner) => *inner,
                        other => return Err(Error::type_mismatch("dereference", "a pointer", other)),
                    };
                    offset = self.follow(offset, arg)?;
                    ty = inner;
                }
                DerefOp::Index(source) => {
                    if let TypeKind::Pointer(inner) = ty {
                        offset = self.follow(offset, arg)?;
                        ty = *inner;
                    }
                    let index = self.index(fp, source)?;
                    match ty {
                        TypeKind::Array { elem, len } => {
                            check_index(index, len as usize)?;
                            offset += index as usize * elem.size(self.structs)?;
                            ty = *elem;
                        }
                        TypeKind::Slice(elem) => {
                            let handle = self.arena.read_offset(offset)?;
                            let length = if handle == NIL {
                                0
                            } else {
                                self.arena.read_offset(handle)?
                            };
                            check_index(index, length)?;
                            offset = handle + HEADER_SIZE + index as usize * elem.size(self.structs)?;
                            ty = *elem;
                        }
                        other => {
                            return Err(Error::type_mismatch("index", "an array or slice", other))
                        }
                    }
                }
                DerefOp::Field(field) => {
                    if matches!(&ty, TypeKind::Pointer(inner) if matches!(**inner, TypeKind::Struct(_)))
                    {
                        offset = self.follow(offset, arg)?;
                        if let TypeKind::Pointer(inner) = ty {
                            ty = *inner;
                        }
                    }
                    let name = match &ty {
                        TypeKind::Struct(name) => name,
                        other => {
                            return Err(Error::type_mismatch(
                                format!("field access .{}", field.name),
                                "a struct",
                                other,
                            ))
                        }
                    };
                    let (field_offset, field_ty) = if field.ty.is_defined() {
                        (field.offset, field.ty.clone())
                    } else {
                        let def = self.structs.field(name, &field.name)?;
                        (def.offset, def.ty.clone())
                    };
                    offset += field_offset;
                    ty = field_ty;
                }
            }
        }

        let size = ty.size(self.structs)?;
        Ok(Location { offset, ty, size })
    }

    fn follow(&self, offset: Offset, arg: &Argument) -> Result<Offset> {
        let handle = self.arena.read_offset(offset)?;
        if handle == NIL {
            return Err(Error::NullPointer {
                name: arg.name.clone(),
            });
        }
        Ok(handle)
    }

    fn index(&self, fp: Offset, source: &IndexSource) -> Result<i64> {
        match source {
            IndexSource::Const(index) => Ok(*index),
            IndexSource::Arg(arg) => {
                let location = self.resolve(fp, arg)?;
                if !location.ty.is_integer() {
                    return Err(Error::type_mismatch("index", "an integer", &location.ty));
                }
                let bytes = self.arena.read(location.offset, location.size)?;
                codec::decode(bytes, &location.ty)?
                    .as_i64()
                    .ok_or_else(|| Error::type_mismatch("index", "an integer", &location.ty))
            }
        }
    }
}

fn check_index(index: i64, length: usize) -> Result<()> {
    if index < 0 || index as usize >= length {
        return Err(Error::IndexOutOfRange { index, length });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{heap, Value};

    fn fixture() -> (Arena, StructTable) {
        let mut structs = StructTable::new();
        structs
            .define("Item", &[("x", TypeKind::I32), ("y", TypeKind::I64)])
            .unwrap();
        (Arena::new(64, 256).unwrap(), structs)
    }

    #[test]
    fn test_local_and_global_bases() {
        let (arena, structs) = fixture();
        let resolver = Resolver::new(&arena, &structs);
        let fp = arena.stack_start();

        let local = Argument::new("a").with_type(TypeKind::I64).local(8);
        assert_eq!(resolver.resolve(fp, &local).unwrap().offset, fp + 8);

        let global = Argument::new("g").with_type(TypeKind::I32).global(4);
        let loc = resolver.resolve(fp, &global).unwrap();
        assert_eq!((loc.offset, loc.size), (4, 4));

        assert!(matches!(
            resolver.resolve(fp, &Argument::new("ghost")),
            Err(Error::UnresolvedSymbol { .. })
        ));
    }

    #[test]
    fn test_array_field_chain() {
        let (arena, structs) = fixture();
        let resolver = Resolver::new(&arena, &structs);
        let fp = arena.stack_start();

        let arg = Argument::new("items")
            .with_type(TypeKind::array_of(TypeKind::Struct("Item".into()), 3))
            .local(0)
            .index(2)
            .field("y");
        let loc = resolver.resolve(fp, &arg).unwrap();
        assert_eq!(loc.offset, fp + 2 * 12 + 4);
        assert_eq!(loc.ty, TypeKind::I64);

        let past_end = Argument::new("items")
            .with_type(TypeKind::array_of(TypeKind::I32, 3))
            .local(0)
            .index(3);
        assert_eq!(
            resolver.resolve(fp, &past_end).unwrap_err(),
            Error::IndexOutOfRange {
                index: 3,
                length: 3
            }
        );
    }

    #[test]
    fn test_slice_index_through_handle() {
        let (mut arena, structs) = fixture();
        let fp = arena.stack_start();
        let ty = TypeKind::slice_of(TypeKind::I32);
        let handle = heap::write_object(
            &mut arena,
            &Value::Slice(vec![Value::I32(5), Value::I32(6)]),
            &ty,
        )
        .unwrap();
        arena.write_offset(fp, handle).unwrap();
        arena.write(fp + 4, &1i64.to_le_bytes()).unwrap();

        let resolver = Resolver::new(&arena, &structs);
        let idx = Argument::new("i").with_type(TypeKind::I64).local(4);
        let arg = Argument::new("s").with_type(ty).local(0).index_by(idx);
        let loc = resolver.resolve(fp, &arg).unwrap();
        assert_eq!(loc.offset, handle + HEADER_SIZE + 4);
        assert_eq!(arena.read(loc.offset, 4).unwrap(), &6i32.to_le_bytes());
    }

    #[test]
    fn test_nil_pointer_field() {
        let (arena, structs) = fixture();
        let resolver = Resolver::new(&arena, &structs);
        let arg = Argument::new("p")
            .with_type(TypeKind::pointer_to(TypeKind::Struct("Item".into())))
            .local(0)
            .field("x");
        assert_eq!(
            resolver.resolve(arena.stack_start(), &arg).unwrap_err(),
            Error::NullPointer { name: "p".into() }
        );
    }
}
