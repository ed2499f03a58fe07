//! Operator execution context
//!
//! An [`OpContext`] is handed to every native operator. Inputs are resolved and decoded
//! on demand. Outputs given to [`OpContext::assign_output`] are staged and only written
//! by [`OpContext::commit`], after the operator has returned successfully, so a failing
//! operator leaves its outputs untouched.

use rand::rngs::StdRng;

use crate::error::{Error, Result};
use crate::ir::{Argument, Expression, PassBy};
use crate::memory::{codec, heap, Arena, Offset, Value};
use crate::types::{StructTable, TypeKind, POINTER_SIZE};
use crate::vm::resolver::{Location, Resolver};

/// Rust scalar types that map one-to-one onto a [`Value`] variant
pub trait Scalar: Sized + Copy {
    /// Type descriptor of this scalar
    fn kind() -> TypeKind;
    /// Extracts the scalar from a value of the matching variant
    fn from_value(value: &Value) -> Option<Self>;
    /// Wraps the scalar in a value
    fn into_value(self) -> Value;
}

macro_rules! impl_scalar {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl Scalar for $ty {
                fn kind() -> TypeKind {
                    TypeKind::$variant
                }

                fn from_value(value: &Value) -> Option<Self> {
                    match value {
                        Value::$variant(v) => Some(*v),
                        _ => None,
                    }
                }

                fn into_value(self) -> Value {
                    Value::$variant(self)
                }
            }
        )*
    };
}

impl_scalar! {
    bool => Bool,
    i8 => I8,
    i16 => I16,
    i32 => I32,
    i64 => I64,
    u8 => U8,
    u16 => U16,
    u32 => U32,
    u64 => U64,
    f32 => F32,
    f64 => F64,
}

enum Staged {
    Value(Value),
    Bytes(Vec<u8>),
}

/// Execution context of one native node
pub struct OpContext<'a> {
    arena: &'a mut Arena,
    structs: &'a StructTable,
    rng: &'a mut StdRng,
    fp: Offset,
    expr: &'a Expression,
    staged: Vec<Option<Staged>>,
}

impl<'a> OpContext<'a> {
    /// Creates a context for executing `expr` in the frame at `fp`
    pub fn new(
        arena: &'a mut Arena,
        structs: &'a StructTable,
        rng: &'a mut StdRng,
        fp: Offset,
        expr: &'a Expression,
    ) -> Self {
        OpContext {
            arena,
            structs,
            rng,
            fp,
            expr,
            staged: (0..expr.outputs.len()).map(|_| None).collect(),
        }
    }

    /// Name of the executing operator
    pub fn name(&self) -> String {
        self.expr.operator_name()
    }

    /// Package of the executing node
    pub fn package(&self) -> &str {
        &self.expr.package
    }

    /// Number of inputs
    pub fn input_count(&self) -> usize {
        self.expr.inputs.len()
    }

    /// The VM's random generator
    pub fn rng(&mut self) -> &mut StdRng {
        &mut *self.rng
    }

    /// Direct arena access for operators that work on heap objects in place
    pub fn arena_mut(&mut self) -> &mut Arena {
        &mut *self.arena
    }

    /// Reads raw arena bytes
    pub fn read_raw(&self, offset: Offset, width: usize) -> Result<Vec<u8>> {
        Ok(self.arena.read(offset, width)?.to_vec())
    }

    /// Writes raw arena bytes immediately (not staged)
    pub fn write_raw(&mut self, offset: Offset, bytes: &[u8]) -> Result<()> {
        self.arena.write(offset, bytes)
    }

    fn argument(&self, i: usize) -> Result<&'a Argument> {
        let expr: &'a Expression = self.expr;
        expr.inputs.get(i).ok_or_else(|| Error::InvalidArguments {
            op: expr.operator_name(),
            reason: format!("missing input {}", i),
        })
    }

    /// Resolves input `i`
    pub fn locate_input(&self, i: usize) -> Result<Location> {
        let arg = self.argument(i)?;
        Resolver::new(&*self.arena, self.structs).resolve(self.fp, arg)
    }

    /// Type of input `i` as seen by the operator (a pointer for by-reference inputs)
    pub fn input_type(&self, i: usize) -> Result<TypeKind> {
        let arg = self.argument(i)?;
        let location = self.locate_input(i)?;
        Ok(match arg.pass_by {
            PassBy::Reference => TypeKind::pointer_to(location.ty),
            PassBy::Value => location.ty,
        })
    }

    /// Raw bytes of input `i` (the encoded handle for by-reference inputs)
    pub fn input_bytes(&self, i: usize) -> Result<Vec<u8>> {
        let arg = self.argument(i)?;
        let location = self.locate_input(i)?;
        match arg.pass_by {
            PassBy::Reference => Ok(codec::handle_bytes(location.offset)?.to_vec()),
            PassBy::Value => self.read_raw(location.offset, location.size),
        }
    }

    /// Handle stored in input `i` (strings, slices and pointers)
    pub fn input_handle(&self, i: usize) -> Result<Offset> {
        let ty = self.input_type(i)?;
        if !ty.is_handle() {
            return Err(Error::type_mismatch(self.name(), "a handle type", ty));
        }
        let bytes = self.input_bytes(i)?;
        match codec::decode(&bytes, &TypeKind::pointer_to(TypeKind::Undefined))? {
            Value::Ptr(offset) => Ok(offset),
            other => Err(Error::type_mismatch(self.name(), "a handle", other.type_name())),
        }
    }

    /// Decoded value of input `i`
    pub fn input(&self, i: usize) -> Result<Value> {
        let arg = self.argument(i)?;
        let location = self.locate_input(i)?;
        if arg.pass_by == PassBy::Reference {
            return Ok(Value::Ptr(location.offset));
        }
        match &location.ty {
            TypeKind::Str | TypeKind::Slice(_) => {
                let handle = self.arena.read_offset(location.offset)?;
                heap::read_object(&*self.arena, handle, &location.ty)
            }
            ty if ty.is_scalar() || ty.is_handle() => {
                codec::decode(self.arena.read(location.offset, location.size)?, ty)
            }
            other => Err(Error::type_mismatch(self.name(), "a scalar, string or slice", other)),
        }
    }

    /// Input `i` as the Rust scalar `T`
    pub fn get<T: Scalar>(&self, i: usize) -> Result<T> {
        let value = self.input(i)?;
        T::from_value(&value).ok_or_else(|| Error::type_mismatch(self.name(), T::kind(), value.type_name()))
    }

    /// Input `i` as an i32
    pub fn i32(&self, i: usize) -> Result<i32> {
        self.get(i)
    }

    /// Input `i` as an i64
    pub fn i64(&self, i: usize) -> Result<i64> {
        self.get(i)
    }

    /// Input `i` as an f64
    pub fn f64(&self, i: usize) -> Result<f64> {
        self.get(i)
    }

    /// Input `i` as a bool
    pub fn bool(&self, i: usize) -> Result<bool> {
        self.get(i)
    }

    /// Input `i` as a string
    pub fn str(&self, i: usize) -> Result<String> {
        match self.input(i)? {
            Value::Str(s) => Ok(s),
            other => Err(Error::type_mismatch(self.name(), "str", other.type_name())),
        }
    }

    /// Input `i` as slice elements
    pub fn slice(&self, i: usize) -> Result<Vec<Value>> {
        match self.input(i)? {
            Value::Slice(items) => Ok(items),
            other => Err(Error::type_mismatch(self.name(), "a slice", other.type_name())),
        }
    }

    fn stage(&mut self, i: usize, staged: Staged) -> Result<()> {
        let name = self.name();
        let slot = self.staged.get_mut(i).ok_or_else(|| Error::InvalidArguments {
            op: name,
            reason: format!("missing output {}", i),
        })?;
        *slot = Some(staged);
        Ok(())
    }

    /// Stages `value` for output `i`. Strings and slices become new heap objects.
    pub fn assign_output(&mut self, i: usize, value: Value) -> Result<()> {
        self.stage(i, Staged::Value(value))
    }

    /// Stages an element or byte count as an `i32` for output `i`
    pub fn assign_length(&mut self, i: usize, length: usize) -> Result<()> {
        let length = i32::try_from(length).map_err(|_| Error::InvalidArguments {
            op: self.name(),
            reason: format!("length {} does not fit in i32", length),
        })?;
        self.assign_output(i, Value::I32(length))
    }

    /// Stages raw bytes for output `i`; their length must match the output's width
    pub fn assign_bytes(&mut self, i: usize, bytes: Vec<u8>) -> Result<()> {
        self.stage(i, Staged::Bytes(bytes))
    }

    /// Stages a handle for output `i`
    pub fn assign_handle(&mut self, i: usize, handle: Offset) -> Result<()> {
        self.assign_bytes(i, codec::handle_bytes(handle)?.to_vec())
    }

    /// Writes every staged output.
    ///
    /// Outputs are resolved again here, after the operator ran, and everything is encoded
    /// and checked before the first byte is written.
    pub fn commit(self) -> Result<()> {
        let OpContext {
            arena,
            structs,
            fp,
            expr,
            staged,
            ..
        } = self;

        enum Pending {
            Bytes(Offset, Vec<u8>),
            Object(Offset, Vec<u8>),
        }

        let mut pending = Vec::with_capacity(staged.len());
        {
            let resolver = Resolver::new(&*arena, structs);
            for (arg, staged) in expr.outputs.iter().zip(staged) {
                let Some(staged) = staged else { continue };
                let location = resolver.resolve(fp, arg)?;
                let item = match staged {
                    Staged::Bytes(bytes) => Pending::Bytes(location.offset, bytes),
                    Staged::Value(value) => match (&value, &location.ty) {
                        (Value::Str(_) | Value::Slice(_), TypeKind::Str | TypeKind::Slice(_)) => {
                            Pending::Object(location.offset, codec::encode(&value, &location.ty)?)
                        }
                        _ => Pending::Bytes(location.offset, codec::encode(&value, &location.ty)?),
                    },
                };
                let width = match &item {
                    Pending::Bytes(_, bytes) => bytes.len(),
                    Pending::Object(..) => POINTER_SIZE,
                };
                if width != location.size {
                    return Err(Error::type_mismatch(
                        expr.operator_name(),
                        format!("{} bytes for {}", location.size, location.ty),
                        width,
                    ));
                }
                pending.push(item);
            }
        }

        let mut writes = Vec::with_capacity(pending.len());
        for item in pending {
            match item {
                Pending::Bytes(offset, bytes) => writes.push((offset, bytes)),
                Pending::Object(offset, bytes) => {
                    let handle = arena.allocate(bytes.len())?;
                    arena.write(handle, &bytes)?;
                    writes.push((offset, codec::handle_bytes(handle)?.to_vec()));
                }
            }
        }
        for (offset, bytes) in writes {
            arena.write(offset, &bytes)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::opcodes::OpcodeTable;
    use rand::SeedableRng;

    #[test]
    fn test_lengths_beyond_i32_are_refused() {
        let mut arena = Arena::new(64, 64).unwrap();
        let structs = StructTable::new();
        let mut rng = StdRng::seed_from_u64(1);
        let expr = Expression::op(OpcodeTable::new().operator("[]i64.len").unwrap())
            .output(Argument::new("n").with_type(TypeKind::I32));
        let mut ctx = OpContext::new(&mut arena, &structs, &mut rng, 0, &expr);

        assert!(ctx.assign_length(0, 3).is_ok());
        assert!(matches!(
            ctx.assign_length(0, i32::MAX as usize + 1),
            Err(Error::InvalidArguments { .. })
        ));
    }
}
