//! Slice operators, registered per element type as `[]T.<op>`
//!
//! The bodies are element-type agnostic: they read the element width from the resolved
//! type of the first input and move encoded elements as bytes. `append` and `concat`
//! always return a freshly allocated slice; `copy` and `write` mutate in place and
//! never grow the destination.

use super::{OpContext, OpcodeTable};
use crate::error::{Error, Result};
use crate::ir::Signature;
use crate::memory::{codec, heap};
use crate::types::TypeKind;

fn element_width(ctx: &OpContext<'_>) -> Result<usize> {
    match ctx.input_type(0)? {
        TypeKind::Slice(elem) => codec::element_width(&elem),
        other => Err(Error::type_mismatch(ctx.name(), "a slice", other)),
    }
}

fn len(ctx: &mut OpContext<'_>) -> Result<()> {
    let handle = ctx.input_handle(0)?;
    let length = heap::object_len(ctx.arena_mut(), handle)?;
    ctx.assign_length(0, length)
}

fn append(ctx: &mut OpContext<'_>) -> Result<()> {
    let width = element_width(ctx)?;
    let handle = ctx.input_handle(0)?;
    let element = ctx.input_bytes(1)?;
    let grown = heap::append_element(ctx.arena_mut(), handle, width, &element)?;
    ctx.assign_handle(0, grown)
}

fn concat(ctx: &mut OpContext<'_>) -> Result<()> {
    let width = element_width(ctx)?;
    let a = ctx.input_handle(0)?;
    let b = ctx.input_handle(1)?;
    let joined = heap::concat_objects(ctx.arena_mut(), a, b, width)?;
    ctx.assign_handle(0, joined)
}

fn copy(ctx: &mut OpContext<'_>) -> Result<()> {
    let width = element_width(ctx)?;
    let dst = ctx.input_handle(0)?;
    let src = ctx.input_handle(1)?;
    let copied = heap::copy_elements(ctx.arena_mut(), dst, src, width)?;
    tracing::trace!(copied, "slice copy");
    Ok(())
}

fn read(ctx: &mut OpContext<'_>) -> Result<()> {
    let width = element_width(ctx)?;
    let handle = ctx.input_handle(0)?;
    let index = ctx.i32(1)? as i64;
    let offset = heap::element_offset(ctx.arena_mut(), handle, index, width)?;
    let bytes = ctx.read_raw(offset, width)?;
    ctx.assign_bytes(0, bytes)
}

fn write(ctx: &mut OpContext<'_>) -> Result<()> {
    let width = element_width(ctx)?;
    let handle = ctx.input_handle(0)?;
    let index = ctx.i32(1)? as i64;
    let element = ctx.input_bytes(2)?;
    if element.len() != width {
        return Err(Error::type_mismatch(ctx.name(), format!("{} byte element", width), element.len()));
    }
    let offset = heap::element_offset(ctx.arena_mut(), handle, index, width)?;
    ctx.write_raw(offset, &element)
}

/// Element types with a slice operator family
pub fn element_kinds() -> Vec<TypeKind> {
    let mut kinds = super::ints::INT_KINDS.to_vec();
    kinds.extend(super::floats::FLOAT_KINDS);
    kinds.push(TypeKind::Bool);
    kinds.push(TypeKind::Str);
    kinds
}

/// Register every slice operator
pub fn register(table: &mut OpcodeTable) {
    for elem in element_kinds() {
        let s = TypeKind::slice_of(elem.clone());
        let name = |op: &str| format!("{}.{}", s, op);

        table.register_fn(name("len"), Signature::new(vec![s.clone()], vec![TypeKind::I32]), len);
        table.register_fn(
            name("append"),
            Signature::new(vec![s.clone(), elem.clone()], vec![s.clone()]),
            append,
        );
        table.register_fn(
            name("concat"),
            Signature::new(vec![s.clone(), s.clone()], vec![s.clone()]),
            concat,
        );
        table.register_fn(
            name("copy"),
            Signature::new(vec![s.clone(), s.clone()], vec![]),
            copy,
        );
        table.register_fn(
            name("read"),
            Signature::new(vec![s.clone(), TypeKind::I32], vec![elem.clone()]),
            read,
        );
        table.register_fn(
            name("write"),
            Signature::new(vec![s.clone(), TypeKind::I32, elem.clone()], vec![]),
            write,
        );
    }
}
