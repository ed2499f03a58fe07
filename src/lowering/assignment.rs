//! Assignment family: `=`, `:=`, compound `op=`, struct and array literals,
//! multi-value assignment

use super::{target_of, AssignOp, Lowering};
use crate::error::{Error, Result};
use crate::ir::{Argument, DerefOp, Expression, FieldRef, IndexSource};
use crate::types::TypeKind;

impl Lowering<'_> {
    /// Lowers `to <op> from` into a single node sequence whose last node writes the target
    pub fn assignment(
        &mut self,
        to: Vec<Expression>,
        op: AssignOp,
        from: Vec<Expression>,
    ) -> Result<Vec<Expression>> {
        target_of(&to)?;
        let (is_struct, is_array) = from
            .last()
            .map(|last| (last.is_struct_literal, last.is_array_literal))
            .ok_or_else(|| Error::invalid_assignment("assignment has no value"))?;

        if op.is_compound() {
            return self.short_assignment(op, to, from);
        }

        let mut to = to;
        if op == AssignOp::Define {
            to = self.declare_target(to, &from)?;
        }

        if is_struct || is_array {
            let lowered = if is_struct {
                self.struct_literal_assignment(&to, from)?
            } else {
                self.array_literal_assignment(&to, from)?
            };
            to.pop();
            to.extend(lowered);
            return Ok(to);
        }

        self.retarget(to, from)
    }

    /// `:=`: prepends a declaration of the target typed from the value
    fn declare_target(&mut self, mut to: Vec<Expression>, from: &[Expression]) -> Result<Vec<Expression>> {
        let target = target_of(&to)?.name.clone();
        let last = from
            .last()
            .ok_or_else(|| Error::invalid_assignment("assignment has no value"))?;
        let value = last.outputs.first();

        let ty = if last.is_struct_literal {
            let value = value.ok_or_else(|| Error::invalid_assignment("empty struct literal"))?;
            let name = value
                .custom_type
                .clone()
                .ok_or_else(|| Error::invalid_assignment("struct literal field without a struct type"))?;
            let ty = TypeKind::Struct(name);
            if value.decl_pointer {
                TypeKind::pointer_to(ty)
            } else {
                ty
            }
        } else if last.is_array_literal {
            match value {
                Some(out) if out.ty.is_defined() => out.ty.clone(),
                _ => {
                    let elem = match last.inputs.first() {
                        Some(input) => self.known_type(input)?,
                        None => TypeKind::Undefined,
                    };
                    let count = from.iter().filter(|f| f.is_array_literal).count();
                    TypeKind::array_of(elem, count as u32)
                }
            }
        } else if last.is_bare() {
            let value = value.ok_or_else(|| Error::invalid_assignment("value node has no output"))?;
            self.known_type(value)?
        } else {
            self.output_type(last)?
        };

        let mut sym = self.argument(target).with_type(ty).declared();
        sym.is_short_declaration = true;

        if let Some(out) = to.last_mut().and_then(|expr| expr.outputs.first_mut()) {
            out.previously_declared = true;
            out.is_short_declaration = true;
        }

        let decl = self.node(None).output(sym);
        to.insert(0, decl);
        Ok(to)
    }

    /// Plain `=`: makes the value node write the target directly
    fn retarget(&mut self, mut to: Vec<Expression>, mut from: Vec<Expression>) -> Result<Vec<Expression>> {
        let identity = self.native("identity")?;
        let idx = from.len() - 1;
        let node = &mut from[idx];

        let (ty, pass_by, escapes) = if let Some(op) = &node.operator {
            let signature = op.signature().ok_or_else(|| {
                Error::invalid_assignment(format!("{} does not produce a value", op.name()))
            })?;
            if signature.outputs.len() > 1 {
                return Err(Error::invalid_assignment(format!(
                    "{} returns {} values; use multi_assignment",
                    op.name(),
                    signature.outputs.len()
                )));
            }
            let first = signature.outputs.first().cloned().ok_or_else(|| {
                Error::invalid_assignment(format!("{} has no result", op.name()))
            })?;
            let ty = if op.is_identity() {
                TypeKind::Undefined
            } else {
                self.output_type(node)?
            };
            (ty, first.pass_by, first.escapes)
        } else {
            let value = node
                .outputs
                .first()
                .cloned()
                .ok_or_else(|| Error::invalid_assignment("value node has no output"))?;
            let ty = self.known_type(&value)?;
            node.operator = Some(identity);
            node.inputs = if node.is_method_call {
                let mut inputs = node.outputs.clone();
                inputs.append(&mut node.inputs);
                inputs
            } else {
                node.outputs.clone()
            };
            (ty, value.pass_by, value.escapes)
        };

        let mut target_node = to
            .pop()
            .ok_or_else(|| Error::invalid_assignment("assignment has no target"))?;
        let target = target_node
            .outputs
            .first_mut()
            .ok_or_else(|| Error::invalid_assignment("assignment has no target"))?;
        if target.is_plain() && ty.is_defined() {
            target.ty = ty.clone();
        }
        target.pass_by = pass_by;
        target.escapes = escapes;

        // `:=` declared the target in to[0]
        if target.is_short_declaration {
            let name = target.name.clone();
            if let Some(sym) = to
                .first_mut()
                .filter(|decl| decl.is_bare() && decl.inputs.is_empty())
                .and_then(|decl| decl.outputs.first_mut())
                .filter(|sym| sym.name == name && sym.is_short_declaration)
            {
                if ty.is_defined() {
                    sym.ty = ty;
                }
                sym.escapes = escapes;
            }
        }

        from[idx].outputs = target_node.outputs;
        to.extend(from);
        Ok(to)
    }

    /// Compound `op=`: `target = target <op> value` as one type-generic arithmetic node.
    /// A bare value becomes the second operand directly; anything else is first
    /// computed into a fresh local.
    pub fn short_assignment(
        &mut self,
        op: AssignOp,
        mut to: Vec<Expression>,
        mut from: Vec<Expression>,
    ) -> Result<Vec<Expression>> {
        let opcode = op
            .opcode()
            .ok_or_else(|| Error::invalid_assignment(format!("{} is not a compound operator", op)))?;
        let target = to
            .pop()
            .and_then(|t| t.outputs.into_iter().next())
            .ok_or_else(|| Error::invalid_assignment("assignment has no target"))?;
        let mut last = from
            .pop()
            .ok_or_else(|| Error::invalid_assignment("assignment has no value"))?;

        let mut expr = self.node(Some(self.native(opcode)?)).input(target.clone());
        let mut lowered = to;

        if last.is_bare() {
            let value = last
                .outputs
                .into_iter()
                .next()
                .ok_or_else(|| Error::invalid_assignment("value node has no output"))?;
            lowered.extend(from);
            expr = expr.input(value);
        } else {
            let mut ty = self.output_type(&last)?;
            if !ty.is_defined() {
                ty = self.known_type(&target)?;
            }
            let name = self.gensym();
            let sym = self.argument(name).with_type(ty).declared();
            lowered.push(self.node(None).output(sym.clone()));
            lowered.extend(from);
            last.outputs = vec![sym.clone()];
            lowered.push(last);
            expr = expr.input(sym);
        }

        lowered.push(expr.output(target));
        Ok(lowered)
    }

    /// `x = T{f: v, ...}` and `x = &T{...}`.
    ///
    /// Field initializers are the `from` nodes flagged as struct literals; their output
    /// names the field. For `&T{...}` the fields are written through a freshly declared,
    /// heap-allocated auxiliary pointer which is then copied to the target.
    pub fn struct_literal_assignment(
        &mut self,
        to: &[Expression],
        from: Vec<Expression>,
    ) -> Result<Vec<Expression>> {
        let target = target_of(to)?.clone();
        let last = from
            .last()
            .and_then(|e| e.outputs.first())
            .ok_or_else(|| Error::invalid_assignment("empty struct literal"))?;

        if !last.decl_pointer {
            return Self::assign_struct_literal_fields(&target, from);
        }

        let name = last
            .custom_type
            .clone()
            .ok_or_else(|| Error::invalid_assignment("struct literal field without a struct type"))?;
        let aux_name = self.gensym();
        let aux = self
            .argument(aux_name)
            .with_type(TypeKind::pointer_to(TypeKind::Struct(name)))
            .pointer_decl()
            .escaping()
            .declared();

        let mut lowered = vec![self.node(None).output(aux.clone())];
        lowered.extend(Self::assign_struct_literal_fields(&aux, from)?);
        lowered.push(
            self.node(Some(self.native("identity")?))
                .input(aux)
                .output(target.by_reference()),
        );
        Ok(lowered)
    }

    /// Renames every field initializer's output to `base.<field>`, keeping `base`'s own
    /// dereference chain in front of the field access
    pub fn assign_struct_literal_fields(base: &Argument, mut from: Vec<Expression>) -> Result<Vec<Expression>> {
        for expr in from.iter_mut().filter(|e| e.is_struct_literal) {
            let out = expr
                .outputs
                .first_mut()
                .ok_or_else(|| Error::invalid_assignment("struct literal field without output"))?;
            let mut renamed = base.clone();
            renamed.pass_by = Default::default();
            renamed.escapes = false;
            renamed.decl_pointer = false;
            renamed.custom_type = out.custom_type.take();
            renamed
                .derefs
                .push(DerefOp::Field(FieldRef::named(out.name.clone())));
            *out = renamed;
        }
        Ok(from)
    }

    /// `x = [N]T{v0, v1, ...}`: element initializers write `x[i]` in order
    pub fn array_literal_assignment(
        &mut self,
        to: &[Expression],
        mut from: Vec<Expression>,
    ) -> Result<Vec<Expression>> {
        let target = target_of(to)?;
        for (position, expr) in from.iter_mut().filter(|e| e.is_array_literal).enumerate() {
            let out = expr
                .outputs
                .first_mut()
                .ok_or_else(|| Error::invalid_assignment("array literal element without output"))?;
            let mut renamed = target.clone();
            renamed
                .derefs
                .push(DerefOp::Index(IndexSource::Const(position as i64)));
            *out = renamed;
        }
        Ok(from)
    }

    /// `a, b = f(...)` and `a, b := f(...)`: binds every result of the last `from` node
    /// to the matching target
    pub fn multi_assignment(
        &mut self,
        to: Vec<Expression>,
        op: AssignOp,
        mut from: Vec<Expression>,
    ) -> Result<Vec<Expression>> {
        if op.is_compound() {
            return Err(Error::invalid_assignment(format!(
                "{} cannot assign multiple values",
                op
            )));
        }
        let mut targets = to
            .into_iter()
            .map(|t| t.outputs.into_iter().next())
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| Error::invalid_assignment("assignment target without output"))?;

        let last = from
            .last_mut()
            .ok_or_else(|| Error::invalid_assignment("assignment has no value"))?;
        let signature = last
            .operator
            .as_ref()
            .and_then(|op| op.signature())
            .cloned()
            .ok_or_else(|| Error::invalid_assignment("multi-value assignment needs a call"))?;
        if targets.len() != signature.outputs.len() {
            return Err(Error::invalid_assignment(format!(
                "{} targets for {} values",
                targets.len(),
                signature.outputs.len()
            )));
        }

        let mut lowered = Vec::new();
        if op == AssignOp::Define {
            let fallback = match last.inputs.first() {
                Some(input) => self.known_type(input)?,
                None => TypeKind::Undefined,
            };
            for (target, spec) in targets.iter_mut().zip(&signature.outputs) {
                let ty = if spec.ty.is_defined() {
                    spec.ty.clone()
                } else {
                    fallback.clone()
                };
                let mut sym = self.argument(target.name.clone()).with_type(ty).declared();
                sym.is_short_declaration = true;
                lowered.push(self.node(None).output(sym));
                target.previously_declared = true;
                target.is_short_declaration = true;
            }
        }

        if let Some(last) = from.last_mut() {
            last.outputs = targets;
        }
        lowered.extend(from);
        Ok(lowered)
    }
}
