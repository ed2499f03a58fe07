//! The evaluator: an explicit frame loop over lowered function bodies
//!
//! Execution is single-threaded. Each node runs to completion before the next one
//! starts; calls push a frame and the loop resumes the caller once the callee's body is
//! exhausted. Callbacks queued by adapters are drained between nodes on this thread.

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::SeedableRng;

use super::frame::{CallFrame, CallStack};
use super::options::VmOptions;
use super::resolver::{Location, Resolver};
use crate::adapters::CallbackQueue;
use crate::error::{Error, Result};
use crate::ir::{Argument, Expression, Function, FunctionRef, Operator, PassBy, Program};
use crate::memory::{codec, heap, Arena, Offset, Value};
use crate::opcodes::{OpContext, OpcodeTable};
use crate::types::TypeKind;

/// Virtual machine owning the arena and the call stack of one running program
pub struct Vm {
    program: Arc<Program>,
    opcodes: Arc<OpcodeTable>,
    arena: Arena,
    stack: CallStack,
    options: VmOptions,
    rng: StdRng,
    callbacks: CallbackQueue,
    dispatching: bool,
}

impl Vm {
    /// Creates a VM for `program`, laying out the arena from `options`
    pub fn new(
        program: impl Into<Arc<Program>>,
        opcodes: impl Into<Arc<OpcodeTable>>,
        options: VmOptions,
    ) -> Result<Self> {
        let program = program.into();
        options.validate_for(program.data().len())?;

        let arena = Arena::with_layout(
            program.data(),
            options.stack_size,
            options.initial_heap_size,
            options.max_memory,
        )?;
        let rng = match options.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        tracing::debug!(
            functions = program.function_count(),
            data = program.data().len(),
            stack = options.stack_size,
            "vm created"
        );

        Ok(Vm {
            program,
            opcodes: opcodes.into(),
            arena,
            stack: CallStack::new(options.max_call_depth),
            options,
            rng,
            callbacks: CallbackQueue::new(),
            dispatching: false,
        })
    }

    /// Uses `queue` for adapter callbacks (share it with the adapters before running)
    pub fn with_callbacks(mut self, queue: CallbackQueue) -> Self {
        self.callbacks = queue;
        self
    }

    /// The callback queue drained by this VM
    pub fn callbacks(&self) -> CallbackQueue {
        self.callbacks.clone()
    }

    /// The arena
    pub fn arena(&self) -> &Arena {
        &self.arena
    }

    /// The arena, mutably (for hosts preparing input data)
    pub fn arena_mut(&mut self) -> &mut Arena {
        &mut self.arena
    }

    /// The program being executed
    pub fn program(&self) -> &Program {
        &self.program
    }

    /// Active options
    pub fn options(&self) -> &VmOptions {
        &self.options
    }

    /// Number of live frames
    pub fn depth(&self) -> usize {
        self.stack.depth()
    }

    /// Runs the configured entry function with no arguments
    pub fn run(&mut self) -> Result<Vec<Vec<u8>>> {
        let package = self.options.entry_package.clone();
        let function = self.options.entry_function.clone();
        self.call(&package, &function, &[])
    }

    /// Invokes `package.name` with pre-encoded arguments and returns its encoded results.
    ///
    /// On error every frame pushed by this call is discarded.
    pub fn call(&mut self, package: &str, name: &str, args: &[Vec<u8>]) -> Result<Vec<Vec<u8>>> {
        let program = Arc::clone(&self.program);
        let function = program.lookup(package, name)?;
        if args.len() != function.params.len() {
            return Err(Error::InvalidArguments {
                op: function.reference().to_string(),
                reason: format!(
                    "expected {} arguments, got {}",
                    function.params.len(),
                    args.len()
                ),
            });
        }

        let base = self.stack.depth();
        let fp = self.stack.next_fp(self.arena.stack_start());
        let result = self
            .enter(function, fp, fp, args.to_vec(), false)
            .and_then(|_| self.run_until(base))
            .and_then(|_| self.read_slots(fp, &function.returns));

        if result.is_err() {
            self.stack.truncate(base);
        }
        result
    }

    /// Executes a declaration, bare move or native node in the frame at `fp`
    pub fn execute_node(&mut self, fp: Offset, expr: &Expression) -> Result<()> {
        match &expr.operator {
            None => self.execute_bare(fp, expr),
            Some(Operator::Native { code, .. }) => {
                let op = self.opcodes.get(*code)?;
                let mut ctx = OpContext::new(
                    &mut self.arena,
                    self.program.structs(),
                    &mut self.rng,
                    fp,
                    expr,
                );
                op.execute(&mut ctx)?;
                ctx.commit()
            }
            Some(other) => Err(Error::InvalidArguments {
                op: other.name(),
                reason: "calls and jumps only run inside a frame".to_string(),
            }),
        }
    }

    /// Runs every queued adapter callback. Callbacks naming an unknown function are
    /// dropped with a warning.
    pub fn dispatch_callbacks(&mut self) -> Result<()> {
        if self.dispatching || self.callbacks.is_empty() {
            return Ok(());
        }
        self.dispatching = true;
        let result = self.drain_callbacks();
        self.dispatching = false;
        result
    }

    fn drain_callbacks(&mut self) -> Result<()> {
        for callback in self.callbacks.drain() {
            if self
                .program
                .lookup(&callback.package, &callback.function)
                .is_err()
            {
                tracing::warn!(
                    package = %callback.package,
                    function = %callback.function,
                    "dropping callback for unknown function"
                );
                continue;
            }
            tracing::debug!(
                package = %callback.package,
                function = %callback.function,
                "dispatching callback"
            );
            self.call(&callback.package, &callback.function, &callback.args)?;
        }
        Ok(())
    }

    /// Resolves `arg` in the frame at `fp`
    pub fn locate(&self, fp: Offset, arg: &Argument) -> Result<Location> {
        Resolver::new(&self.arena, self.program.structs()).resolve(fp, arg)
    }

    /// Reads and decodes the value `arg` refers to in the frame at `fp`
    pub fn read_argument(&self, fp: Offset, arg: &Argument) -> Result<Value> {
        let location = self.locate(fp, arg)?;
        match &location.ty {
            TypeKind::Str | TypeKind::Slice(_) => {
                let handle = self.arena.read_offset(location.offset)?;
                heap::read_object(&self.arena, handle, &location.ty)
            }
            ty => codec::decode(self.arena.read(location.offset, location.size)?, ty),
        }
    }

    fn run_until(&mut self, base: usize) -> Result<()> {
        let program = Arc::clone(&self.program);

        while self.stack.depth() > base {
            let (function, fp, pc) = match self.stack.top() {
                Some(frame) => (program.function(&frame.function)?, frame.fp, frame.pc),
                None => break,
            };

            let Some(expr) = function.body.get(pc) else {
                self.leave(&program)?;
                continue;
            };

            if self.options.trace_execution {
                tracing::trace!(
                    function = %function.reference(),
                    pc,
                    op = %expr.operator_name(),
                    "exec"
                );
            }

            match &expr.operator {
                Some(Operator::Call { function: callee, .. }) => {
                    self.call_node(&program, fp, expr, callee)
                        .map_err(|e| e.at(&expr.location))?;
                }
                Some(Operator::Jump {
                    then_lines,
                    else_lines,
                }) => {
                    let next = self
                        .jump_target(fp, pc, expr, *then_lines, *else_lines, function.body.len())
                        .map_err(|e| e.at(&expr.location))?;
                    self.set_pc(next);
                }
                _ => {
                    self.execute_node(fp, expr)
                        .map_err(|e| e.at(&expr.location))?;
                    self.set_pc(pc + 1);
                }
            }

            self.dispatch_callbacks()?;
        }
        Ok(())
    }

    fn set_pc(&mut self, pc: usize) {
        if let Some(frame) = self.stack.top_mut() {
            frame.pc = pc;
        }
    }

    /// Pushes a frame for `function` at `fp`, zeroes it and stores the arguments
    fn enter(
        &mut self,
        function: &Function,
        fp: Offset,
        caller_fp: Offset,
        args: Vec<Vec<u8>>,
        returns_to_caller: bool,
    ) -> Result<()> {
        if fp + function.frame_size > self.arena.stack_end() {
            return Err(Error::StackOverflow {
                depth: self.stack.depth(),
            });
        }
        self.stack.push(CallFrame {
            function: function.reference(),
            fp,
            pc: 0,
            caller_fp,
            size: function.frame_size,
            returns_to_caller,
        })?;
        self.arena.zero(fp, function.frame_size)?;

        for (param, bytes) in function.params.iter().zip(args) {
            let location = self.locate(fp, param)?;
            if bytes.len() != location.size {
                return Err(Error::type_mismatch(
                    format!("argument {}", param.name),
                    format!("{} bytes", location.size),
                    bytes.len(),
                ));
            }
            self.arena.write(location.offset, &bytes)?;
        }

        tracing::debug!(function = %function.reference(), fp, depth = self.stack.depth(), "enter");
        Ok(())
    }

    fn call_node(
        &mut self,
        program: &Program,
        fp: Offset,
        expr: &Expression,
        callee: &FunctionRef,
    ) -> Result<()> {
        let function = program.function(callee)?;
        if expr.inputs.len() != function.params.len() {
            return Err(Error::InvalidArguments {
                op: callee.to_string(),
                reason: format!(
                    "expected {} arguments, got {}",
                    function.params.len(),
                    expr.inputs.len()
                ),
            });
        }

        let mut args = Vec::with_capacity(expr.inputs.len());
        for input in &expr.inputs {
            let location = self.locate(fp, input)?;
            let bytes = match input.pass_by {
                PassBy::Reference => codec::handle_bytes(location.offset)?.to_vec(),
                PassBy::Value => self.arena.read(location.offset, location.size)?.to_vec(),
            };
            args.push(bytes);
        }

        let callee_fp = self.stack.next_fp(self.arena.stack_start());
        self.enter(function, callee_fp, fp, args, true)
    }

    /// Pops the innermost frame; a frame entered from a call node copies its return
    /// slots into that node's outputs and advances the caller past it.
    fn leave(&mut self, program: &Program) -> Result<()> {
        let Some(frame) = self.stack.pop() else {
            return Ok(());
        };
        tracing::debug!(function = %frame.function, depth = self.stack.depth(), "leave");
        if !frame.returns_to_caller {
            return Ok(());
        }

        let callee = program.function(&frame.function)?;
        let (caller, caller_fp, caller_pc) = match self.stack.top() {
            Some(top) => (program.function(&top.function)?, top.fp, top.pc),
            None => return Ok(()),
        };
        let expr = caller.body.get(caller_pc).ok_or_else(|| Error::InvalidArguments {
            op: caller.reference().to_string(),
            reason: format!("return into missing node {}", caller_pc),
        })?;

        self.store_results(frame.fp, callee, caller_fp, expr)
            .map_err(|e| e.at(&expr.location))?;
        self.set_pc(caller_pc + 1);
        Ok(())
    }

    fn store_results(
        &mut self,
        callee_fp: Offset,
        callee: &Function,
        caller_fp: Offset,
        expr: &Expression,
    ) -> Result<()> {
        let results = self.read_slots(callee_fp, &callee.returns)?;
        let mut writes = Vec::with_capacity(expr.outputs.len());
        for (output, bytes) in expr.outputs.iter().zip(results) {
            let location = self.locate(caller_fp, output)?;
            if bytes.len() != location.size {
                return Err(Error::type_mismatch(
                    format!("result of {}", callee.reference()),
                    format!("{} bytes", location.size),
                    bytes.len(),
                ));
            }
            writes.push((location.offset, bytes));
        }
        for (offset, bytes) in writes {
            self.arena.write(offset, &bytes)?;
        }
        Ok(())
    }

    fn read_slots(&self, fp: Offset, slots: &[Argument]) -> Result<Vec<Vec<u8>>> {
        slots
            .iter()
            .map(|slot| {
                let location = self.locate(fp, slot)?;
                Ok(self.arena.read(location.offset, location.size)?.to_vec())
            })
            .collect()
    }

    fn jump_target(
        &self,
        fp: Offset,
        pc: usize,
        expr: &Expression,
        then_lines: i32,
        else_lines: i32,
        body_len: usize,
    ) -> Result<usize> {
        let taken = match expr.inputs.first() {
            None => true,
            Some(condition) => match self.read_argument(fp, condition)? {
                Value::Bool(b) => b,
                other => {
                    return Err(Error::type_mismatch("jmp", "bool", other.type_name()));
                }
            },
        };
        let lines = if taken { then_lines } else { else_lines };
        let next = pc as i64 + 1 + lines as i64;
        if next < 0 || next > body_len as i64 {
            return Err(Error::InvalidArguments {
                op: "jmp".to_string(),
                reason: format!("target {} outside body of {} nodes", next, body_len),
            });
        }
        Ok(next as usize)
    }

    /// Declarations (no inputs) and bare moves (one input, one output)
    fn execute_bare(&mut self, fp: Offset, expr: &Expression) -> Result<()> {
        if expr.inputs.is_empty() {
            for output in &expr.outputs {
                let location = self.locate(fp, output)?;
                self.arena.zero(location.offset, location.size)?;
                if let (true, TypeKind::Pointer(inner)) = (output.escapes, &location.ty) {
                    let size = inner.size(self.program.structs())?;
                    let pointee = self.arena.allocate(size)?;
                    self.arena.write_offset(location.offset, pointee)?;
                }
            }
            return Ok(());
        }

        let (input, output) = match (expr.inputs.as_slice(), expr.outputs.as_slice()) {
            ([input], [output]) => (input, output),
            _ => {
                return Err(Error::InvalidArguments {
                    op: "move".to_string(),
                    reason: format!(
                        "{} inputs and {} outputs",
                        expr.inputs.len(),
                        expr.outputs.len()
                    ),
                })
            }
        };
        let source = self.locate(fp, input)?;
        let bytes = match input.pass_by {
            PassBy::Reference => codec::handle_bytes(source.offset)?.to_vec(),
            PassBy::Value => self.arena.read(source.offset, source.size)?.to_vec(),
        };
        let target = self.locate(fp, output)?;
        if bytes.len() != target.size {
            return Err(Error::type_mismatch(
                "move",
                format!("{} bytes for {}", target.size, target.ty),
                bytes.len(),
            ));
        }
        self.arena.write(target.offset, &bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{ProgramBuilder, Signature};

    fn options() -> VmOptions {
        VmOptions {
            stack_size: 256,
            initial_heap_size: 256,
            max_memory: 64 * 1024,
            rng_seed: Some(1),
            ..VmOptions::default()
        }
    }

    fn local(name: &str, ty: TypeKind, offset: usize) -> Argument {
        Argument::new(name).with_type(ty).local(offset)
    }

    fn function(name: &str, params: Vec<Argument>, returns: Vec<Argument>, body: Vec<Expression>, frame_size: usize) -> Function {
        Function {
            package: "main".into(),
            name: name.into(),
            params,
            returns,
            body,
            frame_size,
        }
    }

    #[test]
    fn test_call_with_encoded_arguments() {
        let opcodes = OpcodeTable::new();
        let add = opcodes.operator("i64.add").unwrap();
        let a = local("a", TypeKind::I64, 0);
        let b = local("b", TypeKind::I64, 8);
        let out = local("out", TypeKind::I64, 16);

        let mut builder = ProgramBuilder::new();
        builder.add_function(function(
            "sum",
            vec![a.clone(), b.clone()],
            vec![out.clone()],
            vec![Expression::op(add).input(a).input(b).output(out)],
            24,
        ));
        let mut vm = Vm::new(builder.build().unwrap(), opcodes, options()).unwrap();

        let results = vm
            .call("main", "sum", &[40i64.to_le_bytes().to_vec(), 2i64.to_le_bytes().to_vec()])
            .unwrap();
        assert_eq!(results, vec![42i64.to_le_bytes().to_vec()]);
        assert_eq!(vm.depth(), 0);
    }

    #[test]
    fn test_escaping_declaration_allocates_pointee() {
        let mut builder = ProgramBuilder::new();
        builder
            .define_struct("Item", &[("x", TypeKind::I64)])
            .unwrap();
        let p = local("p", TypeKind::pointer_to(TypeKind::Struct("Item".into())), 0).escaping();
        builder.add_function(function(
            "main",
            vec![],
            vec![p.clone()],
            vec![Expression::declaration(p)],
            4,
        ));
        let mut vm = Vm::new(builder.build().unwrap(), OpcodeTable::new(), options()).unwrap();
        let heap_before = vm.arena().heap_pointer();

        let results = vm.run().unwrap();
        let handle = u32::from_le_bytes(results[0].clone().try_into().unwrap()) as usize;
        assert_eq!(handle, heap_before);
        assert_eq!(vm.arena().heap_pointer(), heap_before + 8);
    }

    #[test]
    fn test_stack_overflow_clears_frames() {
        let mut builder = ProgramBuilder::new();
        builder.declare_function("main", "forever", Signature::default());
        let recurse = builder.call_operator("main", "forever").unwrap();
        builder.add_function(function("forever", vec![], vec![], vec![Expression::op(recurse)], 16));
        let mut vm = Vm::new(builder.build().unwrap(), OpcodeTable::new(), options()).unwrap();

        let err = vm.call("main", "forever", &[]).unwrap_err();
        assert!(matches!(err.root(), Error::StackOverflow { .. }));
        assert_eq!(vm.depth(), 0);
    }

    #[test]
    fn test_unknown_entry_is_unresolved() {
        let program = ProgramBuilder::new().build().unwrap();
        let mut vm = Vm::new(program, OpcodeTable::empty(), options()).unwrap();
        assert!(matches!(vm.run(), Err(Error::UnresolvedSymbol { .. })));
    }
}
