/// End-to-end tests for the evaluator
/// Demonstrates: ProgramBuilder → FunctionBuilder → Vm working together
use arenavm::{
    Argument, CallbackQueue, Error, Expression, FunctionBuilder, Operator, OpcodeTable,
    PendingCallback, ProgramBuilder, SourceLoc, Storage, TypeKind, Value, Vm, VmOptions,
};

fn options() -> VmOptions {
    VmOptions {
        stack_size: 4096,
        initial_heap_size: 1024,
        max_memory: 1 << 20,
        rng_seed: Some(7),
        ..VmOptions::default()
    }
}

fn arg(name: &str) -> Argument {
    Argument::new(name)
}

fn global_offset(arg: &Argument) -> usize {
    match arg.storage {
        Storage::Global { offset } => offset,
        other => panic!("not a global: {:?}", other),
    }
}

// =============================================================================
// SINGLE NODES
// =============================================================================

#[test]
fn test_e2e_integer_division() {
    let opcodes = OpcodeTable::new();
    let div = opcodes.operator("i64.div").unwrap();
    let mut program = ProgramBuilder::new();
    let seven = program.literal(Value::I64(7), TypeKind::I64).unwrap();
    let three = program.literal(Value::I64(3), TypeKind::I64).unwrap();
    let q = program.global("main", "q", TypeKind::I64).unwrap();

    let mut vm = Vm::new(program.build().unwrap(), opcodes, options()).unwrap();
    let fp = vm.arena().stack_start();
    let node = Expression::op(div).input(seven).input(three).output(q.clone());
    vm.execute_node(fp, &node).unwrap();

    assert_eq!(vm.read_argument(fp, &q).unwrap(), Value::I64(2));
}

#[test]
fn test_e2e_division_truncates_toward_zero() {
    let opcodes = OpcodeTable::new();
    let div = opcodes.operator("i64.div").unwrap();
    let rem = opcodes.operator("i64.mod").unwrap();
    let mut program = ProgramBuilder::new();
    let a = program.literal(Value::I64(-7), TypeKind::I64).unwrap();
    let b = program.literal(Value::I64(2), TypeKind::I64).unwrap();
    let q = program.global("main", "q", TypeKind::I64).unwrap();
    let r = program.global("main", "r", TypeKind::I64).unwrap();

    let mut vm = Vm::new(program.build().unwrap(), opcodes, options()).unwrap();
    let fp = vm.arena().stack_start();
    vm.execute_node(fp, &Expression::op(div).input(a.clone()).input(b.clone()).output(q.clone()))
        .unwrap();
    vm.execute_node(fp, &Expression::op(rem).input(a).input(b).output(r.clone()))
        .unwrap();

    assert_eq!(vm.read_argument(fp, &q).unwrap(), Value::I64(-3));
    assert_eq!(vm.read_argument(fp, &r).unwrap(), Value::I64(-1));
}

#[test]
fn test_e2e_division_by_zero_leaves_output_untouched() {
    let opcodes = OpcodeTable::new();
    let div = opcodes.operator("i64.div").unwrap();
    let mut program = ProgramBuilder::new();
    let seven = program.literal(Value::I64(7), TypeKind::I64).unwrap();
    let zero = program.literal(Value::I64(0), TypeKind::I64).unwrap();
    let q = program.global("main", "q", TypeKind::I64).unwrap();

    let mut vm = Vm::new(program.build().unwrap(), opcodes, options()).unwrap();
    vm.arena_mut()
        .write(global_offset(&q), &99i64.to_le_bytes())
        .unwrap();
    let fp = vm.arena().stack_start();

    let err = vm
        .execute_node(fp, &Expression::op(div).input(seven).input(zero).output(q.clone()))
        .unwrap_err();
    assert!(matches!(err, Error::DivisionByZero { ref op } if op == "i64.div"));
    assert_eq!(vm.read_argument(fp, &q).unwrap(), Value::I64(99));
}

#[test]
fn test_e2e_string_concat() {
    let opcodes = OpcodeTable::new();
    let concat = opcodes.operator("str.concat").unwrap();
    let mut program = ProgramBuilder::new();
    let foo = program.literal(Value::Str("foo".into()), TypeKind::Str).unwrap();
    let bar = program.literal(Value::Str("bar".into()), TypeKind::Str).unwrap();
    let s = program.global("main", "s", TypeKind::Str).unwrap();

    let mut vm = Vm::new(program.build().unwrap(), opcodes, options()).unwrap();
    let fp = vm.arena().stack_start();
    let heap_before = vm.arena().heap_pointer();
    vm.execute_node(fp, &Expression::op(concat).input(foo.clone()).input(bar).output(s.clone()))
        .unwrap();

    assert_eq!(vm.read_argument(fp, &s).unwrap(), Value::Str("foobar".into()));
    // inputs are never modified
    assert_eq!(vm.read_argument(fp, &foo).unwrap(), Value::Str("foo".into()));
    assert!(vm.arena().heap_pointer() > heap_before);
}

#[test]
fn test_e2e_random_stays_in_range() {
    let opcodes = OpcodeTable::new();
    let rand = opcodes.operator("i64.rand").unwrap();
    let mut program = ProgramBuilder::new();
    let lo = program.literal(Value::I64(10), TypeKind::I64).unwrap();
    let hi = program.literal(Value::I64(20), TypeKind::I64).unwrap();
    let r = program.global("main", "r", TypeKind::I64).unwrap();

    let mut vm = Vm::new(program.build().unwrap(), opcodes, options()).unwrap();
    let fp = vm.arena().stack_start();
    let node = Expression::op(rand.clone())
        .input(lo.clone())
        .input(hi.clone())
        .output(r.clone());
    for _ in 0..100 {
        vm.execute_node(fp, &node).unwrap();
        let value = vm.read_argument(fp, &r).unwrap().as_i64().unwrap();
        assert!((10..20).contains(&value), "{} out of range", value);
    }

    let inverted = Expression::op(rand).input(hi).input(lo).output(r);
    assert!(matches!(
        vm.execute_node(fp, &inverted),
        Err(Error::InvalidRange { min: 20, max: 10, .. })
    ));
}

#[test]
fn test_e2e_inverted_unsigned_range_reports_full_bounds() {
    let opcodes = OpcodeTable::new();
    let rand = opcodes.operator("u64.rand").unwrap();
    let mut program = ProgramBuilder::new();
    let lo = program.literal(Value::U64(u64::MAX), TypeKind::U64).unwrap();
    let hi = program.literal(Value::U64(1), TypeKind::U64).unwrap();
    let r = program.global("main", "r", TypeKind::U64).unwrap();

    let mut vm = Vm::new(program.build().unwrap(), opcodes, options()).unwrap();
    let fp = vm.arena().stack_start();
    let node = Expression::op(rand).input(lo).input(hi).output(r);
    match vm.execute_node(fp, &node) {
        Err(Error::InvalidRange { min, max, .. }) => {
            assert_eq!(min, u64::MAX as i128);
            assert_eq!(max, 1);
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_e2e_same_seed_same_sequence() {
    let draw = || {
        let opcodes = OpcodeTable::new();
        let rand = opcodes.operator("u32.rand").unwrap();
        let mut program = ProgramBuilder::new();
        let lo = program.literal(Value::U32(0), TypeKind::U32).unwrap();
        let hi = program.literal(Value::U32(1000), TypeKind::U32).unwrap();
        let r = program.global("main", "r", TypeKind::U32).unwrap();
        let mut vm = Vm::new(program.build().unwrap(), opcodes, options()).unwrap();
        let node = Expression::op(rand).input(lo).input(hi).output(r.clone());
        (0..5)
            .map(|_| {
                vm.execute_node(0, &node).unwrap();
                vm.read_argument(0, &r).unwrap()
            })
            .collect::<Vec<_>>()
    };
    assert_eq!(draw(), draw());
}

// =============================================================================
// FRAMES AND CONTROL FLOW
// =============================================================================

#[test]
fn test_e2e_call_and_return() {
    let opcodes = OpcodeTable::new();
    let mul = opcodes.operator("i64.mul").unwrap();
    let mut program = ProgramBuilder::new();
    let nine = program.literal(Value::I64(9), TypeKind::I64).unwrap();

    let mut square = FunctionBuilder::new("main", "square")
        .param("n", TypeKind::I64)
        .returns("r", TypeKind::I64);
    square.push(Expression::op(mul).input(arg("n")).input(arg("n")).output(arg("r")));
    let square = square.build(&program).unwrap();
    program.add_function(square);

    let call = program.call_operator("main", "square").unwrap();
    let mut main = FunctionBuilder::new("main", "main").returns("out", TypeKind::I64);
    main.push(Expression::op(call).input(nine).output(arg("out")));
    let main = main.build(&program).unwrap();
    program.add_function(main);

    let mut vm = Vm::new(program.build().unwrap(), opcodes, options()).unwrap();
    let results = vm.run().unwrap();
    assert_eq!(results, vec![81i64.to_le_bytes().to_vec()]);
    assert_eq!(vm.depth(), 0);
}

#[test]
fn test_e2e_jump_loop_sums_one_to_ten() {
    let opcodes = OpcodeTable::new();
    let identity = opcodes.operator("identity").unwrap();
    let add = opcodes.operator("i64.add").unwrap();
    let gt = opcodes.operator("i64.gt").unwrap();
    let mut program = ProgramBuilder::new();
    let one = program.literal(Value::I64(1), TypeKind::I64).unwrap();
    let ten = program.literal(Value::I64(10), TypeKind::I64).unwrap();

    let mut main = FunctionBuilder::new("main", "main")
        .returns("sum", TypeKind::I64)
        .local("i", TypeKind::I64)
        .local("done", TypeKind::Bool);
    main.push(Expression::op(identity).input(one.clone()).output(arg("i")));
    main.push(Expression::op(gt).input(arg("i")).input(ten).output(arg("done")));
    main.push(
        Expression::op(Operator::Jump {
            then_lines: 3,
            else_lines: 0,
        })
        .input(arg("done")),
    );
    main.push(
        Expression::op(add.clone())
            .input(arg("sum"))
            .input(arg("i"))
            .output(arg("sum")),
    );
    main.push(Expression::op(add).input(arg("i")).input(one).output(arg("i")));
    main.push(Expression::op(Operator::Jump {
        then_lines: -5,
        else_lines: 0,
    }));
    let main = main.build(&program).unwrap();
    program.add_function(main);

    let mut vm = Vm::new(program.build().unwrap(), opcodes, options()).unwrap();
    let results = vm.run().unwrap();
    assert_eq!(results[0], 55i64.to_le_bytes().to_vec());
}

// =============================================================================
// SLICES AND INDEXING
// =============================================================================

#[test]
fn test_e2e_slice_append_len_and_read() {
    let opcodes = OpcodeTable::new();
    let append = opcodes.operator("[]i64.append").unwrap();
    let len = opcodes.operator("[]i64.len").unwrap();
    let read = opcodes.operator("[]i64.read").unwrap();
    let identity = opcodes.operator("identity").unwrap();
    let mut program = ProgramBuilder::new();
    let five = program.literal(Value::I64(5), TypeKind::I64).unwrap();
    let eight = program.literal(Value::I64(8), TypeKind::I64).unwrap();
    let index = program.literal(Value::I32(1), TypeKind::I32).unwrap();
    let zero = program.literal(Value::I32(0), TypeKind::I32).unwrap();

    let mut main = FunctionBuilder::new("main", "main")
        .returns("n", TypeKind::I32)
        .returns("v", TypeKind::I64)
        .returns("w", TypeKind::I64)
        .local("xs", TypeKind::slice_of(TypeKind::I64))
        .local("idx", TypeKind::I32);
    main.push(Expression::op(append.clone()).input(arg("xs")).input(five).output(arg("xs")));
    main.push(Expression::op(append).input(arg("xs")).input(eight).output(arg("xs")));
    main.push(Expression::op(len).input(arg("xs")).output(arg("n")));
    main.push(Expression::op(read).input(arg("xs")).input(index).output(arg("v")));
    main.push(Expression::op(identity.clone()).input(zero).output(arg("idx")));
    main.push(
        Expression::op(identity)
            .input(arg("xs").index_by(arg("idx")))
            .output(arg("w")),
    );
    let main = main.build(&program).unwrap();
    program.add_function(main);

    let mut vm = Vm::new(program.build().unwrap(), opcodes, options()).unwrap();
    let results = vm.run().unwrap();
    assert_eq!(results[0], 2i32.to_le_bytes().to_vec());
    assert_eq!(results[1], 8i64.to_le_bytes().to_vec());
    assert_eq!(results[2], 5i64.to_le_bytes().to_vec());
}

#[test]
fn test_e2e_out_of_range_read_reports_location() {
    let opcodes = OpcodeTable::new();
    let append = opcodes.operator("[]i64.append").unwrap();
    let read = opcodes.operator("[]i64.read").unwrap();
    let mut program = ProgramBuilder::new();
    let five = program.literal(Value::I64(5), TypeKind::I64).unwrap();
    let index = program.literal(Value::I32(3), TypeKind::I32).unwrap();

    let mut main = FunctionBuilder::new("main", "main")
        .returns("v", TypeKind::I64)
        .local("xs", TypeKind::slice_of(TypeKind::I64));
    main.push(
        Expression::op(append)
            .input(arg("xs"))
            .input(five)
            .output(arg("xs"))
            .at(SourceLoc::new("main.go", 11)),
    );
    main.push(
        Expression::op(read)
            .input(arg("xs"))
            .input(index)
            .output(arg("v"))
            .at(SourceLoc::new("main.go", 12)),
    );
    let main = main.build(&program).unwrap();
    program.add_function(main);

    let mut vm = Vm::new(program.build().unwrap(), opcodes, options()).unwrap();
    let err = vm.run().unwrap_err();
    assert!(matches!(
        err.root(),
        Error::IndexOutOfRange { index: 3, length: 1 }
    ));
    assert_eq!(err.location(), Some(&SourceLoc::new("main.go", 12)));
    assert_eq!(vm.depth(), 0);
}

#[test]
fn test_e2e_struct_fields_through_array() {
    let opcodes = OpcodeTable::new();
    let identity = opcodes.operator("identity").unwrap();
    let mut program = ProgramBuilder::new();
    program
        .define_struct("Point", &[("x", TypeKind::I32), ("y", TypeKind::I32)])
        .unwrap();
    let seven = program.literal(Value::I32(7), TypeKind::I32).unwrap();
    let points = TypeKind::array_of(TypeKind::Struct("Point".into()), 3);

    let mut main = FunctionBuilder::new("main", "main")
        .returns("y", TypeKind::I32)
        .local("ps", points);
    main.push(
        Expression::op(identity.clone())
            .input(seven)
            .output(arg("ps").index(2).field("y")),
    );
    main.push(
        Expression::op(identity)
            .input(arg("ps").index(2).field("y"))
            .output(arg("y")),
    );
    let main = main.build(&program).unwrap();
    program.add_function(main);

    let mut vm = Vm::new(program.build().unwrap(), opcodes, options()).unwrap();
    assert_eq!(vm.run().unwrap()[0], 7i32.to_le_bytes().to_vec());
}

// =============================================================================
// CALLBACKS
// =============================================================================

#[test]
fn test_e2e_callbacks_run_between_nodes() {
    let opcodes = OpcodeTable::new();
    let add = opcodes.operator("i64.add").unwrap();
    let identity = opcodes.operator("identity").unwrap();
    let mut program = ProgramBuilder::new();
    let one = program.literal(Value::I64(1), TypeKind::I64).unwrap();
    let hits = program.global("main", "hits", TypeKind::I64).unwrap();

    let mut on_event = FunctionBuilder::new("main", "on_event").param("code", TypeKind::I32);
    on_event.push(Expression::op(add).input(arg("hits")).input(one.clone()).output(arg("hits")));
    let on_event = on_event.build(&program).unwrap();
    program.add_function(on_event);

    let mut main = FunctionBuilder::new("main", "main").local("scratch", TypeKind::I64);
    main.push(Expression::op(identity).input(one).output(arg("scratch")));
    let main = main.build(&program).unwrap();
    program.add_function(main);

    let queue = CallbackQueue::new();
    queue.push(PendingCallback {
        package: "main".into(),
        function: "on_event".into(),
        args: vec![7i32.to_le_bytes().to_vec()],
    });
    queue.push(PendingCallback {
        package: "main".into(),
        function: "missing".into(),
        args: vec![],
    });

    let mut vm = Vm::new(program.build().unwrap(), opcodes, options())
        .unwrap()
        .with_callbacks(queue.clone());
    vm.run().unwrap();

    assert!(queue.is_empty());
    assert_eq!(vm.read_argument(0, &hits).unwrap(), Value::I64(1));
}
