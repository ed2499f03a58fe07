use std::sync::Arc;

use arenavm::{
    Argument, Expression, FunctionBuilder, Operator, OpcodeTable, ProgramBuilder, TypeKind, Value,
    Vm, VmOptions,
};
use criterion::{black_box, criterion_group, criterion_main, Criterion};

/// `sum := 0; for i := 1; i <= n; i++ { sum += i }` as a jump loop
fn sum_loop(n: i64) -> (arenavm::Program, OpcodeTable) {
    let opcodes = OpcodeTable::new();
    let identity = opcodes.operator("identity").unwrap();
    let add = opcodes.operator("i64.add").unwrap();
    let gt = opcodes.operator("i64.gt").unwrap();
    let mut program = ProgramBuilder::new();
    let one = program.literal(Value::I64(1), TypeKind::I64).unwrap();
    let limit = program.literal(Value::I64(n), TypeKind::I64).unwrap();
    let arg = Argument::new;

    let mut main = FunctionBuilder::new("main", "main")
        .returns("sum", TypeKind::I64)
        .local("i", TypeKind::I64)
        .local("done", TypeKind::Bool);
    main.push(Expression::op(identity).input(one.clone()).output(arg("i")));
    main.push(Expression::op(gt).input(arg("i")).input(limit).output(arg("done")));
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

    (program.build().unwrap(), opcodes)
}

fn loop_benchmark(c: &mut Criterion) {
    let (program, opcodes) = sum_loop(1_000);
    let program = Arc::new(program);
    let opcodes = Arc::new(opcodes);

    c.bench_function("jump loop 1000 iterations", |b| {
        b.iter(|| {
            let mut vm =
                Vm::new(Arc::clone(&program), Arc::clone(&opcodes), VmOptions::default()).unwrap();
            black_box(vm.run().unwrap())
        })
    });
}

fn append_benchmark(c: &mut Criterion) {
    let opcodes = OpcodeTable::new();
    let append = opcodes.operator("[]i64.append").unwrap();
    let mut program = ProgramBuilder::new();
    let seven = program.literal(Value::I64(7), TypeKind::I64).unwrap();
    let xs = program
        .global("main", "xs", TypeKind::slice_of(TypeKind::I64))
        .unwrap();
    let node = Expression::op(append).input(xs.clone()).input(seven).output(xs);
    let program = Arc::new(program.build().unwrap());
    let opcodes = Arc::new(opcodes);

    c.bench_function("slice append 100 elements", |b| {
        b.iter(|| {
            let mut vm =
                Vm::new(Arc::clone(&program), Arc::clone(&opcodes), VmOptions::default()).unwrap();
            for _ in 0..100 {
                vm.execute_node(0, black_box(&node)).unwrap();
            }
        })
    });
}

criterion_group!(benches, loop_benchmark, append_benchmark);
criterion_main!(benches);
