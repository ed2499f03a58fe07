/// Integration tests for the windowing adapter
/// A program opens a headless window, registers callbacks and polls; scripted host
/// events must come back as calls into user functions on the evaluator thread
use arenavm::adapters::window::{HeadlessControl, HeadlessHost, WindowAdapter};
use arenavm::{
    Argument, CallbackQueue, Expression, FunctionBuilder, OpcodeTable, ProgramBuilder, TypeKind,
    Value, Vm, VmOptions,
};

fn options() -> VmOptions {
    VmOptions {
        stack_size: 4096,
        initial_heap_size: 1024,
        max_memory: 1 << 20,
        ..VmOptions::default()
    }
}

fn arg(name: &str) -> Argument {
    Argument::new(name)
}

struct Harness {
    vm: Vm,
    control: HeadlessControl,
    last_key: Argument,
    width: Argument,
}

/// Builds a program whose `main` opens window "main", registers `on_key` and
/// `on_size`, then polls once. `poll` polls again.
fn harness(script: impl FnOnce(&HeadlessControl)) -> Harness {
    let (host, control) = HeadlessHost::new();
    let queue = CallbackQueue::new();
    let adapter = WindowAdapter::new(host, queue.clone());
    let mut opcodes = OpcodeTable::new();
    adapter.register(&mut opcodes);

    let mut program = ProgramBuilder::new();
    let last_key = program.global("main", "last_key", TypeKind::I32).unwrap();
    let width = program.global("main", "width", TypeKind::I32).unwrap();
    let name = program.literal(Value::Str("main".into()), TypeKind::Str).unwrap();
    let title = program.literal(Value::Str("Demo".into()), TypeKind::Str).unwrap();
    let w = program.literal(Value::I32(640), TypeKind::I32).unwrap();
    let h = program.literal(Value::I32(480), TypeKind::I32).unwrap();
    let on_key_name = program.literal(Value::Str("on_key".into()), TypeKind::Str).unwrap();
    let on_size_name = program.literal(Value::Str("on_size".into()), TypeKind::Str).unwrap();
    let package = program.literal(Value::Str("main".into()), TypeKind::Str).unwrap();

    let identity = opcodes.operator("identity").unwrap();

    let mut on_key = FunctionBuilder::new("main", "on_key")
        .param("win", TypeKind::I32)
        .param("key", TypeKind::I32)
        .param("scancode", TypeKind::I32)
        .param("action", TypeKind::I32)
        .param("mods", TypeKind::I32);
    on_key.push(Expression::op(identity.clone()).input(arg("key")).output(arg("last_key")));
    let on_key = on_key.build(&program).unwrap();
    program.add_function(on_key);

    let mut on_size = FunctionBuilder::new("main", "on_size")
        .param("win", TypeKind::I32)
        .param("w", TypeKind::I32)
        .param("h", TypeKind::I32);
    on_size.push(Expression::op(identity).input(arg("w")).output(arg("width")));
    let on_size = on_size.build(&program).unwrap();
    program.add_function(on_size);

    let mut poll = FunctionBuilder::new("main", "poll");
    poll.push(Expression::op(opcodes.operator("window.poll_events").unwrap()));
    let poll = poll.build(&program).unwrap();
    program.add_function(poll);

    let mut main = FunctionBuilder::new("main", "main").local("handle", TypeKind::I32);
    main.push(
        Expression::op(opcodes.operator("window.create").unwrap())
            .input(name.clone())
            .input(w)
            .input(h)
            .input(title)
            .output(arg("handle")),
    );
    main.push(
        Expression::op(opcodes.operator("window.set_key_callback").unwrap())
            .input(name.clone())
            .input(on_key_name),
    );
    main.push(
        Expression::op(opcodes.operator("window.set_size_callback").unwrap())
            .input(name)
            .input(on_size_name)
            .input(package),
    );
    main.push(Expression::op(opcodes.operator("window.poll_events").unwrap()));
    let main = main.build(&program).unwrap();
    program.add_function(main);

    script(&control);

    let vm = Vm::new(program.build().unwrap(), opcodes, options())
        .unwrap()
        .with_callbacks(queue);
    Harness {
        vm,
        control,
        last_key,
        width,
    }
}

#[test]
fn test_window_key_event_reaches_user_function() {
    let mut h = harness(|control| control.key(1, 65, 30, 1, 0));
    h.vm.run().unwrap();

    assert_eq!(h.control.window_count(), 1);
    assert_eq!(h.control.title(1).unwrap(), "Demo");
    assert_eq!(h.vm.read_argument(0, &h.last_key).unwrap(), Value::I32(65));
    assert!(h.vm.callbacks().is_empty());
}

#[test]
fn test_window_resize_reaches_user_function() {
    let mut h = harness(|_| {});
    h.vm.run().unwrap();
    assert_eq!(h.vm.read_argument(0, &h.width).unwrap(), Value::I32(0));

    h.control.resize(1, 800, 600).unwrap();
    h.control.key(1, 81, 16, 1, 0);
    h.vm.call("main", "poll", &[]).unwrap();

    assert_eq!(h.vm.read_argument(0, &h.width).unwrap(), Value::I32(800));
    assert_eq!(h.vm.read_argument(0, &h.last_key).unwrap(), Value::I32(81));
}

#[test]
fn test_window_events_without_callbacks_are_ignored() {
    let mut h = harness(|control| control.key(7, 65, 30, 1, 0));
    h.vm.run().unwrap();
    assert_eq!(h.vm.read_argument(0, &h.last_key).unwrap(), Value::I32(0));
}
