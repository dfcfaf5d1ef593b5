//! Hand-written IR programs shared by the integration tests

#![allow(dead_code)]

use std::sync::Arc;

use strata_engine::{
    BinOpKind, CallTarget, EngineConfig, Instr, IrScope, Operand, Runtime, ScopeBuilder, Value,
};

/// `mul(a, b) = a * b`
pub fn mul() -> IrScope {
    let mut b = ScopeBuilder::method("mul");
    let (x, y, r) = (b.temp(), b.temp(), b.temp());
    b.emit(Instr::ReceiveArg { dest: x.into(), index: 0 });
    b.emit(Instr::ReceiveArg { dest: y.into(), index: 1 });
    b.emit(Instr::BinOp {
        dest: r.into(),
        op: BinOpKind::Mul,
        lhs: x.into(),
        rhs: y.into(),
    });
    b.emit(Instr::Return(r.into()));
    b.signature(2, 0).finish()
}

/// `sum_to(n)`: 0 + 1 + ... + (n - 1) in a loop over locals, with a dead
/// computation in the body
pub fn sum_to() -> IrScope {
    let mut b = ScopeBuilder::method("sum_to");
    let n = b.temp();
    let (cond, dead) = (b.temp(), b.temp());
    let total = b.local("total");
    let i = b.local("i");
    let (head, done) = (b.label(), b.label());
    b.emit(Instr::ReceiveArg { dest: n.into(), index: 0 });
    b.emit(Instr::Copy { dest: total.clone().into(), src: Operand::Int(0) });
    b.emit(Instr::Copy { dest: i.clone().into(), src: Operand::Int(0) });
    b.emit(Instr::Label(head.clone()));
    b.emit(Instr::BinOp {
        dest: cond.into(),
        op: BinOpKind::Lt,
        lhs: i.clone().into(),
        rhs: n.into(),
    });
    b.emit(Instr::Branch { cond: cond.into(), when: false, target: done.clone() });
    b.emit(Instr::BinOp {
        dest: dead.into(),
        op: BinOpKind::Mul,
        lhs: i.clone().into(),
        rhs: Operand::Int(100),
    });
    b.emit(Instr::BinOp {
        dest: total.clone().into(),
        op: BinOpKind::Add,
        lhs: total.clone().into(),
        rhs: i.clone().into(),
    });
    b.emit(Instr::BinOp {
        dest: i.clone().into(),
        op: BinOpKind::Add,
        lhs: i.into(),
        rhs: Operand::Int(1),
    });
    b.emit(Instr::Jump(head));
    b.emit(Instr::Label(done));
    b.emit(Instr::Return(total.into()));
    b.signature(1, 0).finish()
}

/// `branchy(x)`: `x * 2` when `x > 10`, else `x + 1`, through a local
/// assigned on both arms of a diamond
pub fn branchy() -> IrScope {
    let mut b = ScopeBuilder::method("branchy");
    let (x, c) = (b.temp(), b.temp());
    let y = b.local("y");
    let (l_else, l_join) = (b.label(), b.label());
    b.emit(Instr::ReceiveArg { dest: x.into(), index: 0 });
    b.emit(Instr::BinOp {
        dest: c.into(),
        op: BinOpKind::Gt,
        lhs: x.into(),
        rhs: Operand::Int(10),
    });
    b.emit(Instr::Branch { cond: c.into(), when: false, target: l_else.clone() });
    b.emit(Instr::BinOp {
        dest: y.clone().into(),
        op: BinOpKind::Mul,
        lhs: x.into(),
        rhs: Operand::Int(2),
    });
    b.emit(Instr::Jump(l_join.clone()));
    b.emit(Instr::Label(l_else));
    b.emit(Instr::BinOp {
        dest: y.clone().into(),
        op: BinOpKind::Add,
        lhs: x.into(),
        rhs: Operand::Int(1),
    });
    b.emit(Instr::Label(l_join));
    b.emit(Instr::Return(y.into()));
    b.signature(1, 0).finish()
}

/// `count_up(n)`: a closure adds each of `0..n` to a captured local via the
/// `times` native
pub fn count_up() -> IrScope {
    let mut outer = ScopeBuilder::method("count_up");
    let count = outer.local("count");

    let mut inner = ScopeBuilder::closure("block in count_up");
    let (arg, sum) = (inner.temp(), inner.temp());
    inner.emit(Instr::ReceiveArg { dest: arg.into(), index: 0 });
    inner.emit(Instr::BinOp {
        dest: sum.into(),
        op: BinOpKind::Add,
        lhs: count.outer().into(),
        rhs: arg.into(),
    });
    inner.emit(Instr::Copy { dest: count.outer().into(), src: sum.into() });
    inner.emit(Instr::Return(sum.into()));
    let idx = outer.add_closure(inner.signature(1, 0).finish());

    let (n, blk) = (outer.temp(), outer.temp());
    outer.emit(Instr::ReceiveArg { dest: n.into(), index: 0 });
    outer.emit(Instr::Copy { dest: count.clone().into(), src: Operand::Int(0) });
    outer.emit(Instr::BuildClosure { dest: blk.into(), closure: idx });
    outer.emit(Instr::Call {
        dest: None,
        target: CallTarget::Native("times".into()),
        args: vec![n.into()],
        block: Some(blk.into()),
    });
    outer.emit(Instr::Return(count.into()));
    outer.signature(1, 0).finish()
}

/// `loop_capture(n)`: each iteration calls a closure that adds `i` to a
/// captured accumulator, then bumps the accumulator directly. Result is
/// `n * (n - 1) / 2 + n`.
pub fn loop_capture() -> IrScope {
    let mut outer = ScopeBuilder::method("loop_capture");
    let acc = outer.local("acc");

    let mut inner = ScopeBuilder::closure("block in loop_capture");
    let (arg, sum) = (inner.temp(), inner.temp());
    inner.emit(Instr::ReceiveArg { dest: arg.into(), index: 0 });
    inner.emit(Instr::BinOp {
        dest: sum.into(),
        op: BinOpKind::Add,
        lhs: acc.outer().into(),
        rhs: arg.into(),
    });
    inner.emit(Instr::Copy { dest: acc.outer().into(), src: sum.into() });
    inner.emit(Instr::Return(Operand::Nil));
    let idx = outer.add_closure(inner.signature(1, 0).finish());

    let (n, i, c, blk) = (outer.temp(), outer.temp(), outer.temp(), outer.temp());
    let (head, done) = (outer.label(), outer.label());
    outer.emit(Instr::ReceiveArg { dest: n.into(), index: 0 });
    outer.emit(Instr::Copy { dest: acc.clone().into(), src: Operand::Int(0) });
    outer.emit(Instr::Copy { dest: i.into(), src: Operand::Int(0) });
    outer.emit(Instr::BuildClosure { dest: blk.into(), closure: idx });
    outer.emit(Instr::Label(head.clone()));
    outer.emit(Instr::BinOp {
        dest: c.into(),
        op: BinOpKind::Lt,
        lhs: i.into(),
        rhs: n.into(),
    });
    outer.emit(Instr::Branch { cond: c.into(), when: false, target: done.clone() });
    outer.emit(Instr::Call {
        dest: None,
        target: CallTarget::Closure(blk.into()),
        args: vec![i.into()],
        block: None,
    });
    outer.emit(Instr::BinOp {
        dest: acc.clone().into(),
        op: BinOpKind::Add,
        lhs: acc.clone().into(),
        rhs: Operand::Int(1),
    });
    outer.emit(Instr::BinOp {
        dest: i.into(),
        op: BinOpKind::Add,
        lhs: i.into(),
        rhs: Operand::Int(1),
    });
    outer.emit(Instr::Jump(head));
    outer.emit(Instr::Label(done));
    outer.emit(Instr::Return(acc.into()));
    outer.signature(1, 0).finish()
}

/// `safe_div(a, b)`: `a / b`, or -1 when the division raises
pub fn safe_div() -> IrScope {
    let mut b = ScopeBuilder::method("safe_div");
    let (x, y, q, e) = (b.temp(), b.temp(), b.temp(), b.temp());
    let rescue = b.label();
    b.emit(Instr::ReceiveArg { dest: x.into(), index: 0 });
    b.emit(Instr::ReceiveArg { dest: y.into(), index: 1 });
    b.emit(Instr::ExceptionRegionStart { rescue: rescue.clone() });
    b.emit(Instr::BinOp {
        dest: q.into(),
        op: BinOpKind::Div,
        lhs: x.into(),
        rhs: y.into(),
    });
    b.emit(Instr::ExceptionRegionEnd);
    b.emit(Instr::Return(q.into()));
    b.emit(Instr::Label(rescue));
    b.emit(Instr::ReceiveException { dest: e.into() });
    b.emit(Instr::Return(Operand::Int(-1)));
    b.signature(2, 0).finish()
}

/// `thrower(msg)`: prints, then raises a runtime error with `msg`
pub fn thrower() -> IrScope {
    let mut b = ScopeBuilder::method("thrower");
    let m = b.temp();
    b.emit(Instr::ReceiveArg { dest: m.into(), index: 0 });
    b.emit(Instr::Call {
        dest: None,
        target: CallTarget::Native("puts".into()),
        args: vec![Operand::from("about to raise")],
        block: None,
    });
    b.emit(Instr::Call {
        dest: None,
        target: CallTarget::Native("raise".into()),
        args: vec![m.into()],
        block: None,
    });
    b.emit(Instr::Return(Operand::Nil));
    b.signature(1, 0).finish()
}

/// `catcher(msg)`: calls `thrower` and returns the rescued exception
pub fn catcher() -> IrScope {
    let mut b = ScopeBuilder::method("catcher");
    let (m, e) = (b.temp(), b.temp());
    let rescue = b.label();
    b.emit(Instr::ReceiveArg { dest: m.into(), index: 0 });
    b.emit(Instr::ExceptionRegionStart { rescue: rescue.clone() });
    b.emit(Instr::Call {
        dest: None,
        target: CallTarget::Method("thrower".into()),
        args: vec![m.into()],
        block: None,
    });
    b.emit(Instr::ExceptionRegionEnd);
    b.emit(Instr::Return(Operand::Nil));
    b.emit(Instr::Label(rescue));
    b.emit(Instr::ReceiveException { dest: e.into() });
    b.emit(Instr::Return(e.into()));
    b.signature(1, 0).finish()
}

/// `uncaught(msg)`: calls `thrower` with no handler
pub fn uncaught() -> IrScope {
    let mut b = ScopeBuilder::method("uncaught");
    let m = b.temp();
    b.emit(Instr::ReceiveArg { dest: m.into(), index: 0 });
    b.emit(Instr::Call {
        dest: None,
        target: CallTarget::Method("thrower".into()),
        args: vec![m.into()],
        block: None,
    });
    b.emit(Instr::Return(Operand::Int(1)));
    b.signature(1, 0).finish()
}

/// Every program above
pub fn corpus() -> Vec<IrScope> {
    vec![
        mul(),
        sum_to(),
        branchy(),
        count_up(),
        loop_capture(),
        safe_div(),
        thrower(),
        catcher(),
        uncaught(),
    ]
}

/// Route engine logs to the test harness; `RUST_LOG=strata_engine=debug`
/// shows promotions
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A runtime with the whole corpus defined
pub fn runtime_with_corpus(config: EngineConfig) -> Arc<Runtime> {
    init_tracing();
    let runtime = Runtime::new(config);
    for scope in corpus() {
        runtime.define_method(scope).unwrap();
    }
    runtime
}

/// Outcome of a call, comparable across runtimes
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome {
    pub result: Result<Value, Value>,
    pub output: Vec<String>,
}

/// Call `name` on a fresh context and capture the outcome
pub fn run(runtime: &Arc<Runtime>, name: &str, args: &[Value]) -> Outcome {
    let mut ctx = runtime.new_context();
    let result = runtime
        .call(&mut ctx, name, args, None)
        .map_err(|raise| raise.exception);
    assert_eq!(ctx.depth(), 0, "frames left behind by {}", name);
    assert_eq!(ctx.scope_depth(), 0, "dynamic scopes left behind by {}", name);
    Outcome {
        result,
        output: ctx.take_output(),
    }
}

/// Calls exercising the corpus: (method, args)
pub fn corpus_calls(a: i64, b: i64) -> Vec<(&'static str, Vec<Value>)> {
    let n = a.rem_euclid(20);
    vec![
        ("mul", vec![Value::Int(a), Value::Int(b)]),
        ("sum_to", vec![Value::Int(n)]),
        ("branchy", vec![Value::Int(a)]),
        ("count_up", vec![Value::Int(n)]),
        ("loop_capture", vec![Value::Int(n)]),
        ("safe_div", vec![Value::Int(a), Value::Int(b)]),
        ("catcher", vec![Value::from("oops")]),
        ("uncaught", vec![Value::from("oops")]),
    ]
}
