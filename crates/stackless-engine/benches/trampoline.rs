use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use stackless_engine::ir::{BinaryOp, Builtin, Constant, Link, Operand};
use stackless_engine::transform::CallGraphOracle;
use stackless_engine::{transform_program, FunctionBuilder, Machine, Program, Type, Value};

fn int(v: i64) -> Operand {
    Operand::Const(Constant::I64(v))
}

/// rec(n): suspends at the bottom of n nested calls, then adds them up
fn recursive() -> Program {
    let mut program = Program::new("recursive");
    let mut b = FunctionBuilder::new("rec", vec![Type::I64], Type::I64);
    let n = b.params()[0];
    let (base, _) = b.create_block(&[]);
    let (rec, rec_params) = b.create_block(&[Type::I64]);
    let is_zero = b.binary(BinaryOp::Eq, n, int(0));
    b.branch(is_zero, Link::to(base), Link::new(rec, vec![n.into()]));

    b.switch_to_block(base);
    b.call_builtin(Builtin::StackUnwind, vec![], Type::Void);
    b.ret(int(0));

    b.switch_to_block(rec);
    let n = rec_params[0];
    let m = b.binary(BinaryOp::Sub, n, int(1));
    let r = b.call("rec", vec![m.into()], Type::I64);
    let s = b.binary(BinaryOp::Add, r, n);
    b.ret(s);
    program.add_function(b.build());
    program
}

fn bench_unwind_and_resume(c: &mut Criterion) {
    let program = recursive();
    let oracle = CallGraphOracle::new(&program);
    let transformed = transform_program(program, &oracle).unwrap();
    transformed.install();
    let machine = Machine::new(transformed.program);

    let mut group = c.benchmark_group("unwind_resume");
    for depth in [10i64, 100, 500] {
        group.bench_with_input(BenchmarkId::new("depth", depth), &depth, |b, &depth| {
            b.iter(|| machine.run("rec", vec![Value::I64(black_box(depth))]).unwrap());
        });
    }
    group.finish();
}

fn bench_transform(c: &mut Criterion) {
    c.bench_function("transform_recursive", |b| {
        b.iter(|| {
            let program = recursive();
            let oracle = CallGraphOracle::new(&program);
            transform_program(black_box(program), &oracle).unwrap()
        });
    });
}

criterion_group!(benches, bench_unwind_and_resume, bench_transform);
criterion_main!(benches);
