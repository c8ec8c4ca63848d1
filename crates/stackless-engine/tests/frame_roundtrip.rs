//! Frame capture properties
//!
//! - Saving and resuming at a suspend point gives back bit-identical values
//!   for every storage class
//! - Capture sites with the same classes share one frame type and save routine

use std::cell::RefCell;
use std::rc::Rc;

use proptest::prelude::*;

use stackless_engine::ir::{Builtin, OpKind, Operand};
use stackless_engine::transform::{AllCalls, CallGraphOracle};
use stackless_engine::value::GcObject;
use stackless_engine::{
    transform_program, FunctionBuilder, GcRef, Machine, Program, StorageClass, Type, Value,
};

// =============================================================================
// HELPER FUNCTIONS
// =============================================================================

fn param_types() -> Vec<Type> {
    vec![
        Type::I64,
        Type::F64,
        Type::I128,
        Type::Bool,
        Type::Char,
        Type::I32,
        Type::U64,
        Type::Addr,
        Type::Ref("box".into()),
    ]
}

/// rt(..): allocates an object, suspends, then records every parameter
/// and the object
fn roundtrip_program() -> Program {
    let mut program = Program::new("roundtrip");
    let mut b = FunctionBuilder::new("rt", param_types(), Type::Void);
    let params = b.params();
    let fresh = b.new_object("cell", vec![params[0].into()]);
    b.call_builtin(Builtin::StackUnwind, vec![], Type::Void);
    let mut recorded: Vec<Operand> = params.iter().map(|&p| p.into()).collect();
    recorded.push(fresh.into());
    b.call_host("record", recorded, Type::Void);
    b.ret_void();
    program.add_function(b.build());
    program
}

fn save_ops(program: &Program, name: &str) -> Vec<(u32, u32)> {
    program
        .function_by_name(name)
        .unwrap()
        .blocks
        .iter()
        .flat_map(|b| &b.ops)
        .filter_map(|op| match &op.kind {
            OpKind::SaveFrame {
                frame_type, routine, ..
            } => Some((frame_type.0, routine.0)),
            _ => None,
        })
        .collect()
}

// =============================================================================
// ROUND TRIP
// =============================================================================

proptest! {
    #[test]
    fn prop_roundtrip_preserves_every_class(
        a in any::<i64>(),
        bits in any::<u64>(),
        c in any::<i128>(),
        d in any::<bool>(),
        e in any::<char>(),
        f in any::<i32>(),
        g in any::<u64>(),
        h in any::<usize>(),
    ) {
        let program = roundtrip_program();
        let oracle = CallGraphOracle::new(&program);
        let transformed = transform_program(program, &oracle).unwrap();
        transformed.install();

        let sink: Rc<RefCell<Vec<Value>>> = Rc::default();
        let out = sink.clone();
        let machine = Machine::new(transformed.program).with_host("record", move |args| {
            out.borrow_mut().extend(args.iter().cloned());
            Ok(Value::Void)
        });

        let boxed = Rc::new(GcObject {
            type_name: "box".into(),
            fields: RefCell::new(vec![Value::I64(a)]),
        });
        let args = vec![
            Value::I64(a),
            Value::F64(f64::from_bits(bits)),
            Value::I128(c),
            Value::Bool(d),
            Value::Char(e),
            Value::I32(f),
            Value::U64(g),
            Value::Addr(h),
            Value::Ref(GcRef::Object(boxed.clone())),
        ];

        machine.run("rt", args.clone()).unwrap();
        let recorded = sink.borrow();
        prop_assert_eq!(recorded.len(), args.len() + 1);
        prop_assert_eq!(&recorded[..args.len()], &args[..]);
        match &recorded[1] {
            Value::F64(v) => prop_assert_eq!(v.to_bits(), bits),
            other => prop_assert!(false, "expected f64, got {}", other),
        }
        match &recorded[args.len()] {
            Value::Ref(GcRef::Object(obj)) => {
                prop_assert_eq!(obj.type_name.as_str(), "cell");
                prop_assert_eq!(obj.fields.borrow()[0].clone(), Value::I64(a));
            }
            other => prop_assert!(false, "expected object, got {}", other),
        }
    }
}

#[test]
fn test_roundtrip_frame_covers_all_classes() {
    let program = roundtrip_program();
    let oracle = CallGraphOracle::new(&program);
    let transformed = transform_program(program, &oracle).unwrap();
    let saves = save_ops(&transformed.program, "rt");
    assert_eq!(saves.len(), 1);

    let layout = &transformed.layouts[saves[0].0 as usize];
    assert_eq!(
        layout.classes(),
        vec![
            StorageClass::Int,
            StorageClass::Int,
            StorageClass::Int,
            StorageClass::Int,
            StorageClass::Int,
            StorageClass::Wide,
            StorageClass::Float,
            StorageClass::Addr,
            StorageClass::Ref,
            StorageClass::Ref,
        ]
    );
    assert_eq!(
        layout.save_routine_name(),
        "save_state_long5_longlong1_float1_addr1_ref2"
    );
}

// =============================================================================
// TYPE SHARING
// =============================================================================

/// Three functions capturing {Int, Float} in different orders and types
fn sharing_program() -> Program {
    let mut program = Program::new("sharing");

    let mut leaf = FunctionBuilder::new("leaf", vec![], Type::Void);
    leaf.call_builtin(Builtin::StackUnwind, vec![], Type::Void);
    leaf.ret_void();
    program.add_function(leaf.build());

    for (name, params) in [
        ("a", vec![Type::I64, Type::F64]),
        ("b", vec![Type::Bool, Type::F64]),
        ("c", vec![Type::F64, Type::I32]),
    ] {
        let mut b = FunctionBuilder::new(name, params, Type::Void);
        let p = b.params();
        b.call("leaf", vec![], Type::Void);
        b.call_host("record", vec![p[0].into(), p[1].into()], Type::Void);
        b.ret_void();
        program.add_function(b.build());
    }
    program
}

#[test]
fn test_same_classes_share_frame_type() {
    let transformed = transform_program(sharing_program(), &AllCalls).unwrap();
    let a = save_ops(&transformed.program, "a");
    let b = save_ops(&transformed.program, "b");
    let c = save_ops(&transformed.program, "c");
    assert_eq!(a.len(), 1);
    assert_eq!(a, b);
    assert_eq!(a, c);

    let layout = &transformed.layouts[a[0].0 as usize];
    assert_eq!(layout.classes(), vec![StorageClass::Int, StorageClass::Float]);

    // empty, single reference, {Int, Float}
    assert_eq!(transformed.stats.frame_types, 3);
}

#[test]
fn test_reordered_capture_restores_each_value() {
    let transformed = transform_program(sharing_program(), &AllCalls).unwrap();
    transformed.install();

    let sink: Rc<RefCell<Vec<Value>>> = Rc::default();
    let out = sink.clone();
    let machine = Machine::new(transformed.program).with_host("record", move |args| {
        out.borrow_mut().extend(args.iter().cloned());
        Ok(Value::Void)
    });

    machine
        .run("c", vec![Value::F64(2.5), Value::I32(-7)])
        .unwrap();
    machine
        .run("b", vec![Value::Bool(true), Value::F64(-0.0)])
        .unwrap();
    assert_eq!(
        *sink.borrow(),
        vec![
            Value::F64(2.5),
            Value::I32(-7),
            Value::Bool(true),
            Value::F64(-0.0),
        ]
    );
}
