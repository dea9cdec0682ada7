use super::*;
use crate::types::{F32, I32};

#[test]
fn test_literal_wgsl_suffixes() {
    assert_eq!(Literal::I32(3).wgsl(), "3i");
    assert_eq!(Literal::I32(-7).wgsl(), "-7i");
    assert_eq!(Literal::U32(3).wgsl(), "3u");
    assert_eq!(Literal::F32(1.5).wgsl(), "1.5f");
    assert_eq!(Literal::F32(2.0).wgsl(), "2.0f");
    assert_eq!(Literal::F32(1e-20).wgsl(), "1e-20f");
    assert_eq!(
        Literal::F32(f32::INFINITY).wgsl(),
        format!("bitcast<f32>({}u)", f32::INFINITY.to_bits())
    );
    assert_eq!(Literal::I32(i32::MIN).wgsl(), "i32(-2147483648)");
}

#[test]
fn test_literal_cast_and_bitcast() {
    assert_eq!(Literal::F32(-2.7).cast(Prim::I32), Literal::I32(-2));
    assert_eq!(Literal::I32(-1).cast(Prim::U32), Literal::U32(u32::MAX));
    assert_eq!(Literal::F32(1.0).bitcast(Prim::U32), Literal::U32(0x3f80_0000));
    assert_eq!(Literal::from_bits(0x3f80_0000, Prim::F32), Literal::F32(1.0));
    assert_eq!(Literal::F32(3.0).as_i64(), Some(3));
    assert_eq!(Literal::F32(3.5).as_i64(), None);
}

#[test]
fn test_fold_arithmetic() {
    let r = fold_binary(BinOp::Add, Literal::I32(2), Literal::I32(3), Prim::I32, Prim::I32);
    assert_eq!(r, Some(Literal::I32(5)));
    let r = fold_binary(BinOp::Div, Literal::I32(7), Literal::I32(2), Prim::F32, Prim::F32);
    assert_eq!(r, Some(Literal::F32(3.5)));
    let r = fold_binary(BinOp::Add, Literal::I32(1), Literal::F32(0.5), Prim::F32, Prim::F32);
    assert_eq!(r, Some(Literal::F32(1.5)));
    let r = fold_binary(BinOp::Add, Literal::I32(i32::MAX), Literal::I32(1), Prim::I32, Prim::I32);
    assert_eq!(r, Some(Literal::I32(i32::MIN)));
}

#[test]
fn test_fold_floor_div_and_mod() {
    let fd = |a, b| fold_binary(BinOp::FloorDiv, Literal::I32(a), Literal::I32(b), Prim::I32, Prim::I32);
    assert_eq!(fd(7, 2), Some(Literal::I32(3)));
    assert_eq!(fd(-7, 2), Some(Literal::I32(-4)));
    assert_eq!(fd(7, 0), None);
    let r = fold_binary(BinOp::Mod, Literal::I32(-7), Literal::I32(3), Prim::I32, Prim::I32);
    assert_eq!(r, Some(Literal::I32(-1)));
}

#[test]
fn test_fold_comparison_and_logic() {
    let r = fold_binary(BinOp::Lt, Literal::F32(0.5), Literal::I32(1), Prim::F32, Prim::I32);
    assert_eq!(r, Some(Literal::I32(1)));
    let r = fold_binary(BinOp::LogicalAnd, Literal::I32(2), Literal::I32(0), Prim::I32, Prim::I32);
    assert_eq!(r, Some(Literal::I32(0)));
    assert_eq!(fold_unary(UnaryOp::Not, Literal::F32(0.0)), Some(Literal::I32(1)));
    assert_eq!(fold_unary(UnaryOp::Neg, Literal::U32(1)), None);
}

fn stmt(id: u32, kind: StmtKind) -> Stmt {
    Stmt { id: StmtId(id), kind }
}

#[test]
fn test_walk_visits_nested_bodies() {
    let body = vec![
        stmt(0, StmtKind::Alloca { ty: I32, hint: "s".into() }),
        stmt(
            1,
            StmtKind::RangeFor {
                begin: Operand::Const(Literal::I32(0)),
                end: Operand::Const(Literal::I32(4)),
                hint: "i".into(),
                body: vec![stmt(
                    2,
                    StmtKind::LocalStore {
                        slot: StmtId(0),
                        indices: vec![],
                        value: Operand::Stmt(StmtId(1)),
                    },
                )],
            },
        ),
    ];
    let mut seen = Vec::new();
    walk(&body, &mut |s| seen.push(s.id.0));
    assert_eq!(seen, vec![0, 1, 2]);
}

#[test]
fn test_shared_slots_become_global_tmps() {
    let alloca = |id, ty| stmt(id, StmtKind::Alloca { ty, hint: "t".into() });
    let store = |id, slot| {
        stmt(
            id,
            StmtKind::LocalStore {
                slot: StmtId(slot),
                indices: vec![],
                value: Operand::Const(Literal::F32(1.0)),
            },
        )
    };
    let mut ir = KernelIr {
        name: "k".into(),
        params: vec![],
        ret: None,
        tasks: vec![
            Task {
                kind: TaskKind::Serial,
                body: vec![alloca(0, F32), alloca(1, Type::Vector(Prim::F32, 3)), store(2, 0), store(3, 1)],
            },
            Task {
                kind: TaskKind::Serial,
                body: vec![store(4, 1)],
            },
        ],
        global_tmps: vec![],
        fields: vec![],
        textures: vec![],
    };
    ir.promote_shared_slots();
    assert_eq!(ir.global_tmps.len(), 1);
    assert_eq!(ir.global_tmps[0].slot, StmtId(1));
    assert_eq!(ir.global_tmps[0].offset, 0);
    assert_eq!(ir.tmps_words(), 3);
}

#[test]
fn test_display_dump() {
    let ir = KernelIr {
        name: "k".into(),
        params: vec![KernelParam { name: "n".into(), ty: I32 }],
        ret: Some(F32),
        tasks: vec![Task {
            kind: TaskKind::Serial,
            body: vec![stmt(
                0,
                StmtKind::Return {
                    value: Operand::Const(Literal::F32(1.0)),
                    ty: F32,
                },
            )],
        }],
        global_tmps: vec![],
        fields: vec![],
        textures: vec![],
    };
    let text = ir.to_string();
    assert!(text.starts_with("kernel k(n: i32) -> f32"));
    assert!(text.contains("task 0 serial {"));
    assert!(text.contains("return 1.0f : f32"));
}
