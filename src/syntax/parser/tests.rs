use super::*;
use crate::syntax::lexer::Lexer;

fn parse(source: &str) -> Arc<FnDecl> {
    let (tokens, lex_errors) = Lexer::new(source, 0).tokenize();
    assert!(lex_errors.is_empty(), "lex errors: {:?}", lex_errors);
    Parser::new(tokens)
        .parse_function_source()
        .unwrap_or_else(|errs| panic!("parse errors: {:?}", errs))
}

fn parse_err(source: &str) -> Vec<String> {
    let (tokens, _) = Lexer::new(source, 0).tokenize();
    match Parser::new(tokens).parse_function_source() {
        Ok(_) => panic!("expected parse failure for {:?}", source),
        Err(errs) => errs.into_iter().map(|d| d.message).collect(),
    }
}

fn body(decl: &FnDecl) -> Vec<Stmt> {
    decl.body.node.stmts.iter().map(|s| s.node.clone()).collect()
}

#[test]
fn test_arrow_kernel_with_annotations() {
    let decl = parse("(n: i32, scale) => { let x = n * scale }");
    assert!(decl.name.is_none());
    assert_eq!(decl.params.len(), 2);
    assert_eq!(decl.params[0].name.node, "n");
    assert_eq!(
        decl.params[0].annotation.as_ref().map(|a| a.node.as_str()),
        Some("i32")
    );
    assert!(decl.params[1].annotation.is_none());
    assert_eq!(decl.body.node.stmts.len(), 1);
}

#[test]
fn test_function_declaration_kernel() {
    let decl = parse("function step(dt: f32) { return dt }");
    assert_eq!(decl.name.as_ref().map(|n| n.node.as_str()), Some("step"));
    assert!(matches!(body(&decl)[0], Stmt::Return(Some(_))));
}

#[test]
fn test_expression_bodied_arrow_returns() {
    let decl = parse("x => x * 2");
    assert_eq!(decl.params.len(), 1);
    match &body(&decl)[0] {
        Stmt::Return(Some(e)) => assert!(matches!(
            e.node,
            Expr::Binary {
                op: BinOp::Mul,
                ..
            }
        )),
        other => panic!("expected return, got {:?}", other),
    }
}

#[test]
fn test_precedence() {
    let decl = parse("() => { let y = 1 + 2 * 3 ** 2 ** 1 < 4 && 5 }");
    let Stmt::Let { init: Some(init), .. } = &body(&decl)[0] else {
        panic!("expected let");
    };
    // && binds loosest
    let Expr::Binary { op, lhs, .. } = &init.node else {
        panic!("expected binary");
    };
    assert_eq!(*op, BinOp::LogicalAnd);
    let Expr::Binary { op, lhs, .. } = &lhs.node else {
        panic!("expected comparison");
    };
    assert_eq!(*op, BinOp::Lt);
    let Expr::Binary { op, rhs, .. } = &lhs.node else {
        panic!("expected add");
    };
    assert_eq!(*op, BinOp::Add);
    let Expr::Binary { op, rhs, .. } = &rhs.node else {
        panic!("expected mul");
    };
    assert_eq!(*op, BinOp::Mul);
    // ** is right-associative
    let Expr::Binary { op, rhs, .. } = &rhs.node else {
        panic!("expected pow");
    };
    assert_eq!(*op, BinOp::Pow);
    assert!(matches!(rhs.node, Expr::Binary { op: BinOp::Pow, .. }));
}

#[test]
fn test_unary_minus_binds_looser_than_pow() {
    let decl = parse("() => { let y = -x ** 2 }");
    let Stmt::Let { init: Some(init), .. } = &body(&decl)[0] else {
        panic!("expected let");
    };
    let Expr::Unary { op, operand } = &init.node else {
        panic!("expected unary");
    };
    assert_eq!(*op, UnOp::Neg);
    assert!(matches!(operand.node, Expr::Binary { op: BinOp::Pow, .. }));
}

#[test]
fn test_for_of_range_and_destructure() {
    let decl = parse(
        "() => {
            for (let i of range(10)) { x[i] = i }
            for (let [i, j] of ti.ndrange(4, 4)) { }
        }",
    );
    let stmts = body(&decl);
    let Stmt::For { binding, iter, .. } = &stmts[0] else {
        panic!("expected for");
    };
    assert!(matches!(binding, ForBinding::Name(n) if n.node == "i"));
    assert!(matches!(iter.node, Expr::Call { .. }));
    let Stmt::For { binding, .. } = &stmts[1] else {
        panic!("expected for");
    };
    assert!(matches!(binding, ForBinding::Destructure(names) if names.len() == 2));
}

#[test]
fn test_assignments_and_compound_ops() {
    let decl = parse("() => { a = 1; b[0, 1] += 2; c.x -= 3; d *= 4 }");
    let ops: Vec<AssignOp> = body(&decl)
        .into_iter()
        .map(|s| match s {
            Stmt::Assign { op, .. } => op,
            other => panic!("expected assignment, got {:?}", other),
        })
        .collect();
    assert_eq!(
        ops,
        vec![AssignOp::Assign, AssignOp::Add, AssignOp::Sub, AssignOp::Mul]
    );
}

#[test]
fn test_multi_index_and_method_call() {
    let decl = parse("() => { let v = m[1, 2] + p.norm() }");
    let Stmt::Let { init: Some(init), .. } = &body(&decl)[0] else {
        panic!("expected let");
    };
    let Expr::Binary { lhs, rhs, .. } = &init.node else {
        panic!("expected binary");
    };
    assert!(matches!(&lhs.node, Expr::Index { indices, .. } if indices.len() == 2));
    let Expr::Call { callee, args } = &rhs.node else {
        panic!("expected call");
    };
    assert!(args.is_empty());
    assert_eq!(callee.node.dotted_path().as_deref(), Some("p.norm"));
}

#[test]
fn test_object_and_array_literals() {
    let decl = parse("() => { let s = { pos: [1, 2], vel }; let m = [[1, 0], [0, 1]] }");
    let stmts = body(&decl);
    let Stmt::Let { init: Some(obj), .. } = &stmts[0] else {
        panic!("expected let");
    };
    let Expr::Object(fields) = &obj.node else {
        panic!("expected object");
    };
    assert_eq!(fields.len(), 2);
    assert!(matches!(&fields[1].1.node, Expr::Var(v) if v == "vel"));
    let Stmt::Let { init: Some(arr), .. } = &stmts[1] else {
        panic!("expected let");
    };
    assert!(matches!(&arr.node, Expr::Array(rows) if rows.len() == 2));
}

#[test]
fn test_nested_arrow_and_conditional() {
    let decl = parse("() => { let f = (a, b) => a > b ? a : b; let g = f(1, 2) }");
    let stmts = body(&decl);
    let Stmt::Let { init: Some(f), .. } = &stmts[0] else {
        panic!("expected let");
    };
    let Expr::Arrow(inner) = &f.node else {
        panic!("expected arrow");
    };
    assert_eq!(inner.params.len(), 2);
    let Stmt::Return(Some(ret)) = &inner.body.node.stmts[0].node else {
        panic!("expected return");
    };
    assert!(matches!(ret.node, Expr::Conditional { .. }));
}

#[test]
fn test_if_else_while_break_continue() {
    let decl = parse(
        "() => {
            while (i < 10) { if (i == 5) { break } else continue; }
        }",
    );
    let Stmt::While { body: wbody, .. } = &body(&decl)[0] else {
        panic!("expected while");
    };
    let Stmt::Block(block) = &wbody.node else {
        panic!("expected block");
    };
    let Stmt::If { else_branch, .. } = &block.stmts[0].node else {
        panic!("expected if");
    };
    assert!(matches!(
        else_branch.as_ref().map(|s| &s.node),
        Some(Stmt::Continue)
    ));
}

#[test]
fn test_c_style_for_is_rejected() {
    let errs = parse_err("() => { for (let i = 0; i < 4; i = i + 1) { } }");
    assert!(errs.iter().any(|m| m.contains("expected 'of'")));
}

#[test]
fn test_missing_function_is_rejected() {
    let errs = parse_err("let x = 1");
    assert!(errs[0].contains("expected a kernel function"));
}

#[test]
fn test_trailing_tokens_are_rejected() {
    let errs = parse_err("() => {} extra");
    assert!(errs.iter().any(|m| m.contains("after the kernel function")));
}
