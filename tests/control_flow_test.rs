// mathvm - Control flow tests

//! Integration tests for conditionals, loops and the logical operators.

mod common;

use common::*;

fn counter_fn() -> FunctionDef {
    // int bump() { calls += 1; return 1; }
    FunctionDef::new(
        "bump",
        VarType::Int,
        vec![],
        Block::new(vec![
            Stmt::store("calls", AssignOp::AddAssign, Expr::int(1)),
            Stmt::ret(Some(Expr::int(1))),
        ]),
    )
}

#[test]
fn test_if_else() {
    let branch = |cond: Expr| {
        program(
            vec![],
            vec![Stmt::if_else(
                cond,
                Block::new(vec![print(Expr::string("then"))]),
                Some(Block::new(vec![print(Expr::string("else"))])),
            )],
        )
    };
    assert_eq!(run_ok(&branch(Expr::int(1))), "then");
    assert_eq!(run_ok(&branch(Expr::int(0))), "else");
    assert_eq!(run_ok(&branch(Expr::double(0.0))), "else");
    assert_eq!(run_ok(&branch(Expr::double(-0.5))), "then");
    assert_eq!(run_ok(&branch(Expr::string(""))), "else");
    assert_eq!(run_ok(&branch(Expr::string("x"))), "then");
}

#[test]
fn test_if_without_else() {
    let program = program(
        vec![],
        vec![
            Stmt::if_else(
                bin(BinaryOp::Greater, Expr::int(1), Expr::int(2)),
                Block::new(vec![print(Expr::string("no"))]),
                None,
            ),
            print(Expr::string("done")),
        ],
    );
    assert_eq!(run_ok(&program), "done");
}

#[test]
fn test_while_loop() {
    // i = 0; while (i < 5) { print(i); i += 1; }
    let program = program(
        vec![int("i")],
        vec![
            Stmt::assign("i", Expr::int(0)),
            Stmt::while_loop(
                bin(BinaryOp::Less, Expr::load("i"), Expr::int(5)),
                Block::new(vec![
                    print(Expr::load("i")),
                    Stmt::store("i", AssignOp::AddAssign, Expr::int(1)),
                ]),
            ),
        ],
    );
    assert_eq!(run_ok(&program), "01234");
}

#[test]
fn test_for_loop_is_inclusive() {
    let program = program(
        vec![int("i"), int("sum")],
        vec![
            Stmt::for_loop(
                "i",
                Expr::range(Expr::int(1), Expr::int(10)),
                Block::new(vec![Stmt::store("sum", AssignOp::AddAssign, Expr::load("i"))]),
            ),
            print(Expr::load("sum")),
        ],
    );
    assert_eq!(run_ok(&program), "55");
}

#[test]
fn test_for_loop_upper_bound_at_int_max() {
    // The count guard stops a runaway loop instead of hanging the test
    let program = program(
        vec![int("i"), int("count")],
        vec![
            Stmt::for_loop(
                "i",
                Expr::range(Expr::int(i64::MAX - 1), Expr::int(i64::MAX)),
                Block::new(vec![
                    Stmt::store("count", AssignOp::AddAssign, Expr::int(1)),
                    Stmt::if_else(
                        bin(BinaryOp::Greater, Expr::load("count"), Expr::int(2)),
                        Block::new(vec![Stmt::ret(None)]),
                        None,
                    ),
                ]),
            ),
            Stmt::print(vec![Expr::load("count"), Expr::string(" "), Expr::load("i")]),
        ],
    );
    assert_eq!(run_ok(&program), format!("2 {}", i64::MAX));
}

#[test]
fn test_for_loop_empty_range() {
    let program = program(
        vec![int("i")],
        vec![
            Stmt::for_loop(
                "i",
                Expr::range(Expr::int(3), Expr::int(1)),
                Block::new(vec![print(Expr::string("body"))]),
            ),
            print(Expr::string("after")),
        ],
    );
    assert_eq!(run_ok(&program), "after");
}

#[test]
fn test_for_loop_bounds_evaluated_once() {
    // for (i in 1..n) { n -= 1; } runs with the original n
    let program = program(
        vec![int("i"), int("n"), int("count")],
        vec![
            Stmt::assign("n", Expr::int(4)),
            Stmt::for_loop(
                "i",
                Expr::range(Expr::int(1), Expr::load("n")),
                Block::new(vec![
                    Stmt::store("n", AssignOp::SubAssign, Expr::int(1)),
                    Stmt::store("count", AssignOp::AddAssign, Expr::int(1)),
                ]),
            ),
            print(Expr::load("count")),
        ],
    );
    assert_eq!(run_ok(&program), "4");
}

#[test]
fn test_nested_loops() {
    let program = program(
        vec![int("i"), int("j")],
        vec![Stmt::for_loop(
            "i",
            Expr::range(Expr::int(1), Expr::int(3)),
            Block::new(vec![
                Stmt::for_loop(
                    "j",
                    Expr::range(Expr::int(1), Expr::load("i")),
                    Block::new(vec![print(Expr::load("j"))]),
                ),
                print(Expr::string(";")),
            ]),
        )],
    );
    assert_eq!(run_ok(&program), "1;12;123;");
}

#[test]
fn test_logical_results_are_zero_or_one() {
    assert_eq!(eval(bin(BinaryOp::And, Expr::int(5), Expr::int(7))).unwrap(), "1");
    assert_eq!(eval(bin(BinaryOp::And, Expr::int(5), Expr::int(0))).unwrap(), "0");
    assert_eq!(eval(bin(BinaryOp::Or, Expr::int(0), Expr::int(-3))).unwrap(), "1");
    assert_eq!(eval(bin(BinaryOp::Or, Expr::int(0), Expr::double(0.0))).unwrap(), "0");
    assert_eq!(eval(Expr::unary(UnaryOp::Not, Expr::int(9))).unwrap(), "0");
    assert_eq!(eval(Expr::unary(UnaryOp::Not, Expr::int(0))).unwrap(), "1");
    assert_eq!(eval(Expr::unary(UnaryOp::Not, Expr::string(""))).unwrap(), "1");
}

#[test]
fn test_and_short_circuits() {
    let program = program_with_functions(
        vec![int("calls")],
        vec![counter_fn()],
        vec![
            print(bin(BinaryOp::And, Expr::int(0), Expr::call("bump", vec![]))),
            print(bin(BinaryOp::And, Expr::int(1), Expr::call("bump", vec![]))),
            print(Expr::load("calls")),
        ],
    );
    assert_eq!(run_ok(&program), "011");
}

#[test]
fn test_or_short_circuits() {
    let program = program_with_functions(
        vec![int("calls")],
        vec![counter_fn()],
        vec![
            print(bin(BinaryOp::Or, Expr::int(2), Expr::call("bump", vec![]))),
            print(bin(BinaryOp::Or, Expr::int(0), Expr::call("bump", vec![]))),
            print(Expr::load("calls")),
        ],
    );
    assert_eq!(run_ok(&program), "111");
}

#[test]
fn test_return_from_top_stops() {
    let program = program(
        vec![],
        vec![
            print(Expr::string("a")),
            Stmt::ret(None),
            print(Expr::string("b")),
        ],
    );
    assert_eq!(run_ok(&program), "a");
}
