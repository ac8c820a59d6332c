// mathvm - Function, scope and native call tests

mod common;

use common::*;
use mathvm_core::compiler::ConstantPool;
use mathvm_core::vm::{register_native, Value};

fn fact() -> FunctionDef {
    // int fact(int n) { if (n <= 1) { return 1; } return n * fact(n - 1); }
    FunctionDef::new(
        "fact",
        VarType::Int,
        vec![Param::new("n", VarType::Int)],
        Block::new(vec![
            Stmt::if_else(
                bin(BinaryOp::LessEqual, Expr::load("n"), Expr::int(1)),
                Block::new(vec![Stmt::ret(Some(Expr::int(1)))]),
                None,
            ),
            Stmt::ret(Some(bin(
                BinaryOp::Mul,
                Expr::load("n"),
                Expr::call("fact", vec![bin(BinaryOp::Sub, Expr::load("n"), Expr::int(1))]),
            ))),
        ]),
    )
}

fn fib() -> FunctionDef {
    let n = || Expr::load("n");
    let call = |k: i64| Expr::call("fib", vec![bin(BinaryOp::Sub, n(), Expr::int(k))]);
    FunctionDef::new(
        "fib",
        VarType::Int,
        vec![Param::new("n", VarType::Int)],
        Block::new(vec![
            Stmt::if_else(
                bin(BinaryOp::Less, n(), Expr::int(2)),
                Block::new(vec![Stmt::ret(Some(n()))]),
                None,
            ),
            Stmt::ret(Some(bin(BinaryOp::Add, call(1), call(2)))),
        ]),
    )
}

fn native(name: &str, ret: VarType, params: Vec<Param>, native_name: &str) -> FunctionDef {
    FunctionDef::new(name, ret, params, Block::new(vec![Stmt::native(native_name)]))
}

#[test]
fn test_recursive_factorial() {
    let program = program_with_functions(
        vec![],
        vec![fact()],
        vec![print(Expr::call("fact", vec![Expr::int(5)]))],
    );
    assert_eq!(run_ok(&program), "120");
}

#[test]
fn test_recursive_fibonacci() {
    let program = program_with_functions(
        vec![],
        vec![fib()],
        vec![print(Expr::call("fib", vec![Expr::int(10)]))],
    );
    assert_eq!(run_ok(&program), "55");
}

#[test]
fn test_parameters_bind_in_order() {
    // int diff(int a, int b) { return a - b; }
    let diff = FunctionDef::new(
        "diff",
        VarType::Int,
        vec![Param::new("a", VarType::Int), Param::new("b", VarType::Int)],
        Block::new(vec![Stmt::ret(Some(bin(
            BinaryOp::Sub,
            Expr::load("a"),
            Expr::load("b"),
        )))]),
    );
    let program = program_with_functions(
        vec![],
        vec![diff],
        vec![print(Expr::call("diff", vec![Expr::int(10), Expr::int(3)]))],
    );
    assert_eq!(run_ok(&program), "7");
}

#[test]
fn test_arguments_are_converted() {
    // double half(double x) { return x / 2; }
    let half = FunctionDef::new(
        "half",
        VarType::Double,
        vec![Param::new("x", VarType::Double)],
        Block::new(vec![Stmt::ret(Some(bin(
            BinaryOp::Div,
            Expr::load("x"),
            Expr::int(2),
        )))]),
    );
    let program = program_with_functions(
        vec![],
        vec![half],
        vec![print(Expr::call("half", vec![Expr::int(5)]))],
    );
    assert_eq!(run_ok(&program), "2.5");
}

#[test]
fn test_missing_return_yields_zero() {
    let nothing = FunctionDef::new("nothing", VarType::Int, vec![], Block::new(vec![]));
    let program = program_with_functions(
        vec![],
        vec![nothing],
        vec![print(Expr::call("nothing", vec![]))],
    );
    assert_eq!(run_ok(&program), "0");
}

#[test]
fn test_void_call_as_statement() {
    let greet = FunctionDef::new(
        "greet",
        VarType::Void,
        vec![Param::new("who", VarType::String)],
        Block::new(vec![Stmt::print(vec![Expr::string("hi "), Expr::load("who")])]),
    );
    let program = program_with_functions(
        vec![],
        vec![greet],
        vec![Stmt::expr(Expr::call("greet", vec![Expr::string("there")]))],
    );
    assert_eq!(run_ok(&program), "hi there");
}

#[test]
fn test_result_of_unused_call_is_dropped() {
    let program = program_with_functions(
        vec![],
        vec![fact()],
        vec![
            Stmt::expr(Expr::call("fact", vec![Expr::int(3)])),
            print(Expr::string("ok")),
        ],
    );
    assert_eq!(run_ok(&program), "ok");
}

#[test]
fn test_outer_variables_through_context() {
    // int total; void add(int n) { total += n; }
    let add = FunctionDef::new(
        "add",
        VarType::Void,
        vec![Param::new("n", VarType::Int)],
        Block::new(vec![Stmt::store("total", AssignOp::AddAssign, Expr::load("n"))]),
    );
    let program = program_with_functions(
        vec![int("total")],
        vec![add],
        vec![
            Stmt::expr(Expr::call("add", vec![Expr::int(4)])),
            Stmt::expr(Expr::call("add", vec![Expr::int(6)])),
            print(Expr::load("total")),
        ],
    );
    assert_eq!(run_ok(&program), "10");
}

#[test]
fn test_recursion_keeps_caller_locals() {
    // int depth(int n) { int mine; mine = n; if (n > 0) { depth(n - 1); } print(mine); return 0; }
    let depth = FunctionDef::new(
        "depth",
        VarType::Int,
        vec![Param::new("n", VarType::Int)],
        Block::new(vec![
            Stmt::assign("mine", Expr::load("n")),
            Stmt::if_else(
                bin(BinaryOp::Greater, Expr::load("n"), Expr::int(0)),
                Block::new(vec![Stmt::expr(Expr::call(
                    "depth",
                    vec![bin(BinaryOp::Sub, Expr::load("n"), Expr::int(1))],
                ))]),
                None,
            ),
            print(Expr::load("mine")),
            Stmt::ret(Some(Expr::int(0))),
        ])
        .with_vars(vec![int("mine")]),
    );
    let program = program_with_functions(
        vec![],
        vec![depth],
        vec![Stmt::expr(Expr::call("depth", vec![Expr::int(3)]))],
    );
    assert_eq!(run_ok(&program), "0123");
}

#[test]
fn test_inner_block_shadows_outer() {
    let program = program(
        vec![int("x")],
        vec![
            Stmt::assign("x", Expr::int(1)),
            Stmt::block(
                Block::new(vec![
                    Stmt::assign("x", Expr::string("inner")),
                    print(Expr::load("x")),
                ])
                .with_vars(vec![string("x")]),
            ),
            print(Expr::load("x")),
        ],
    );
    assert_eq!(run_ok(&program), "inner1");
}

#[test]
fn test_nested_function_reads_enclosing_locals() {
    // int outer(int a) { int inner() { return a * 2; } return inner() + 1; }
    let inner = FunctionDef::new(
        "inner",
        VarType::Int,
        vec![],
        Block::new(vec![Stmt::ret(Some(bin(
            BinaryOp::Mul,
            Expr::load("a"),
            Expr::int(2),
        )))]),
    );
    let outer = FunctionDef::new(
        "outer",
        VarType::Int,
        vec![Param::new("a", VarType::Int)],
        Block::new(vec![Stmt::ret(Some(bin(
            BinaryOp::Add,
            Expr::call("inner", vec![]),
            Expr::int(1),
        )))])
        .with_functions(vec![inner]),
    );
    let program = program_with_functions(
        vec![],
        vec![outer],
        vec![print(Expr::call("outer", vec![Expr::int(20)]))],
    );
    assert_eq!(run_ok(&program), "41");
}

#[test]
fn test_mutual_recursion_in_one_block() {
    let is_even = FunctionDef::new(
        "is_even",
        VarType::Int,
        vec![Param::new("n", VarType::Int)],
        Block::new(vec![
            Stmt::if_else(
                bin(BinaryOp::Equal, Expr::load("n"), Expr::int(0)),
                Block::new(vec![Stmt::ret(Some(Expr::int(1)))]),
                None,
            ),
            Stmt::ret(Some(Expr::call(
                "is_odd",
                vec![bin(BinaryOp::Sub, Expr::load("n"), Expr::int(1))],
            ))),
        ]),
    );
    let is_odd = FunctionDef::new(
        "is_odd",
        VarType::Int,
        vec![Param::new("n", VarType::Int)],
        Block::new(vec![
            Stmt::if_else(
                bin(BinaryOp::Equal, Expr::load("n"), Expr::int(0)),
                Block::new(vec![Stmt::ret(Some(Expr::int(0)))]),
                None,
            ),
            Stmt::ret(Some(Expr::call(
                "is_even",
                vec![bin(BinaryOp::Sub, Expr::load("n"), Expr::int(1))],
            ))),
        ]),
    );
    let program = program_with_functions(
        vec![],
        vec![is_even, is_odd],
        vec![
            print(Expr::call("is_even", vec![Expr::int(10)])),
            print(Expr::call("is_odd", vec![Expr::int(7)])),
        ],
    );
    assert_eq!(run_ok(&program), "11");
}

#[test]
fn test_native_math() {
    let program = program_with_functions(
        vec![],
        vec![
            native("sqrt", VarType::Double, vec![Param::new("x", VarType::Double)], "sqrt"),
            native(
                "power",
                VarType::Double,
                vec![Param::new("b", VarType::Double), Param::new("e", VarType::Double)],
                "pow",
            ),
        ],
        vec![
            println(Expr::call("sqrt", vec![Expr::int(16)])),
            print(Expr::call("power", vec![Expr::double(2.0), Expr::int(10)])),
        ],
    );
    assert_eq!(run_ok(&program), "4\n1024");
}

#[test]
fn test_native_string_argument() {
    let program = program_with_functions(
        vec![],
        vec![
            native("len", VarType::Int, vec![Param::new("s", VarType::String)], "strlen"),
            native("atoi", VarType::Int, vec![Param::new("s", VarType::String)], "atoi"),
        ],
        vec![
            println(Expr::call("len", vec![Expr::string("hello")])),
            print(bin(
                BinaryOp::Add,
                Expr::call("atoi", vec![Expr::string("41")]),
                Expr::int(1),
            )),
        ],
    );
    assert_eq!(run_ok(&program), "5\n42");
}

#[test]
fn test_registered_host_native() {
    fn triple(args: &[Value], _: &ConstantPool) -> Result<Option<Value>, String> {
        match args {
            [Value::Int(v)] => Ok(Some(Value::Int(v * 3))),
            _ => Err("triple expects one int".to_string()),
        }
    }
    register_native("test_triple", triple);

    let program = program_with_functions(
        vec![],
        vec![native("triple", VarType::Int, vec![Param::new("n", VarType::Int)], "test_triple")],
        vec![print(Expr::call("triple", vec![Expr::int(14)]))],
    );
    assert_eq!(run_ok(&program), "42");
}
