// Shared helpers for mathvm integration tests

#![allow(dead_code)]

pub use mathvm_core::ast::{
    AssignOp, BinaryOp, Block, Expr, FunctionDef, Param, Program, Stmt, UnaryOp, VarDecl, VarType,
};
pub use mathvm_core::error::{ErrorKind, MathvmError};

use mathvm_core::compiler::Code;
use mathvm_core::translate;
use mathvm_core::vm::Interpreter;

/// Program whose body declares `vars` and runs `statements`
pub fn program(vars: Vec<VarDecl>, statements: Vec<Stmt>) -> Program {
    Program::new(Block::new(statements).with_vars(vars))
}

pub fn program_with_functions(
    vars: Vec<VarDecl>,
    functions: Vec<FunctionDef>,
    statements: Vec<Stmt>,
) -> Program {
    Program::new(Block::new(statements).with_vars(vars).with_functions(functions))
}

pub fn int(name: &str) -> VarDecl {
    VarDecl::new(name, VarType::Int)
}

pub fn double(name: &str) -> VarDecl {
    VarDecl::new(name, VarType::Double)
}

pub fn string(name: &str) -> VarDecl {
    VarDecl::new(name, VarType::String)
}

pub fn bin(op: BinaryOp, left: Expr, right: Expr) -> Expr {
    Expr::binary(op, left, right)
}

pub fn print(expr: Expr) -> Stmt {
    Stmt::print(vec![expr])
}

/// Print `expr` followed by a newline
pub fn println(expr: Expr) -> Stmt {
    Stmt::print(vec![expr, Expr::string("\n")])
}

pub fn run_code(code: &Code) -> Result<String, MathvmError> {
    let mut out = Vec::new();
    Interpreter::new(code, &mut out).run()?;
    Ok(String::from_utf8(out).expect("output is utf-8"))
}

/// Translate and run, returning everything printed
pub fn run(program: &Program) -> Result<String, MathvmError> {
    let code = translate(program)?;
    run_code(&code)
}

pub fn run_ok(program: &Program) -> String {
    match run(program) {
        Ok(out) => out,
        Err(e) => panic!("program failed: {}", e.message),
    }
}

/// Value of a single printed expression
pub fn eval(expr: Expr) -> Result<String, MathvmError> {
    run(&program(vec![], vec![print(expr)]))
}
