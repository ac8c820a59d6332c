// mathvm
// Bytecode translator and stack-based interpreter for the mathvm language

pub mod ast;
pub mod binary;
pub mod compiler;
pub mod error;
pub mod vm;

use crate::ast::Program;
use crate::compiler::Code;
use crate::error::MathvmResult;
use crate::vm::Interpreter;
use std::io::Write;

pub use compiler::translate;

/// Translate `program` and run it, writing printed output to `out`
pub fn run_program<W: Write>(program: &Program, out: W) -> MathvmResult<()> {
    let code = translate(program)?;
    run_code(&code, out)
}

/// Run already translated code
pub fn run_code<W: Write>(code: &Code, out: W) -> MathvmResult<()> {
    Interpreter::new(code, out).run()
}

/// Parse a JSON AST, tagging errors with `file`
pub fn load_program(source: &str, file: &str) -> MathvmResult<Program> {
    Program::from_json(source).map_err(|e| {
        let span = error::Span::single(e.line(), e.column(), 0);
        error::MathvmError::syntax_error(format!("Malformed AST: {}", e), span)
            .with_file(file)
            .with_source(source)
    })
}

/// Parse a JSON AST and translate it, tagging any error with `file` and `source`
pub fn compile_source(source: &str, file: &str) -> MathvmResult<Code> {
    let program = load_program(source, file)?;
    translate(&program).map_err(|e| e.with_file(file).with_source(source))
}
