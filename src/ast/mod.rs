// mathvm AST Module
// Input data model handed over by an external parser

mod expr;
mod stmt;
mod types;

pub use expr::*;
pub use stmt::*;
pub use types::*;
