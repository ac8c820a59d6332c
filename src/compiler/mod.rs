// mathvm Compiler Module
// AST to bytecode translation and the code objects it produces

pub mod bytecode;
pub mod code;
pub mod label;
pub mod opcode;
pub mod pool;
pub mod scope;
pub mod translator;

pub use bytecode::{Bytecode, BytecodeError, Insn, Operand};
pub use code::{Code, Function, TopLevelVar, TOP_FUNCTION};
pub use opcode::Opcode;
pub use pool::{ConstantPool, NativeDescriptor, NativePool, NativeSignature};
pub use translator::{translate, Translator};
