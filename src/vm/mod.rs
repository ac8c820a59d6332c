// mathvm Virtual Machine

pub mod frame;
pub mod interpreter;
pub mod natives;
pub mod value;

pub use frame::{resolve_context, Frame, ReturnSite};
pub use interpreter::{Fault, Interpreter, InterpreterOptions, FRAMES_MAX, STACK_MAX};
pub use natives::{register_native, NativeFn, NativeRegistry};
pub use value::{Value, Var};
