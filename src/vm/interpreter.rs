// mathvm Interpreter
// Stack-based execution of translated code

use super::frame::{resolve_context, Frame, ReturnSite};
use super::natives::{NativeFn, NativeRegistry};
use super::value::{Value, Var};
use crate::ast::VarType;
use crate::compiler::{BytecodeError, Code, Opcode, Operand};
use crate::error::{MathvmError, MathvmResult, StackFrame};
use smallvec::SmallVec;
use std::io::Write;
use thiserror::Error;
use tracing::{debug, trace};

pub const STACK_MAX: usize = 65536;
pub const FRAMES_MAX: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterpreterOptions {
    /// Operand stack capacity in values
    pub max_stack: usize,
    /// Maximum number of simultaneously active frames
    pub max_frames: usize,
}

impl Default for InterpreterOptions {
    fn default() -> Self {
        Self {
            max_stack: STACK_MAX,
            max_frames: FRAMES_MAX,
        }
    }
}

/// Fatal execution fault
#[derive(Debug, Error)]
pub enum Fault {
    #[error("Stack underflow")]
    StackUnderflow,

    #[error("Stack overflow")]
    StackOverflow,

    #[error("Call depth exceeded ({0} frames)")]
    CallDepth(usize),

    #[error("{0}")]
    Decode(#[from] BytecodeError),

    #[error("Jump to invalid offset {0}")]
    BadJump(isize),

    #[error("No active frame for context {0}")]
    UnresolvedContext(u16),

    #[error("Slot {slot} does not exist in context {context}")]
    InvalidSlot { context: u16, slot: u16 },

    #[error("Unknown function id {0}")]
    UnknownFunction(u16),

    #[error("Unknown native '{0}'")]
    UnknownNative(String),

    #[error("Unknown string constant {0}")]
    UnknownConstant(u16),

    #[error("Expected {expected}, found {found}")]
    TypeMismatch { expected: VarType, found: VarType },

    #[error("Division by zero")]
    DivisionByZero,

    #[error("Native '{name}' failed: {message}")]
    NativeFailed { name: String, message: String },

    #[error("Output error: {0}")]
    Io(#[from] std::io::Error),
}

type Step<T> = Result<T, Fault>;

pub struct Interpreter<'a, W: Write> {
    code: &'a Code,
    out: W,
    options: InterpreterOptions,
    natives: Vec<Option<NativeFn>>,
    stack: Vec<Value>,
    frames: Vec<Frame>,
    calls: Vec<ReturnSite>,
    function: u16,
    pc: usize,
}

impl<'a, W: Write> Interpreter<'a, W> {
    pub fn new(code: &'a Code, out: W) -> Self {
        Self::with_options(code, out, InterpreterOptions::default())
    }

    pub fn with_options(code: &'a Code, out: W, options: InterpreterOptions) -> Self {
        Self::with_registry(code, out, options, NativeRegistry::global())
    }

    /// Natives are looked up once here; a missing one only faults when called
    pub fn with_registry(
        code: &'a Code,
        out: W,
        options: InterpreterOptions,
        registry: &NativeRegistry,
    ) -> Self {
        let natives = code
            .natives
            .iter()
            .map(|descriptor| registry.get(&descriptor.name))
            .collect();
        Self {
            code,
            out,
            options,
            natives,
            stack: Vec::new(),
            frames: Vec::new(),
            calls: Vec::new(),
            function: 0,
            pc: 0,
        }
    }

    pub fn into_output(self) -> W {
        self.out
    }

    /// Run the program from the start of `<top>`
    pub fn run(&mut self) -> MathvmResult<()> {
        self.start().map_err(|fault| self.create_error(fault))?;
        self.execute().map_err(|fault| self.create_error(fault))
    }

    /// Run with top-level variables seeded from `vars`, then copy their final values back
    ///
    /// Variables are matched by name; names the program does not declare at top level
    /// are left untouched.
    pub fn execute_with_vars(&mut self, vars: &mut [Var]) -> MathvmResult<()> {
        self.start().map_err(|fault| self.create_error(fault))?;
        self.seed_vars(vars).map_err(|fault| self.create_error(fault))?;
        self.execute().map_err(|fault| self.create_error(fault))?;
        self.read_back_vars(vars);
        Ok(())
    }

    fn start(&mut self) -> Step<()> {
        let top = self.code.top().ok_or(Fault::UnknownFunction(0))?;
        self.stack.clear();
        self.calls.clear();
        self.frames.clear();
        self.frames.push(Frame::new(top.id, &top.locals));
        self.function = top.id;
        self.pc = 0;
        Ok(())
    }

    fn seed_vars(&mut self, vars: &[Var]) -> Step<()> {
        for var in vars {
            let Some(decl) = self.code.top_level_vars.iter().find(|v| v.name == var.name) else {
                debug!(name = %var.name, "ignoring variable not declared at top level");
                continue;
            };
            if decl.ty != var.ty() {
                return Err(Fault::TypeMismatch {
                    expected: decl.ty,
                    found: var.ty(),
                });
            }
            if let Value::StringRef(id) = var.value {
                self.code.constant(id).ok_or(Fault::UnknownConstant(id))?;
            }
            let slot = self
                .frames
                .first_mut()
                .and_then(|frame| frame.slot_mut(decl.slot))
                .ok_or(Fault::InvalidSlot {
                    context: 0,
                    slot: decl.slot,
                })?;
            *slot = var.value;
        }
        Ok(())
    }

    fn read_back_vars(&self, vars: &mut [Var]) {
        let Some(top) = self.frames.first() else {
            return;
        };
        for var in vars.iter_mut() {
            let value = self
                .code
                .top_level_vars
                .iter()
                .find(|v| v.name == var.name)
                .and_then(|decl| top.get(decl.slot));
            if let Some(value) = value {
                var.value = value;
            }
        }
    }

    // ==================== Stack ====================

    fn push(&mut self, value: Value) -> Step<()> {
        if self.stack.len() >= self.options.max_stack {
            return Err(Fault::StackOverflow);
        }
        self.stack.push(value);
        Ok(())
    }

    fn pop(&mut self) -> Step<Value> {
        self.stack.pop().ok_or(Fault::StackUnderflow)
    }

    fn peek(&self) -> Step<Value> {
        self.stack.last().copied().ok_or(Fault::StackUnderflow)
    }

    fn pop_int(&mut self) -> Step<i64> {
        let value = self.pop()?;
        value.as_int().ok_or(Fault::TypeMismatch {
            expected: VarType::Int,
            found: value.kind(),
        })
    }

    fn pop_double(&mut self) -> Step<f64> {
        let value = self.pop()?;
        value.as_double().ok_or(Fault::TypeMismatch {
            expected: VarType::Double,
            found: value.kind(),
        })
    }

    fn pop_string(&mut self) -> Step<u16> {
        let value = self.pop()?;
        value.as_string_id().ok_or(Fault::TypeMismatch {
            expected: VarType::String,
            found: value.kind(),
        })
    }

    fn pop_kind(&mut self, expected: VarType) -> Step<Value> {
        let value = self.pop()?;
        if value.kind() != expected {
            return Err(Fault::TypeMismatch {
                expected,
                found: value.kind(),
            });
        }
        Ok(value)
    }

    // ==================== Frames ====================

    fn frame_index(&self, context: Option<u16>) -> Step<usize> {
        match context {
            Some(ctx) => resolve_context(&self.frames, ctx).ok_or(Fault::UnresolvedContext(ctx)),
            None => self
                .frames
                .len()
                .checked_sub(1)
                .ok_or(Fault::UnresolvedContext(self.function)),
        }
    }

    fn load_var(&mut self, expected: VarType, context: Option<u16>, slot: u16) -> Step<()> {
        let index = self.frame_index(context)?;
        let frame = &self.frames[index];
        let value = frame.get(slot).ok_or(Fault::InvalidSlot {
            context: frame.function,
            slot,
        })?;
        if value.kind() != expected {
            return Err(Fault::TypeMismatch {
                expected,
                found: value.kind(),
            });
        }
        self.push(value)
    }

    fn store_var(&mut self, expected: VarType, context: Option<u16>, slot: u16) -> Step<()> {
        let value = self.pop_kind(expected)?;
        let index = self.frame_index(context)?;
        let frame = &mut self.frames[index];
        let function = frame.function;
        let target = frame
            .slot_mut(slot)
            .ok_or(Fault::InvalidSlot {
                context: function,
                slot,
            })?;
        *target = value;
        Ok(())
    }

    // ==================== Dispatch ====================

    fn execute(&mut self) -> Step<()> {
        let code = self.code;
        loop {
            let function = code
                .function(self.function)
                .ok_or(Fault::UnknownFunction(self.function))?;
            let at = self.pc;
            let (insn, next) = function.bytecode.decode(at)?;
            trace!(function = self.function, pc = at, op = %insn.op, depth = self.stack.len(), "step");
            self.pc = next;

            match (insn.op, insn.operand) {
                // Constants
                (Opcode::DLoad, Operand::Double(v)) => self.push(Value::Double(v))?,
                (Opcode::ILoad, Operand::Int(v)) => self.push(Value::Int(v))?,
                (Opcode::SLoad, Operand::Id(id)) => {
                    code.constant(id).ok_or(Fault::UnknownConstant(id))?;
                    self.push(Value::StringRef(id))?
                }
                (Opcode::DLoad0, _) => self.push(Value::Double(0.0))?,
                (Opcode::ILoad0, _) => self.push(Value::Int(0))?,
                (Opcode::SLoad0, _) => self.push(Value::StringRef(0))?,
                (Opcode::DLoad1, _) => self.push(Value::Double(1.0))?,
                (Opcode::ILoad1, _) => self.push(Value::Int(1))?,
                (Opcode::DLoadM1, _) => self.push(Value::Double(-1.0))?,
                (Opcode::ILoadM1, _) => self.push(Value::Int(-1))?,

                // Arithmetic: the first pop is "upper"
                (Opcode::DAdd, _) => {
                    let upper = self.pop_double()?;
                    let lower = self.pop_double()?;
                    self.push(Value::Double(upper + lower))?
                }
                (Opcode::IAdd, _) => {
                    let upper = self.pop_int()?;
                    let lower = self.pop_int()?;
                    self.push(Value::Int(upper.wrapping_add(lower)))?
                }
                (Opcode::DSub, _) => {
                    let upper = self.pop_double()?;
                    let lower = self.pop_double()?;
                    self.push(Value::Double(upper - lower))?
                }
                (Opcode::ISub, _) => {
                    let upper = self.pop_int()?;
                    let lower = self.pop_int()?;
                    self.push(Value::Int(upper.wrapping_sub(lower)))?
                }
                (Opcode::DMul, _) => {
                    let upper = self.pop_double()?;
                    let lower = self.pop_double()?;
                    self.push(Value::Double(upper * lower))?
                }
                (Opcode::IMul, _) => {
                    let upper = self.pop_int()?;
                    let lower = self.pop_int()?;
                    self.push(Value::Int(upper.wrapping_mul(lower)))?
                }
                (Opcode::DDiv, _) => {
                    let upper = self.pop_double()?;
                    let lower = self.pop_double()?;
                    self.push(Value::Double(upper / lower))?
                }
                (Opcode::IDiv, _) => {
                    let upper = self.pop_int()?;
                    let lower = self.pop_int()?;
                    if lower == 0 {
                        return Err(Fault::DivisionByZero);
                    }
                    self.push(Value::Int(upper.wrapping_div(lower)))?
                }
                (Opcode::IMod, _) => {
                    let upper = self.pop_int()?;
                    let lower = self.pop_int()?;
                    if lower == 0 {
                        return Err(Fault::DivisionByZero);
                    }
                    self.push(Value::Int(upper.wrapping_rem(lower)))?
                }
                (Opcode::DNeg, _) => {
                    let v = self.pop_double()?;
                    self.push(Value::Double(-v))?
                }
                (Opcode::INeg, _) => {
                    let v = self.pop_int()?;
                    self.push(Value::Int(v.wrapping_neg()))?
                }

                // Bitwise
                (Opcode::IAOr, _) => {
                    let upper = self.pop_int()?;
                    let lower = self.pop_int()?;
                    self.push(Value::Int(upper | lower))?
                }
                (Opcode::IAAnd, _) => {
                    let upper = self.pop_int()?;
                    let lower = self.pop_int()?;
                    self.push(Value::Int(upper & lower))?
                }
                (Opcode::IAXor, _) => {
                    let upper = self.pop_int()?;
                    let lower = self.pop_int()?;
                    self.push(Value::Int(upper ^ lower))?
                }

                // Output
                (Opcode::IPrint, _) => {
                    let v = self.pop_int()?;
                    write!(self.out, "{}", v)?
                }
                (Opcode::DPrint, _) => {
                    let v = self.pop_double()?;
                    write!(self.out, "{}", v)?
                }
                (Opcode::SPrint, _) => {
                    let id = self.pop_string()?;
                    let s = code.constant(id).ok_or(Fault::UnknownConstant(id))?;
                    self.out.write_all(s.as_bytes())?
                }

                // Conversion and stack
                (Opcode::I2D, _) => {
                    let v = self.pop_int()?;
                    self.push(Value::Double(v as f64))?
                }
                (Opcode::D2I, _) => {
                    let v = self.pop_double()?;
                    self.push(Value::Int(v as i64))?
                }
                (Opcode::S2I, _) => {
                    let id = self.pop_string()?;
                    self.push(Value::Int(id as i64))?
                }
                (Opcode::Swap, _) => {
                    let upper = self.pop()?;
                    let lower = self.pop()?;
                    self.push(upper)?;
                    self.push(lower)?
                }
                (Opcode::Pop, _) => {
                    self.pop()?;
                }

                // Variables
                (Opcode::LoadDVar, Operand::Id(slot)) => self.load_var(VarType::Double, None, slot)?,
                (Opcode::LoadIVar, Operand::Id(slot)) => self.load_var(VarType::Int, None, slot)?,
                (Opcode::LoadSVar, Operand::Id(slot)) => self.load_var(VarType::String, None, slot)?,
                (Opcode::StoreDVar, Operand::Id(slot)) => self.store_var(VarType::Double, None, slot)?,
                (Opcode::StoreIVar, Operand::Id(slot)) => self.store_var(VarType::Int, None, slot)?,
                (Opcode::StoreSVar, Operand::Id(slot)) => self.store_var(VarType::String, None, slot)?,
                (Opcode::LoadCtxDVar, Operand::CtxSlot(ctx, slot)) => {
                    self.load_var(VarType::Double, Some(ctx), slot)?
                }
                (Opcode::LoadCtxIVar, Operand::CtxSlot(ctx, slot)) => {
                    self.load_var(VarType::Int, Some(ctx), slot)?
                }
                (Opcode::LoadCtxSVar, Operand::CtxSlot(ctx, slot)) => {
                    self.load_var(VarType::String, Some(ctx), slot)?
                }
                (Opcode::StoreCtxDVar, Operand::CtxSlot(ctx, slot)) => {
                    self.store_var(VarType::Double, Some(ctx), slot)?
                }
                (Opcode::StoreCtxIVar, Operand::CtxSlot(ctx, slot)) => {
                    self.store_var(VarType::Int, Some(ctx), slot)?
                }
                (Opcode::StoreCtxSVar, Operand::CtxSlot(ctx, slot)) => {
                    self.store_var(VarType::String, Some(ctx), slot)?
                }

                // Comparison
                (Opcode::DCmp, _) => {
                    let upper = self.pop_double()?;
                    let lower = self.pop_double()?;
                    let cmp = upper.partial_cmp(&lower).map_or(0, |o| o as i64);
                    self.push(Value::Int(cmp))?
                }
                (Opcode::ICmp, _) => {
                    let upper = self.pop_int()?;
                    let lower = self.pop_int()?;
                    self.push(Value::Int(upper.cmp(&lower) as i64))?
                }

                // Control flow
                (Opcode::Ja, Operand::Offset(disp)) => self.jump(at, disp, function.bytecode.len())?,
                (
                    op @ (Opcode::IfICmpNE
                    | Opcode::IfICmpE
                    | Opcode::IfICmpG
                    | Opcode::IfICmpGE
                    | Opcode::IfICmpL
                    | Opcode::IfICmpLE),
                    Operand::Offset(disp),
                ) => {
                    let upper = self.pop_int()?;
                    let lower = self.pop_int()?;
                    let taken = match op {
                        Opcode::IfICmpNE => upper != lower,
                        Opcode::IfICmpE => upper == lower,
                        Opcode::IfICmpG => upper > lower,
                        Opcode::IfICmpGE => upper >= lower,
                        Opcode::IfICmpL => upper < lower,
                        _ => upper <= lower,
                    };
                    if taken {
                        self.jump(at, disp, function.bytecode.len())?;
                    }
                }

                (Opcode::Dump, _) => {
                    let top = self.peek()?;
                    trace!(value = %top.render(&code.constants), kind = %top.kind(), "DUMP");
                }
                (Opcode::Stop, _) => {
                    debug!(function = self.function, pc = at, "stopped");
                    return Ok(());
                }

                // Functions
                (Opcode::Call, Operand::Id(id)) => self.call(id)?,
                (Opcode::CallNative, Operand::Id(id)) => self.call_native(id)?,
                (Opcode::Return, _) => match self.calls.pop() {
                    Some(site) => {
                        self.frames.pop();
                        self.function = site.function;
                        self.pc = site.pc;
                    }
                    None => {
                        debug!("returned from the outermost frame");
                        return Ok(());
                    }
                },

                (op, _) => {
                    return Err(Fault::Decode(BytecodeError::UnknownOpcode {
                        byte: op as u8,
                        offset: at,
                    }))
                }
            }
        }
    }

    fn jump(&mut self, at: usize, disp: i16, len: usize) -> Step<()> {
        let target = at as isize + 1 + disp as isize;
        if target < 0 || target as usize >= len {
            return Err(Fault::BadJump(target));
        }
        self.pc = target as usize;
        Ok(())
    }

    fn call(&mut self, id: u16) -> Step<()> {
        let callee = self.code.function(id).ok_or(Fault::UnknownFunction(id))?;
        if self.frames.len() >= self.options.max_frames {
            return Err(Fault::CallDepth(self.frames.len()));
        }
        trace!(callee = %callee.name, depth = self.frames.len(), "call");
        self.calls.push(ReturnSite {
            function: self.function,
            pc: self.pc,
        });
        self.frames.push(Frame::new(id, &callee.locals));
        self.function = id;
        self.pc = 0;
        Ok(())
    }

    fn call_native(&mut self, id: u16) -> Step<()> {
        let code = self.code;
        let descriptor = code
            .natives
            .get(id)
            .ok_or_else(|| Fault::UnknownNative(format!("#{}", id)))?;
        let host = self
            .natives
            .get(id as usize)
            .copied()
            .flatten()
            .ok_or_else(|| Fault::UnknownNative(descriptor.name.clone()))?;

        let mut args: SmallVec<[Value; 4]> = SmallVec::new();
        for ty in descriptor.signature.params.iter().rev() {
            args.push(self.pop_kind(*ty)?);
        }
        args.reverse();

        let result = host(&args, &code.constants).map_err(|message| Fault::NativeFailed {
            name: descriptor.name.clone(),
            message,
        })?;

        match (descriptor.signature.return_type, result) {
            (VarType::Void, _) => Ok(()),
            (expected, Some(value)) if value.kind() == expected => {
                if let Value::StringRef(sid) = value {
                    code.constant(sid).ok_or(Fault::UnknownConstant(sid))?;
                }
                self.push(value)
            }
            (expected, Some(value)) => Err(Fault::TypeMismatch {
                expected,
                found: value.kind(),
            }),
            (_, None) => Err(Fault::NativeFailed {
                name: descriptor.name.clone(),
                message: "returned no value".to_string(),
            }),
        }
    }

    // ==================== Errors ====================

    fn create_error(&self, fault: Fault) -> MathvmError {
        let name_of = |id: u16| {
            self.code
                .function(id)
                .map_or_else(|| format!("#{}", id), |f| f.name.clone())
        };

        let mut stack_trace = vec![StackFrame::new(name_of(self.function), self.function, self.pc)];
        for site in self.calls.iter().rev() {
            stack_trace.push(StackFrame::new(name_of(site.function), site.function, site.pc));
        }

        let mut error = MathvmError::runtime_error(fault.to_string()).with_stack_trace(stack_trace);
        if matches!(fault, Fault::CallDepth(_)) {
            error = error.with_help("check for unbounded recursion");
        }
        error
    }
}
