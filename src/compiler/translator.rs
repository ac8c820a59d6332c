// mathvm Translator
// Walks the AST and emits one bytecode buffer per function
//
// Binary operands are evaluated right first, so the left operand ends up on top
// of the stack ("upper"), which is the operand order every instruction expects.

use super::code::{Code, Function, TopLevelVar, TOP_FUNCTION};
use super::label::Label;
use super::opcode::Opcode;
use super::pool::{ConstantPool, NativePool, NativeSignature};
use super::scope::{FunctionContext, ScopeStack, VarInfo};
use crate::ast::{AssignOp, BinaryOp, Block, Expr, FunctionDef, Program, Stmt, UnaryOp, VarType};
use crate::error::{MathvmError, MathvmResult, Span};
use crate::vm::natives::NativeRegistry;
use tracing::debug;

/// Translate a whole program with the global native registry
pub fn translate(program: &Program) -> MathvmResult<Code> {
    Translator::new().translate(program)
}

pub struct Translator<'r> {
    registry: &'r NativeRegistry,
    constants: ConstantPool,
    natives: NativePool,
    functions: Vec<Function>,
    scopes: ScopeStack,
    /// Function currently being emitted
    ctx: FunctionContext,
    /// Functions whose bodies are suspended while a nested one is emitted
    enclosing: Vec<FunctionContext>,
    top_level_vars: Vec<TopLevelVar>,
}

impl Translator<'static> {
    pub fn new() -> Self {
        Self::with_registry(NativeRegistry::global())
    }
}

impl Default for Translator<'static> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'r> Translator<'r> {
    pub fn with_registry(registry: &'r NativeRegistry) -> Self {
        Self {
            registry,
            constants: ConstantPool::new(),
            natives: NativePool::new(),
            functions: vec![Function::new(0, TOP_FUNCTION, VarType::Void)],
            scopes: ScopeStack::new(),
            ctx: FunctionContext::new(0, VarType::Void),
            enclosing: Vec::new(),
            top_level_vars: Vec::new(),
        }
    }

    /// Translate `program`; the first error aborts and no code is produced
    pub fn translate(mut self, program: &Program) -> MathvmResult<Code> {
        self.translate_block(&program.body)?;
        self.emit(Opcode::Stop);

        let top = std::mem::replace(&mut self.ctx, FunctionContext::new(0, VarType::Void));
        self.seal(top)?;

        debug!(
            functions = self.functions.len(),
            constants = self.constants.len(),
            natives = self.natives.len(),
            "translation finished"
        );
        Ok(Code::new(
            self.functions,
            self.constants,
            self.natives,
            self.top_level_vars,
        ))
    }

    // ==================== Emission helpers ====================

    fn emit(&mut self, op: Opcode) {
        self.ctx.bytecode.emit(op);
    }

    fn emit_u16(&mut self, value: u16) {
        self.ctx.bytecode.emit_u16(value);
    }

    fn new_label(&mut self) -> Label {
        self.ctx.labels.new_label()
    }

    fn bind(&mut self, label: Label) -> MathvmResult<()> {
        self.ctx.labels.bind(label, &self.ctx.bytecode)
    }

    fn branch(&mut self, op: Opcode, label: Label) {
        self.ctx.labels.emit_branch(&mut self.ctx.bytecode, op, label);
    }

    fn alloc_slot(&mut self, ty: VarType, span: Span) -> MathvmResult<u16> {
        self.ctx.alloc_slot(ty).ok_or_else(|| {
            MathvmError::internal_error("Too many local variables in one function", span)
        })
    }

    fn emit_zero(&mut self, ty: VarType) {
        match ty {
            VarType::Double => self.emit(Opcode::DLoad0),
            VarType::String => self.emit(Opcode::SLoad0),
            _ => self.emit(Opcode::ILoad0),
        }
    }

    fn emit_load(&mut self, var: VarInfo, span: Span) -> MathvmResult<()> {
        let local = var.context == self.ctx.id;
        let op = match (local, var.ty) {
            (true, VarType::Int) => Opcode::LoadIVar,
            (true, VarType::Double) => Opcode::LoadDVar,
            (true, VarType::String) => Opcode::LoadSVar,
            (false, VarType::Int) => Opcode::LoadCtxIVar,
            (false, VarType::Double) => Opcode::LoadCtxDVar,
            (false, VarType::String) => Opcode::LoadCtxSVar,
            (_, ty) => {
                return Err(MathvmError::internal_error(
                    format!("Variable slot of type {}", ty),
                    span,
                ))
            }
        };
        self.emit_var_access(op, var, local);
        Ok(())
    }

    fn emit_store(&mut self, var: VarInfo, span: Span) -> MathvmResult<()> {
        let local = var.context == self.ctx.id;
        let op = match (local, var.ty) {
            (true, VarType::Int) => Opcode::StoreIVar,
            (true, VarType::Double) => Opcode::StoreDVar,
            (true, VarType::String) => Opcode::StoreSVar,
            (false, VarType::Int) => Opcode::StoreCtxIVar,
            (false, VarType::Double) => Opcode::StoreCtxDVar,
            (false, VarType::String) => Opcode::StoreCtxSVar,
            (_, ty) => {
                return Err(MathvmError::internal_error(
                    format!("Variable slot of type {}", ty),
                    span,
                ))
            }
        };
        self.emit_var_access(op, var, local);
        Ok(())
    }

    fn emit_var_access(&mut self, op: Opcode, var: VarInfo, local: bool) {
        self.emit(op);
        if !local {
            self.emit_u16(var.context);
        }
        self.emit_u16(var.slot);
    }

    /// Convert the value on top of the stack from `from` to `to`
    fn emit_cast(&mut self, from: VarType, to: VarType, span: Span) -> MathvmResult<()> {
        match (from, to) {
            (a, b) if a == b && a.is_value() => Ok(()),
            (VarType::Int, VarType::Double) => {
                self.emit(Opcode::I2D);
                Ok(())
            }
            (VarType::Double, VarType::Int) => {
                self.emit(Opcode::D2I);
                Ok(())
            }
            _ => Err(MathvmError::type_error(
                format!("Cannot convert {} to {}", from, to),
                span,
            )),
        }
    }

    /// Turn the value on top of the stack into an int that is zero iff it is false
    fn emit_truth(&mut self, ty: VarType, span: Span) -> MathvmResult<()> {
        match ty {
            VarType::Int => {}
            VarType::Double => {
                self.emit(Opcode::DLoad0);
                self.emit(Opcode::DCmp);
            }
            VarType::String => self.emit(Opcode::S2I),
            other => {
                return Err(MathvmError::type_error(
                    format!("A value of type {} cannot be used as a condition", other),
                    span,
                ))
            }
        }
        Ok(())
    }

    fn lookup_var(&self, name: &str, span: Span) -> MathvmResult<VarInfo> {
        self.scopes.lookup_var(name).ok_or_else(|| {
            MathvmError::name_error(format!("Undeclared variable '{}'", name), span)
                .with_help(format!("declare '{}' in an enclosing block", name))
        })
    }

    // ==================== Blocks and functions ====================

    fn translate_block(&mut self, block: &Block) -> MathvmResult<()> {
        self.scopes.push();
        let result = self.translate_block_contents(block);
        self.scopes.pop();
        result
    }

    fn translate_block_contents(&mut self, block: &Block) -> MathvmResult<()> {
        let outermost = self.enclosing.is_empty() && self.scopes.depth() == 1;

        for var in &block.vars {
            if !var.ty.is_value() {
                return Err(MathvmError::type_error(
                    format!("Variable '{}' cannot have type {}", var.name, var.ty),
                    var.span,
                ));
            }
            let slot = self.alloc_slot(var.ty, var.span)?;
            let info = VarInfo {
                ty: var.ty,
                context: self.ctx.id,
                slot,
            };
            if !self.scopes.declare_var(&var.name, info) {
                return Err(MathvmError::name_error(
                    format!("Variable '{}' is already declared in this block", var.name),
                    var.span,
                ));
            }
            if outermost {
                self.top_level_vars.push(TopLevelVar {
                    name: var.name.clone(),
                    ty: var.ty,
                    slot,
                });
            }
        }

        // Register every function first so bodies can call each other
        let mut ids = Vec::with_capacity(block.functions.len());
        for def in &block.functions {
            ids.push(self.register_function(def)?);
        }
        for (def, id) in block.functions.iter().zip(ids) {
            self.translate_function(def, id)?;
        }

        for stmt in &block.statements {
            self.translate_stmt(stmt)?;
        }
        Ok(())
    }

    fn register_function(&mut self, def: &FunctionDef) -> MathvmResult<u16> {
        if def.return_type == VarType::Invalid {
            return Err(MathvmError::type_error(
                format!("Function '{}' has an invalid return type", def.name),
                def.span,
            ));
        }
        if let Some(param) = def.params.iter().find(|p| !p.ty.is_value()) {
            return Err(MathvmError::type_error(
                format!("Parameter '{}' cannot have type {}", param.name, param.ty),
                param.span,
            ));
        }

        let id = u16::try_from(self.functions.len()).map_err(|_| {
            MathvmError::internal_error("Too many functions in one program", def.span)
        })?;
        if !self.scopes.declare_function(&def.name, id) {
            return Err(MathvmError::name_error(
                format!("Function '{}' is already declared in this block", def.name),
                def.span,
            ));
        }

        let mut function = Function::new(id, def.name.clone(), def.return_type);
        function.params = def.params.iter().map(|p| (p.ty, p.name.clone())).collect();

        if let Some(native_name) = def.native_name() {
            function.native = Some(self.register_native(def, native_name)?);
        }

        debug!(id, name = %def.name, native = function.is_native(), "registered function");
        self.functions.push(function);
        Ok(id)
    }

    fn register_native(&mut self, def: &FunctionDef, native_name: &str) -> MathvmResult<u16> {
        if !self.registry.contains(native_name) {
            return Err(MathvmError::name_error(
                format!("Unknown native function '{}'", native_name),
                def.span,
            ));
        }
        let signature = NativeSignature::new(
            def.return_type,
            def.params.iter().map(|p| p.ty).collect(),
        );
        if let Some(existing) = self
            .natives
            .lookup(native_name)
            .and_then(|id| self.natives.get(id))
        {
            if existing.signature != signature {
                return Err(MathvmError::type_error(
                    format!(
                        "Native '{}' is already bound as {}, not {}",
                        native_name, existing.signature, signature
                    ),
                    def.span,
                ));
            }
        }
        self.natives
            .register(native_name, signature)
            .ok_or_else(|| MathvmError::internal_error("Too many native functions", def.span))
    }

    fn translate_function(&mut self, def: &FunctionDef, id: u16) -> MathvmResult<()> {
        debug!(id, name = %def.name, "translating function");
        let outer = std::mem::replace(&mut self.ctx, FunctionContext::new(id, def.return_type));
        self.enclosing.push(outer);

        self.scopes.push();
        let result = self.translate_function_body(def, id);
        self.scopes.pop();
        result?;

        let outer = self.enclosing.pop().ok_or_else(|| {
            MathvmError::internal_error("Function context stack is empty", def.span)
        })?;
        let finished = std::mem::replace(&mut self.ctx, outer);
        self.seal(finished)
    }

    fn translate_function_body(&mut self, def: &FunctionDef, id: u16) -> MathvmResult<()> {
        let mut params = Vec::with_capacity(def.params.len());
        for param in &def.params {
            let slot = self.alloc_slot(param.ty, param.span)?;
            let info = VarInfo {
                ty: param.ty,
                context: id,
                slot,
            };
            if !self.scopes.declare_var(&param.name, info) {
                return Err(MathvmError::name_error(
                    format!("Duplicate parameter '{}' in function '{}'", param.name, def.name),
                    param.span,
                ));
            }
            params.push((info, param.span));
        }

        if let Some(native) = self.functions.get(id as usize).and_then(|f| f.native) {
            let body = &def.body;
            if body.statements.len() > 1 || !body.vars.is_empty() || !body.functions.is_empty() {
                return Err(MathvmError::syntax_error(
                    format!("Native function '{}' cannot have a body", def.name),
                    def.span,
                ));
            }
            // Arguments stay on the operand stack for the host call
            self.emit(Opcode::CallNative);
            self.emit_u16(native);
            self.emit(Opcode::Return);
            return Ok(());
        }

        // Arguments were pushed left to right, so the last one is on top
        for (info, span) in params.into_iter().rev() {
            self.emit_store(info, span)?;
        }

        self.translate_block(&def.body)?;

        if def.return_type != VarType::Void {
            self.emit_zero(def.return_type);
        }
        self.emit(Opcode::Return);
        Ok(())
    }

    /// Patch the labels of a finished function and store its bytecode
    fn seal(&mut self, ctx: FunctionContext) -> MathvmResult<()> {
        let FunctionContext {
            id,
            locals,
            mut bytecode,
            mut labels,
            ..
        } = ctx;
        labels.resolve(&mut bytecode)?;

        let function = self.functions.get_mut(id as usize).ok_or_else(|| {
            MathvmError::internal_error(format!("Unknown function id {}", id), Span::default())
        })?;
        debug!(id, name = %function.name, bytes = bytecode.len(), locals = locals.len(), "sealed function");
        function.bytecode = bytecode;
        function.locals = locals;
        Ok(())
    }

    // ==================== Statements ====================

    fn translate_stmt(&mut self, stmt: &Stmt) -> MathvmResult<()> {
        match stmt {
            Stmt::Expression { expr, .. } => {
                if self.translate_expr(expr)? != VarType::Void {
                    self.emit(Opcode::Pop);
                }
                Ok(())
            }

            Stmt::Store {
                name,
                op,
                value,
                span,
            } => self.translate_store(name, *op, value, *span),

            Stmt::Print { operands, .. } => {
                for operand in operands {
                    let op = match self.translate_expr(operand)? {
                        VarType::Int => Opcode::IPrint,
                        VarType::Double => Opcode::DPrint,
                        VarType::String => Opcode::SPrint,
                        other => {
                            return Err(MathvmError::type_error(
                                format!("Cannot print a value of type {}", other),
                                operand.span(),
                            ))
                        }
                    };
                    self.emit(op);
                }
                Ok(())
            }

            Stmt::If {
                condition,
                then_block,
                else_block,
                ..
            } => {
                let else_label = self.new_label();
                self.translate_condition(condition, else_label)?;
                self.translate_block(then_block)?;
                match else_block {
                    Some(else_block) => {
                        let end = self.new_label();
                        self.branch(Opcode::Ja, end);
                        self.bind(else_label)?;
                        self.translate_block(else_block)?;
                        self.bind(end)
                    }
                    None => self.bind(else_label),
                }
            }

            Stmt::While {
                condition, body, ..
            } => {
                let top = self.new_label();
                let exit = self.new_label();
                self.bind(top)?;
                self.translate_condition(condition, exit)?;
                self.translate_block(body)?;
                self.branch(Opcode::Ja, top);
                self.bind(exit)
            }

            Stmt::For {
                var,
                range,
                body,
                span,
            } => self.translate_for(var, range, body, *span),

            Stmt::Block { block, .. } => self.translate_block(block),

            Stmt::Return { value, span } => self.translate_return(value.as_ref(), *span),

            Stmt::NativeCall { native_name, span } => Err(MathvmError::syntax_error(
                format!(
                    "Native binding '{}' must be the only statement of a function body",
                    native_name
                ),
                *span,
            )),
        }
    }

    /// Evaluate `condition` and jump to `if_false` when it is false
    fn translate_condition(&mut self, condition: &Expr, if_false: Label) -> MathvmResult<()> {
        let ty = self.translate_expr(condition)?;
        self.emit_truth(ty, condition.span())?;
        self.emit(Opcode::ILoad0);
        self.branch(Opcode::IfICmpE, if_false);
        Ok(())
    }

    fn translate_store(
        &mut self,
        name: &str,
        op: AssignOp,
        value: &Expr,
        span: Span,
    ) -> MathvmResult<()> {
        let var = self.lookup_var(name, span)?;
        if op != AssignOp::Assign && !var.ty.is_numeric() {
            return Err(MathvmError::type_error(
                format!("Compound assignment to '{}' of type {}", name, var.ty),
                span,
            ));
        }

        let ty = self.translate_expr(value)?;
        self.emit_cast(ty, var.ty, value.span())?;

        if op != AssignOp::Assign {
            // Variable on top: ISUB yields var - value
            self.emit_load(var, span)?;
            let arith = match (op, var.ty) {
                (AssignOp::AddAssign, VarType::Int) => Opcode::IAdd,
                (AssignOp::AddAssign, _) => Opcode::DAdd,
                (_, VarType::Int) => Opcode::ISub,
                _ => Opcode::DSub,
            };
            self.emit(arith);
        }
        self.emit_store(var, span)
    }

    fn translate_for(&mut self, name: &str, range: &Expr, body: &Block, span: Span) -> MathvmResult<()> {
        let (lower, upper) = match range {
            Expr::Binary {
                op: BinaryOp::Range,
                left,
                right,
                ..
            } => (left, right),
            other => {
                return Err(MathvmError::syntax_error(
                    "A for loop needs a range of the form 'lower..upper'",
                    other.span(),
                ))
            }
        };

        let var = self.lookup_var(name, span)?;
        if var.ty != VarType::Int {
            return Err(MathvmError::type_error(
                format!("Loop variable '{}' must be int, found {}", name, var.ty),
                span,
            ));
        }

        // Both bounds are evaluated once, before the first iteration
        let ty = self.translate_expr(lower)?;
        self.emit_cast(ty, VarType::Int, lower.span())?;
        let ty = self.translate_expr(upper)?;
        self.emit_cast(ty, VarType::Int, upper.span())?;

        let limit = VarInfo {
            ty: VarType::Int,
            context: self.ctx.id,
            slot: self.alloc_slot(VarType::Int, span)?,
        };
        self.emit_store(limit, span)?;
        self.emit_store(var, span)?;

        let top = self.new_label();
        let exit = self.new_label();
        self.bind(top)?;
        self.emit_load(limit, span)?;
        self.emit_load(var, span)?;
        self.branch(Opcode::IfICmpG, exit);

        self.translate_block(body)?;

        // Leave before the increment so an upper bound of i64::MAX cannot wrap
        self.emit_load(limit, span)?;
        self.emit_load(var, span)?;
        self.branch(Opcode::IfICmpE, exit);

        self.emit_load(var, span)?;
        self.emit(Opcode::ILoad1);
        self.emit(Opcode::IAdd);
        self.emit_store(var, span)?;
        self.branch(Opcode::Ja, top);
        self.bind(exit)
    }

    fn translate_return(&mut self, value: Option<&Expr>, span: Span) -> MathvmResult<()> {
        if self.enclosing.is_empty() {
            if value.is_some() {
                return Err(MathvmError::type_error(
                    "The program body cannot return a value",
                    span,
                ));
            }
            self.emit(Opcode::Stop);
            return Ok(());
        }

        match (value, self.ctx.return_type) {
            (None, VarType::Void) => {}
            (Some(_), VarType::Void) => {
                return Err(MathvmError::type_error(
                    "A void function cannot return a value",
                    span,
                ))
            }
            (None, ty) => {
                return Err(MathvmError::type_error(
                    format!("Missing return value of type {}", ty),
                    span,
                ))
            }
            (Some(expr), ty) => {
                let value_ty = self.translate_expr(expr)?;
                self.emit_cast(value_ty, ty, expr.span())?;
            }
        }
        self.emit(Opcode::Return);
        Ok(())
    }

    // ==================== Expressions ====================

    /// Emit code leaving the value of `expr` on the stack; returns its static type
    fn translate_expr(&mut self, expr: &Expr) -> MathvmResult<VarType> {
        match expr {
            Expr::IntLiteral { value, .. } => {
                match *value {
                    0 => self.emit(Opcode::ILoad0),
                    1 => self.emit(Opcode::ILoad1),
                    -1 => self.emit(Opcode::ILoadM1),
                    v => {
                        self.emit(Opcode::ILoad);
                        self.ctx.bytecode.emit_i64(v);
                    }
                }
                Ok(VarType::Int)
            }

            Expr::DoubleLiteral { value, .. } => {
                let v = *value;
                if v.to_bits() == 0.0f64.to_bits() {
                    self.emit(Opcode::DLoad0);
                } else if v == 1.0 {
                    self.emit(Opcode::DLoad1);
                } else if v == -1.0 {
                    self.emit(Opcode::DLoadM1);
                } else {
                    self.emit(Opcode::DLoad);
                    self.ctx.bytecode.emit_f64(v);
                }
                Ok(VarType::Double)
            }

            Expr::StringLiteral { value, span } => {
                if value.is_empty() {
                    self.emit(Opcode::SLoad0);
                } else {
                    let id = self.constants.intern(value).ok_or_else(|| {
                        MathvmError::internal_error("Too many string constants", *span)
                    })?;
                    self.emit(Opcode::SLoad);
                    self.emit_u16(id);
                }
                Ok(VarType::String)
            }

            Expr::Load { name, span } => {
                let var = self.lookup_var(name, *span)?;
                self.emit_load(var, *span)?;
                Ok(var.ty)
            }

            Expr::Binary {
                op,
                left,
                right,
                span,
            } => self.translate_binary(*op, left, right, *span),

            Expr::Unary { op, operand, span } => self.translate_unary(*op, operand, *span),

            Expr::Call { name, args, span } => self.translate_call(name, args, *span),
        }
    }

    fn translate_binary(
        &mut self,
        op: BinaryOp,
        left: &Expr,
        right: &Expr,
        span: Span,
    ) -> MathvmResult<VarType> {
        match op {
            BinaryOp::And | BinaryOp::Or => return self.translate_logical(op, left, right),
            BinaryOp::Range => {
                return Err(MathvmError::syntax_error(
                    "A range is only allowed as the bounds of a for loop",
                    span,
                ))
            }
            _ => {}
        }

        let right_ty = self.translate_expr(right)?;
        let left_ty = self.translate_expr(left)?;

        if op.is_comparison() {
            self.emit_comparison(op, left_ty, right_ty, span)
        } else {
            self.emit_arithmetic(op, left_ty, right_ty, span)
        }
    }

    /// Bring both operands to a common numeric type; left is on top
    fn emit_widen(
        &mut self,
        op: BinaryOp,
        left: VarType,
        right: VarType,
        span: Span,
    ) -> MathvmResult<VarType> {
        match (left, right) {
            (VarType::Int, VarType::Int) => Ok(VarType::Int),
            (VarType::Double, VarType::Double) => Ok(VarType::Double),
            (VarType::Int, VarType::Double) => {
                self.emit(Opcode::I2D);
                Ok(VarType::Double)
            }
            (VarType::Double, VarType::Int) => {
                self.emit(Opcode::Swap);
                self.emit(Opcode::I2D);
                self.emit(Opcode::Swap);
                Ok(VarType::Double)
            }
            _ => Err(MathvmError::type_error(
                format!(
                    "Operator '{}' cannot be applied to {} and {}",
                    op.symbol(),
                    left,
                    right
                ),
                span,
            )),
        }
    }

    fn emit_arithmetic(
        &mut self,
        op: BinaryOp,
        left: VarType,
        right: VarType,
        span: Span,
    ) -> MathvmResult<VarType> {
        let int_only = match op {
            BinaryOp::Mod => Some(Opcode::IMod),
            BinaryOp::BitAnd => Some(Opcode::IAAnd),
            BinaryOp::BitOr => Some(Opcode::IAOr),
            BinaryOp::BitXor => Some(Opcode::IAXor),
            _ => None,
        };
        if let Some(opcode) = int_only {
            if left != VarType::Int || right != VarType::Int {
                return Err(MathvmError::type_error(
                    format!(
                        "Operator '{}' requires int operands, found {} and {}",
                        op.symbol(),
                        left,
                        right
                    ),
                    span,
                ));
            }
            self.emit(opcode);
            return Ok(VarType::Int);
        }

        let ty = self.emit_widen(op, left, right, span)?;
        let int = ty == VarType::Int;
        let opcode = match op {
            BinaryOp::Add if int => Opcode::IAdd,
            BinaryOp::Add => Opcode::DAdd,
            BinaryOp::Sub if int => Opcode::ISub,
            BinaryOp::Sub => Opcode::DSub,
            BinaryOp::Mul if int => Opcode::IMul,
            BinaryOp::Mul => Opcode::DMul,
            BinaryOp::Div if int => Opcode::IDiv,
            BinaryOp::Div => Opcode::DDiv,
            other => {
                return Err(MathvmError::internal_error(
                    format!("Operator '{}' is not arithmetic", other.symbol()),
                    span,
                ))
            }
        };
        self.emit(opcode);
        Ok(ty)
    }

    fn emit_comparison(
        &mut self,
        op: BinaryOp,
        left: VarType,
        right: VarType,
        span: Span,
    ) -> MathvmResult<VarType> {
        if left == VarType::String || right == VarType::String {
            if left != right || !matches!(op, BinaryOp::Equal | BinaryOp::NotEqual) {
                return Err(MathvmError::type_error(
                    format!(
                        "Operator '{}' cannot be applied to {} and {}",
                        op.symbol(),
                        left,
                        right
                    ),
                    span,
                )
                .with_help("strings only support '==' and '!=', which compare identity"));
            }
            self.emit(Opcode::S2I);
            self.emit(Opcode::Swap);
            self.emit(Opcode::S2I);
        } else if self.emit_widen(op, left, right, span)? == VarType::Double {
            // cmp(left, right) on top, 0 beneath it
            self.emit(Opcode::DCmp);
            self.emit(Opcode::ILoad0);
            self.emit(Opcode::Swap);
        }

        let jump = match op {
            BinaryOp::Equal => Opcode::IfICmpE,
            BinaryOp::NotEqual => Opcode::IfICmpNE,
            BinaryOp::Less => Opcode::IfICmpL,
            BinaryOp::LessEqual => Opcode::IfICmpLE,
            BinaryOp::Greater => Opcode::IfICmpG,
            BinaryOp::GreaterEqual => Opcode::IfICmpGE,
            other => {
                return Err(MathvmError::internal_error(
                    format!("Operator '{}' is not a comparison", other.symbol()),
                    span,
                ))
            }
        };
        self.emit_flag(jump)?;
        Ok(VarType::Int)
    }

    /// Replace the two ints on top with 1 if `jump` would be taken, else 0
    fn emit_flag(&mut self, jump: Opcode) -> MathvmResult<()> {
        let is_true = self.new_label();
        let end = self.new_label();
        self.branch(jump, is_true);
        self.emit(Opcode::ILoad0);
        self.branch(Opcode::Ja, end);
        self.bind(is_true)?;
        self.emit(Opcode::ILoad1);
        self.bind(end)
    }

    /// `&&` and `||`: the right operand only runs when the left does not decide
    fn translate_logical(&mut self, op: BinaryOp, left: &Expr, right: &Expr) -> MathvmResult<VarType> {
        let (jump, decided, undecided) = if op == BinaryOp::And {
            (Opcode::IfICmpE, Opcode::ILoad0, Opcode::ILoad1)
        } else {
            (Opcode::IfICmpNE, Opcode::ILoad1, Opcode::ILoad0)
        };

        let short = self.new_label();
        let end = self.new_label();
        for operand in [left, right] {
            let ty = self.translate_expr(operand)?;
            self.emit_truth(ty, operand.span())?;
            self.emit(Opcode::ILoad0);
            self.branch(jump, short);
        }
        self.emit(undecided);
        self.branch(Opcode::Ja, end);
        self.bind(short)?;
        self.emit(decided);
        self.bind(end)?;
        Ok(VarType::Int)
    }

    fn translate_unary(&mut self, op: UnaryOp, operand: &Expr, span: Span) -> MathvmResult<VarType> {
        let ty = self.translate_expr(operand)?;
        match op {
            UnaryOp::Negate => match ty {
                VarType::Int => self.emit(Opcode::INeg),
                VarType::Double => self.emit(Opcode::DNeg),
                other => {
                    return Err(MathvmError::type_error(
                        format!("Cannot negate a value of type {}", other),
                        span,
                    ))
                }
            },
            UnaryOp::Not => {
                self.emit_truth(ty, operand.span())?;
                self.emit(Opcode::ILoad0);
                self.emit_flag(Opcode::IfICmpNE)?;
                self.emit(Opcode::ILoad1);
                self.emit(Opcode::IAXor);
                return Ok(VarType::Int);
            }
        }
        Ok(ty)
    }

    fn translate_call(&mut self, name: &str, args: &[Expr], span: Span) -> MathvmResult<VarType> {
        let id = self.scopes.lookup_function(name).ok_or_else(|| {
            MathvmError::name_error(format!("Undeclared function '{}'", name), span)
        })?;
        let function = self.functions.get(id as usize).ok_or_else(|| {
            MathvmError::internal_error(format!("Unknown function id {}", id), span)
        })?;
        let params: Vec<VarType> = function.params.iter().map(|(ty, _)| *ty).collect();
        let return_type = function.return_type;

        if args.len() != params.len() {
            return Err(MathvmError::argument_error(
                format!(
                    "Function '{}' expects {} arguments, got {}",
                    name,
                    params.len(),
                    args.len()
                ),
                span,
            ));
        }

        for (arg, param_ty) in args.iter().zip(params) {
            let ty = self.translate_expr(arg)?;
            self.emit_cast(ty, param_ty, arg.span())?;
        }
        self.emit(Opcode::Call);
        self.emit_u16(id);
        Ok(return_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Param, VarDecl};
    use crate::error::ErrorKind;

    fn ops(code: &Code, id: u16) -> Vec<Opcode> {
        code.function(id)
            .unwrap()
            .bytecode
            .instructions()
            .map(|item| item.unwrap().1.op)
            .collect()
    }

    fn program(vars: Vec<VarDecl>, statements: Vec<Stmt>) -> Program {
        Program::new(Block::new(statements).with_vars(vars))
    }

    fn error_kind(program: &Program) -> ErrorKind {
        translate(program).unwrap_err().kind
    }

    #[test]
    fn test_subtraction_puts_left_on_top() {
        let p = program(
            vec![VarDecl::new("x", VarType::Int)],
            vec![Stmt::assign(
                "x",
                Expr::binary(BinaryOp::Sub, Expr::int(10), Expr::int(3)),
            )],
        );
        let code = translate(&p).unwrap();
        let top = &code.function(0).unwrap().bytecode;
        let (first, next) = top.decode(0).unwrap();
        assert_eq!(first.operand, crate::compiler::Operand::Int(3));
        let (second, _) = top.decode(next).unwrap();
        assert_eq!(second.operand, crate::compiler::Operand::Int(10));
        assert_eq!(
            ops(&code, 0),
            vec![
                Opcode::ILoad,
                Opcode::ILoad,
                Opcode::ISub,
                Opcode::StoreIVar,
                Opcode::Stop
            ]
        );
    }

    #[test]
    fn test_mixed_operands_widen() {
        let p = program(
            vec![],
            vec![Stmt::print(vec![Expr::binary(
                BinaryOp::Add,
                Expr::double(2.5),
                Expr::int(1),
            )])],
        );
        let code = translate(&p).unwrap();
        assert_eq!(
            ops(&code, 0),
            vec![
                Opcode::ILoad1,
                Opcode::DLoad,
                Opcode::Swap,
                Opcode::I2D,
                Opcode::Swap,
                Opcode::DAdd,
                Opcode::DPrint,
                Opcode::Stop
            ]
        );
    }

    #[test]
    fn test_literal_fast_paths() {
        let p = program(
            vec![],
            vec![Stmt::print(vec![
                Expr::int(0),
                Expr::int(-1),
                Expr::double(1.0),
                Expr::string(""),
            ])],
        );
        let code = translate(&p).unwrap();
        assert_eq!(
            ops(&code, 0),
            vec![
                Opcode::ILoad0,
                Opcode::IPrint,
                Opcode::ILoadM1,
                Opcode::IPrint,
                Opcode::DLoad1,
                Opcode::DPrint,
                Opcode::SLoad0,
                Opcode::SPrint,
                Opcode::Stop
            ]
        );
        assert_eq!(code.constants.len(), 1);
    }

    #[test]
    fn test_outer_variables_use_context_forms() {
        let f = FunctionDef::new(
            "bump",
            VarType::Void,
            vec![],
            Block::new(vec![Stmt::store("g", AssignOp::AddAssign, Expr::int(2))]),
        );
        let p = Program::new(
            Block::new(vec![Stmt::expr(Expr::call("bump", vec![]))])
                .with_vars(vec![VarDecl::new("g", VarType::Int)])
                .with_functions(vec![f]),
        );
        let code = translate(&p).unwrap();
        let bump = code.function_by_name("bump").unwrap();
        assert_eq!(
            ops(&code, bump.id),
            vec![
                Opcode::ILoad,
                Opcode::LoadCtxIVar,
                Opcode::IAdd,
                Opcode::StoreCtxIVar,
                Opcode::Return
            ]
        );
        // void call as a statement leaves nothing to pop
        assert_eq!(ops(&code, 0), vec![Opcode::Call, Opcode::Stop]);
        assert_eq!(code.top_level_vars.len(), 1);
    }

    #[test]
    fn test_prologue_stores_params_in_reverse() {
        let f = FunctionDef::new(
            "sub",
            VarType::Int,
            vec![Param::new("a", VarType::Int), Param::new("b", VarType::Int)],
            Block::new(vec![Stmt::ret(Some(Expr::binary(
                BinaryOp::Sub,
                Expr::load("a"),
                Expr::load("b"),
            )))]),
        );
        let p = Program::new(Block::default().with_functions(vec![f]));
        let code = translate(&p).unwrap();
        let sub = code.function_by_name("sub").unwrap();
        assert_eq!(sub.locals, vec![VarType::Int, VarType::Int]);
        let (first, next) = sub.bytecode.decode(0).unwrap();
        assert_eq!(first.op, Opcode::StoreIVar);
        assert_eq!(first.operand, crate::compiler::Operand::Id(1));
        let (second, _) = sub.bytecode.decode(next).unwrap();
        assert_eq!(second.operand, crate::compiler::Operand::Id(0));
    }

    #[test]
    fn test_native_body() {
        let f = FunctionDef::new(
            "sqrt",
            VarType::Double,
            vec![Param::new("x", VarType::Double)],
            Block::new(vec![Stmt::native("sqrt")]),
        );
        let p = Program::new(Block::default().with_functions(vec![f]));
        let code = translate(&p).unwrap();
        let sqrt = code.function_by_name("sqrt").unwrap();
        assert_eq!(sqrt.native, Some(0));
        assert_eq!(ops(&code, sqrt.id), vec![Opcode::CallNative, Opcode::Return]);
        assert_eq!(code.natives.get(0).unwrap().signature.params, vec![VarType::Double]);
    }

    #[test]
    fn test_unknown_native() {
        let f = FunctionDef::new(
            "mystery",
            VarType::Void,
            vec![],
            Block::new(vec![Stmt::native("no_such_native")]),
        );
        let p = Program::new(Block::default().with_functions(vec![f]));
        assert_eq!(error_kind(&p), ErrorKind::NameError);
    }

    #[test]
    fn test_name_errors() {
        let p = program(vec![], vec![Stmt::print(vec![Expr::load("nope")])]);
        assert_eq!(error_kind(&p), ErrorKind::NameError);

        let p = program(
            vec![VarDecl::new("x", VarType::Int), VarDecl::new("x", VarType::Double)],
            vec![],
        );
        assert_eq!(error_kind(&p), ErrorKind::NameError);

        let p = program(vec![], vec![Stmt::expr(Expr::call("nope", vec![]))]);
        assert_eq!(error_kind(&p), ErrorKind::NameError);
    }

    #[test]
    fn test_type_errors() {
        // string to int
        let p = program(
            vec![VarDecl::new("x", VarType::Int)],
            vec![Stmt::assign("x", Expr::string("a"))],
        );
        assert_eq!(error_kind(&p), ErrorKind::TypeError);

        // string ordering
        let p = program(
            vec![],
            vec![Stmt::print(vec![Expr::binary(
                BinaryOp::Less,
                Expr::string("a"),
                Expr::string("b"),
            )])],
        );
        assert_eq!(error_kind(&p), ErrorKind::TypeError);

        // modulo on doubles
        let p = program(
            vec![],
            vec![Stmt::print(vec![Expr::binary(
                BinaryOp::Mod,
                Expr::double(1.5),
                Expr::int(2),
            )])],
        );
        assert_eq!(error_kind(&p), ErrorKind::TypeError);

        // void function returning a value
        let f = FunctionDef::new(
            "f",
            VarType::Void,
            vec![],
            Block::new(vec![Stmt::ret(Some(Expr::int(1)))]),
        );
        let p = Program::new(Block::default().with_functions(vec![f]));
        assert_eq!(error_kind(&p), ErrorKind::TypeError);

        // printing a void call
        let f = FunctionDef::new("g", VarType::Void, vec![], Block::default());
        let p = Program::new(
            Block::new(vec![Stmt::print(vec![Expr::call("g", vec![])])]).with_functions(vec![f]),
        );
        assert_eq!(error_kind(&p), ErrorKind::TypeError);
    }

    #[test]
    fn test_arity_mismatch() {
        let f = FunctionDef::new(
            "one",
            VarType::Int,
            vec![Param::new("a", VarType::Int)],
            Block::new(vec![Stmt::ret(Some(Expr::load("a")))]),
        );
        let p = Program::new(
            Block::new(vec![Stmt::expr(Expr::call("one", vec![]))]).with_functions(vec![f]),
        );
        assert_eq!(error_kind(&p), ErrorKind::ArgumentError);
    }

    #[test]
    fn test_for_needs_range() {
        let p = program(
            vec![VarDecl::new("i", VarType::Int)],
            vec![Stmt::for_loop("i", Expr::int(3), Block::default())],
        );
        assert_eq!(error_kind(&p), ErrorKind::SyntaxError);

        let p = program(
            vec![VarDecl::new("d", VarType::Double)],
            vec![Stmt::for_loop(
                "d",
                Expr::range(Expr::int(0), Expr::int(3)),
                Block::default(),
            )],
        );
        assert_eq!(error_kind(&p), ErrorKind::TypeError);
    }

    #[test]
    fn test_non_void_fall_through_returns_zero() {
        let f = FunctionDef::new("z", VarType::Double, vec![], Block::default());
        let p = Program::new(Block::default().with_functions(vec![f]));
        let code = translate(&p).unwrap();
        let z = code.function_by_name("z").unwrap();
        assert_eq!(ops(&code, z.id), vec![Opcode::DLoad0, Opcode::Return]);
    }

    #[test]
    fn test_return_in_top_stops() {
        let p = program(vec![], vec![Stmt::ret(None), Stmt::print(vec![Expr::int(1)])]);
        let code = translate(&p).unwrap();
        assert_eq!(
            ops(&code, 0),
            vec![Opcode::Stop, Opcode::ILoad1, Opcode::IPrint, Opcode::Stop]
        );
    }

    #[test]
    fn test_shadowing_gets_fresh_slot() {
        let inner = Block::new(vec![Stmt::assign("x", Expr::double(2.0))])
            .with_vars(vec![VarDecl::new("x", VarType::Double)]);
        let p = program(
            vec![VarDecl::new("x", VarType::Int)],
            vec![Stmt::block(inner)],
        );
        let code = translate(&p).unwrap();
        assert_eq!(
            code.function(0).unwrap().locals,
            vec![VarType::Int, VarType::Double]
        );
        // only the outermost block's variables are exchanged by name
        assert_eq!(code.top_level_vars.len(), 1);
    }
}
