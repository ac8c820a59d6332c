// mathvm Scope Resolver
// Lexical block scopes and the per-function contexts that own frame slots

use super::bytecode::Bytecode;
use super::label::Labels;
use crate::ast::VarType;
use rustc_hash::FxHashMap;

/// Where a variable lives at run time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VarInfo {
    pub ty: VarType,
    /// Context id, equal to the id of the owning function
    pub context: u16,
    pub slot: u16,
}

/// Names declared directly in one block
#[derive(Debug, Default)]
pub struct BlockScope {
    vars: FxHashMap<String, VarInfo>,
    functions: FxHashMap<String, u16>,
}

/// Stack of lexically enclosing blocks, innermost last
#[derive(Debug, Default)]
pub struct ScopeStack {
    scopes: Vec<BlockScope>,
}

impl ScopeStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self) {
        self.scopes.push(BlockScope::default());
    }

    pub fn pop(&mut self) {
        self.scopes.pop();
    }

    pub fn depth(&self) -> usize {
        self.scopes.len()
    }

    /// Declare a variable in the innermost block; false if the name is taken there
    pub fn declare_var(&mut self, name: &str, info: VarInfo) -> bool {
        match self.scopes.last_mut() {
            Some(scope) if !scope.vars.contains_key(name) => {
                scope.vars.insert(name.to_string(), info);
                true
            }
            _ => false,
        }
    }

    /// Declare a function in the innermost block; false if the name is taken there
    pub fn declare_function(&mut self, name: &str, id: u16) -> bool {
        match self.scopes.last_mut() {
            Some(scope) if !scope.functions.contains_key(name) => {
                scope.functions.insert(name.to_string(), id);
                true
            }
            _ => false,
        }
    }

    pub fn lookup_var(&self, name: &str) -> Option<VarInfo> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.vars.get(name).copied())
    }

    pub fn lookup_function(&self, name: &str) -> Option<u16> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.functions.get(name).copied())
    }
}

/// Translation state of the function whose body is being emitted
#[derive(Debug)]
pub struct FunctionContext {
    pub id: u16,
    pub return_type: VarType,
    pub locals: Vec<VarType>,
    pub bytecode: Bytecode,
    pub labels: Labels,
}

impl FunctionContext {
    pub fn new(id: u16, return_type: VarType) -> Self {
        Self {
            id,
            return_type,
            locals: Vec::new(),
            bytecode: Bytecode::new(),
            labels: Labels::new(),
        }
    }

    /// Next free slot; slots are never reused within a function
    pub fn alloc_slot(&mut self, ty: VarType) -> Option<u16> {
        let slot = u16::try_from(self.locals.len()).ok()?;
        self.locals.push(ty);
        Some(slot)
    }
}
