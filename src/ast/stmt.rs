// mathvm Statement AST Nodes

use super::expr::Expr;
use super::types::VarType;
use crate::error::Span;
use serde::{Deserialize, Serialize};

/// Variable declared directly in a block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VarDecl {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: VarType,
    #[serde(default)]
    pub span: Span,
}

impl VarDecl {
    pub fn new(name: impl Into<String>, ty: VarType) -> Self {
        Self {
            name: name.into(),
            ty,
            span: Span::default(),
        }
    }
}

/// Function parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: VarType,
    #[serde(default)]
    pub span: Span,
}

impl Param {
    pub fn new(name: impl Into<String>, ty: VarType) -> Self {
        Self {
            name: name.into(),
            ty,
            span: Span::default(),
        }
    }
}

/// Function definition, declared in the scope of its enclosing block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDef {
    pub name: String,
    pub return_type: VarType,
    #[serde(default)]
    pub params: Vec<Param>,
    pub body: Block,
    #[serde(default)]
    pub span: Span,
}

impl FunctionDef {
    pub fn new(name: impl Into<String>, return_type: VarType, params: Vec<Param>, body: Block) -> Self {
        Self {
            name: name.into(),
            return_type,
            params,
            body,
            span: Span::default(),
        }
    }

    /// Native binding name if the body starts with a native call
    pub fn native_name(&self) -> Option<&str> {
        match self.body.statements.first() {
            Some(Stmt::NativeCall { native_name, .. }) => Some(native_name),
            _ => None,
        }
    }
}

/// Block: declarations plus statements
///
/// Variables and functions of a block are visible to every statement of the
/// block regardless of where the parser saw the declaration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Block {
    #[serde(default)]
    pub vars: Vec<VarDecl>,
    #[serde(default)]
    pub functions: Vec<FunctionDef>,
    #[serde(default)]
    pub statements: Vec<Stmt>,
    #[serde(default)]
    pub span: Span,
}

impl Block {
    pub fn new(statements: Vec<Stmt>) -> Self {
        Self {
            statements,
            ..Self::default()
        }
    }

    pub fn with_vars(mut self, vars: Vec<VarDecl>) -> Self {
        self.vars = vars;
        self
    }

    pub fn with_functions(mut self, functions: Vec<FunctionDef>) -> Self {
        self.functions = functions;
        self
    }
}

/// Assignment operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssignOp {
    Assign,    // =
    AddAssign, // +=
    SubAssign, // -=
}

/// Statement nodes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Stmt {
    /// Expression evaluated for its side effects, e.g. a call
    Expression {
        expr: Expr,
        #[serde(default)]
        span: Span,
    },

    /// Variable store: x = e, x += e, x -= e
    Store {
        name: String,
        op: AssignOp,
        value: Expr,
        #[serde(default)]
        span: Span,
    },

    Print {
        operands: Vec<Expr>,
        #[serde(default)]
        span: Span,
    },

    If {
        condition: Expr,
        then_block: Block,
        #[serde(default)]
        else_block: Option<Block>,
        #[serde(default)]
        span: Span,
    },

    While {
        condition: Expr,
        body: Block,
        #[serde(default)]
        span: Span,
    },

    /// for (var in lower..upper) body
    For {
        var: String,
        range: Expr,
        body: Block,
        #[serde(default)]
        span: Span,
    },

    Block {
        block: Block,
        #[serde(default)]
        span: Span,
    },

    Return {
        #[serde(default)]
        value: Option<Expr>,
        #[serde(default)]
        span: Span,
    },

    /// Binds the enclosing function to a host native; must be the first statement
    NativeCall {
        native_name: String,
        #[serde(default)]
        span: Span,
    },
}

impl Stmt {
    pub fn span(&self) -> Span {
        match self {
            Stmt::Expression { span, .. }
            | Stmt::Store { span, .. }
            | Stmt::Print { span, .. }
            | Stmt::If { span, .. }
            | Stmt::While { span, .. }
            | Stmt::For { span, .. }
            | Stmt::Block { span, .. }
            | Stmt::Return { span, .. }
            | Stmt::NativeCall { span, .. } => *span,
        }
    }

    pub fn expr(expr: Expr) -> Self {
        Stmt::Expression {
            expr,
            span: Span::default(),
        }
    }

    pub fn store(name: impl Into<String>, op: AssignOp, value: Expr) -> Self {
        Stmt::Store {
            name: name.into(),
            op,
            value,
            span: Span::default(),
        }
    }

    pub fn assign(name: impl Into<String>, value: Expr) -> Self {
        Self::store(name, AssignOp::Assign, value)
    }

    pub fn print(operands: Vec<Expr>) -> Self {
        Stmt::Print {
            operands,
            span: Span::default(),
        }
    }

    pub fn if_else(condition: Expr, then_block: Block, else_block: Option<Block>) -> Self {
        Stmt::If {
            condition,
            then_block,
            else_block,
            span: Span::default(),
        }
    }

    pub fn while_loop(condition: Expr, body: Block) -> Self {
        Stmt::While {
            condition,
            body,
            span: Span::default(),
        }
    }

    pub fn for_loop(var: impl Into<String>, range: Expr, body: Block) -> Self {
        Stmt::For {
            var: var.into(),
            range,
            body,
            span: Span::default(),
        }
    }

    pub fn block(block: Block) -> Self {
        Stmt::Block {
            block,
            span: Span::default(),
        }
    }

    pub fn ret(value: Option<Expr>) -> Self {
        Stmt::Return {
            value,
            span: Span::default(),
        }
    }

    pub fn native(native_name: impl Into<String>) -> Self {
        Stmt::NativeCall {
            native_name: native_name.into(),
            span: Span::default(),
        }
    }
}

/// Program: the body of the implicit `<top>` function
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Program {
    pub body: Block,
}

impl Program {
    pub fn new(body: Block) -> Self {
        Self { body }
    }

    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
