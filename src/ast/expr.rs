// mathvm Expression AST Nodes

use crate::error::Span;
use serde::{Deserialize, Serialize};

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    // Arithmetic
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    // Comparison
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    // Logical
    And,
    Or,
    // Bitwise
    BitAnd, // &
    BitOr,  // |
    BitXor, // ^
    /// `a..b`, only meaningful as the range of a `for` loop
    Range,
}

impl BinaryOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Equal => "==",
            BinaryOp::NotEqual => "!=",
            BinaryOp::Less => "<",
            BinaryOp::LessEqual => "<=",
            BinaryOp::Greater => ">",
            BinaryOp::GreaterEqual => ">=",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
            BinaryOp::BitAnd => "&",
            BinaryOp::BitOr => "|",
            BinaryOp::BitXor => "^",
            BinaryOp::Range => "..",
        }
    }

    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            BinaryOp::Equal
                | BinaryOp::NotEqual
                | BinaryOp::Less
                | BinaryOp::LessEqual
                | BinaryOp::Greater
                | BinaryOp::GreaterEqual
        )
    }
}

/// Unary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    Negate, // -
    Not,    // !
}

/// Expression nodes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Expr {
    IntLiteral {
        value: i64,
        #[serde(default)]
        span: Span,
    },

    DoubleLiteral {
        value: f64,
        #[serde(default)]
        span: Span,
    },

    StringLiteral {
        value: String,
        #[serde(default)]
        span: Span,
    },

    /// Variable read
    Load {
        name: String,
        #[serde(default)]
        span: Span,
    },

    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
        #[serde(default)]
        span: Span,
    },

    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
        #[serde(default)]
        span: Span,
    },

    /// Call of a user or native function by name
    Call {
        name: String,
        #[serde(default)]
        args: Vec<Expr>,
        #[serde(default)]
        span: Span,
    },
}

impl Expr {
    pub fn span(&self) -> Span {
        match self {
            Expr::IntLiteral { span, .. }
            | Expr::DoubleLiteral { span, .. }
            | Expr::StringLiteral { span, .. }
            | Expr::Load { span, .. }
            | Expr::Binary { span, .. }
            | Expr::Unary { span, .. }
            | Expr::Call { span, .. } => *span,
        }
    }

    pub fn int(value: i64) -> Self {
        Expr::IntLiteral {
            value,
            span: Span::default(),
        }
    }

    pub fn double(value: f64) -> Self {
        Expr::DoubleLiteral {
            value,
            span: Span::default(),
        }
    }

    pub fn string(value: impl Into<String>) -> Self {
        Expr::StringLiteral {
            value: value.into(),
            span: Span::default(),
        }
    }

    pub fn load(name: impl Into<String>) -> Self {
        Expr::Load {
            name: name.into(),
            span: Span::default(),
        }
    }

    pub fn binary(op: BinaryOp, left: Expr, right: Expr) -> Self {
        Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
            span: Span::default(),
        }
    }

    pub fn unary(op: UnaryOp, operand: Expr) -> Self {
        Expr::Unary {
            op,
            operand: Box::new(operand),
            span: Span::default(),
        }
    }

    pub fn call(name: impl Into<String>, args: Vec<Expr>) -> Self {
        Expr::Call {
            name: name.into(),
            args,
            span: Span::default(),
        }
    }

    pub fn range(lower: Expr, upper: Expr) -> Self {
        Self::binary(BinaryOp::Range, lower, upper)
    }

    /// Replace the span of this node
    pub fn at(mut self, new_span: Span) -> Self {
        match &mut self {
            Expr::IntLiteral { span, .. }
            | Expr::DoubleLiteral { span, .. }
            | Expr::StringLiteral { span, .. }
            | Expr::Load { span, .. }
            | Expr::Binary { span, .. }
            | Expr::Unary { span, .. }
            | Expr::Call { span, .. } => *span = new_span,
        }
        self
    }
}
