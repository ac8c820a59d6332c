// mathvm Error Handling Module
// Translation and interpretation errors share one reporting type with spans and stack traces

use colored::*;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Represents a position in the source code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub line: usize,
    pub column: usize,
    pub offset: usize,
}

impl Position {
    pub fn new(line: usize, column: usize, offset: usize) -> Self {
        Self {
            line,
            column,
            offset,
        }
    }
}

impl Default for Position {
    fn default() -> Self {
        Self {
            line: 1,
            column: 1,
            offset: 0,
        }
    }
}

/// Represents a span in the source code (start to end position)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Span {
    pub start: Position,
    pub end: Position,
}

impl Span {
    pub fn new(start: Position, end: Position) -> Self {
        Self { start, end }
    }

    pub fn single(line: usize, column: usize, offset: usize) -> Self {
        let pos = Position::new(line, column, offset);
        Self {
            start: pos,
            end: pos,
        }
    }
}

/// Types of errors in mathvm
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Undeclared or duplicate variable, function or native
    NameError,
    TypeError,
    /// Call arity mismatch
    ArgumentError,
    /// Malformed AST shape, e.g. a `for` without a range
    SyntaxError,
    /// Translator invariant broken (unbound label, jump out of range)
    InternalError,
    /// Fatal interpreter fault
    RuntimeError,
}

impl ErrorKind {
    /// Whether the error was raised while translating, as opposed to executing
    pub fn is_static(&self) -> bool {
        !matches!(self, ErrorKind::RuntimeError)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::NameError => write!(f, "NameError"),
            ErrorKind::TypeError => write!(f, "TypeError"),
            ErrorKind::ArgumentError => write!(f, "ArgumentError"),
            ErrorKind::SyntaxError => write!(f, "SyntaxError"),
            ErrorKind::InternalError => write!(f, "InternalError"),
            ErrorKind::RuntimeError => write!(f, "RuntimeError"),
        }
    }
}

/// A stack frame for error traces
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackFrame {
    pub function_name: String,
    pub function_id: u16,
    pub offset: usize,
}

impl StackFrame {
    pub fn new(function_name: impl Into<String>, function_id: u16, offset: usize) -> Self {
        Self {
            function_name: function_name.into(),
            function_id,
            offset,
        }
    }
}

impl fmt::Display for StackFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "  at {} [fn {}] @{}",
            self.function_name, self.function_id, self.offset
        )
    }
}

/// Main error type for mathvm
#[derive(Debug, Clone)]
pub struct MathvmError {
    pub kind: ErrorKind,
    pub message: String,
    pub span: Span,
    pub file: String,
    pub help: Option<String>,
    pub stack_trace: Vec<StackFrame>,
    source_lines: Vec<String>,
}

impl MathvmError {
    pub fn new(kind: ErrorKind, message: impl Into<String>, span: Span) -> Self {
        Self {
            kind,
            message: message.into(),
            span,
            file: String::new(),
            help: None,
            stack_trace: Vec::new(),
            source_lines: Vec::new(),
        }
    }

    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }

    pub fn with_file(mut self, file: impl Into<String>) -> Self {
        self.file = file.into();
        self
    }

    pub fn with_source(mut self, source: &str) -> Self {
        self.source_lines = source.lines().map(String::from).collect();
        self
    }

    pub fn with_stack_trace(mut self, trace: Vec<StackFrame>) -> Self {
        self.stack_trace = trace;
        self
    }

    fn location(&self) -> String {
        let file = if self.file.is_empty() {
            "<ast>"
        } else {
            self.file.as_str()
        };
        format!(
            "{}:{}:{}",
            file, self.span.start.line, self.span.start.column
        )
    }

    /// Format the error for display
    pub fn format(&self) -> String {
        let mut output = String::new();

        // Runtime faults have no meaningful source position
        let header = if self.kind.is_static() {
            format!(
                "{}: {} at {}",
                self.kind.to_string().red().bold(),
                self.message.white().bold(),
                self.location()
            )
        } else {
            format!(
                "{}: {}",
                self.kind.to_string().red().bold(),
                self.message.white().bold()
            )
        };
        output.push_str(&header);
        output.push('\n');

        // Source context (show 3 lines: before, error line, after)
        if !self.source_lines.is_empty() {
            let error_line = self.span.start.line;
            let start_line = if error_line > 1 { error_line - 1 } else { 1 };
            let end_line = (error_line + 1).min(self.source_lines.len());

            output.push('\n');

            for line_num in start_line..=end_line {
                if let Some(line_content) = self.source_lines.get(line_num - 1) {
                    let line_num_str = format!("{:>4} |", line_num);

                    if line_num == error_line {
                        output.push_str(&format!("{} {}\n", line_num_str.red(), line_content));

                        let spaces = " ".repeat(6 + self.span.start.column);
                        let caret_len = if self.span.end.column > self.span.start.column {
                            self.span.end.column - self.span.start.column + 1
                        } else {
                            1
                        };
                        let carets = "^".repeat(caret_len);
                        output.push_str(&format!("{}{}\n", spaces, carets.red().bold()));
                    } else {
                        output.push_str(&format!("{} {}\n", line_num_str.dimmed(), line_content));
                    }
                }
            }
        }

        if let Some(ref help) = self.help {
            output.push_str(&format!("\n      {}: {}\n", "Help".cyan().bold(), help));
        }

        if !self.stack_trace.is_empty() {
            output.push_str(&format!("\n{}:\n", "Stack trace".yellow().bold()));
            for frame in self.stack_trace.iter() {
                output.push_str(&format!("{}\n", frame));
            }
        }

        output
    }
}

impl fmt::Display for MathvmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format())
    }
}

impl std::error::Error for MathvmError {}

/// Result type for mathvm operations
pub type MathvmResult<T> = Result<T, MathvmError>;

// Convenience constructors for common errors
impl MathvmError {
    pub fn name_error(message: impl Into<String>, span: Span) -> Self {
        Self::new(ErrorKind::NameError, message, span)
    }

    pub fn type_error(message: impl Into<String>, span: Span) -> Self {
        Self::new(ErrorKind::TypeError, message, span)
    }

    pub fn argument_error(message: impl Into<String>, span: Span) -> Self {
        Self::new(ErrorKind::ArgumentError, message, span)
    }

    pub fn syntax_error(message: impl Into<String>, span: Span) -> Self {
        Self::new(ErrorKind::SyntaxError, message, span)
    }

    pub fn internal_error(message: impl Into<String>, span: Span) -> Self {
        Self::new(ErrorKind::InternalError, message, span)
    }

    pub fn runtime_error(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::RuntimeError, message, Span::default())
    }
}
