//! A restricted, Python-flavoured scripting language for describing
//! diagrams. Scripts are parsed into an AST, checked, and evaluated against
//! a fixed namespace of node classes; there is no way to reach the host.

pub mod ast;
pub mod diagram;
pub mod eval;
pub mod lexer;
pub mod namespace;
pub mod parser;

use ast::{Expr, ExprKind, Keyword, Program};
use thiserror::Error;

pub use diagram::DiagramSpec;
pub use eval::{evaluate, EvalError, Limits};
pub use namespace::Namespace;
pub use parser::parse;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message} (line {line}, column {column})")]
pub struct SyntaxError {
    pub message: String,
    pub line: u32,
    pub column: u32,
}

impl SyntaxError {
    pub fn new(message: impl Into<String>, line: u32, column: u32) -> Self {
        Self {
            message: message.into(),
            line,
            column,
        }
    }
}

/// Positions of the `Diagram` parameters the generator controls.
const DIAGRAM_OVERRIDES: &[(&str, usize)] = &[("filename", 1), ("outformat", 4), ("show", 6)];

fn is_diagram_call(e: &Expr) -> bool {
    matches!(&e.kind, ExprKind::Call { func, .. } if matches!(&func.kind, ExprKind::Name(n) if n == "Diagram"))
}

/// True when the program calls `Diagram(...)` anywhere.
pub fn contains_diagram_call(program: &Program) -> bool {
    let mut found = false;
    program.walk_exprs(&mut |e| found |= is_diagram_call(e));
    found
}

/// Force `show=False`, `filename` and `outformat` on every `Diagram(...)`
/// call. Existing values are replaced in place, positional or keyword;
/// missing ones are appended as keywords. Returns the number of calls
/// rewritten.
pub fn normalize_diagram_calls(program: &mut Program, filename: &str, outformat: &str) -> usize {
    let mut count = 0;
    program.walk_exprs_mut(&mut |e| {
        let line = e.line;
        let ExprKind::Call { func, args, keywords } = &mut e.kind else {
            return;
        };
        if !matches!(&func.kind, ExprKind::Name(n) if n == "Diagram") {
            return;
        }
        count += 1;
        for &(param, position) in DIAGRAM_OVERRIDES {
            let value = match param {
                "filename" => ExprKind::Str(filename.to_string()),
                "outformat" => ExprKind::Str(outformat.to_string()),
                _ => ExprKind::Bool(false),
            };
            let value = Expr::new(value, line);
            if let Some(slot) = args.get_mut(position) {
                *slot = value;
            } else if let Some(kw) = keywords.iter_mut().find(|k| k.name == param) {
                kw.value = value;
            } else {
                keywords.push(Keyword {
                    name: param.to_string(),
                    value,
                });
            }
        }
    });
    count
}

/// Re-print `source` with the `Diagram(...)` overrides applied.
pub fn normalize_source(source: &str, filename: &str, outformat: &str) -> Result<String, SyntaxError> {
    let mut program = parse(source)?;
    normalize_diagram_calls(&mut program, filename, outformat);
    Ok(program.to_string())
}
