use std::fmt;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Program {
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub kind: StmtKind,
    pub line: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImportName {
    pub name: String,
    pub alias: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WithItem {
    pub context: Expr,
    pub alias: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Target {
    Name(String),
    Tuple(Vec<String>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    Import(Vec<ImportName>),
    /// `level` counts leading dots of a relative import.
    FromImport {
        module: Option<String>,
        level: usize,
        names: Vec<ImportName>,
    },
    With {
        items: Vec<WithItem>,
        body: Vec<Stmt>,
    },
    For {
        target: Target,
        iter: Expr,
        body: Vec<Stmt>,
    },
    While {
        test: Expr,
        body: Vec<Stmt>,
    },
    /// `elif` chains are stored as a nested `If` in `orelse`.
    If {
        test: Expr,
        body: Vec<Stmt>,
        orelse: Vec<Stmt>,
    },
    Assign {
        target: Target,
        value: Expr,
    },
    Expr(Expr),
    Pass,
    Break,
    Continue,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub line: u32,
    /// Height of the tree rooted here; leaves are 1.
    depth: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Keyword {
    pub name: String,
    pub value: Expr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Shr,
    Shl,
    Add,
    Sub,
    Eq,
    NotEq,
    And,
    Or,
}

impl BinOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinOp::Shr => ">>",
            BinOp::Shl => "<<",
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Eq => "==",
            BinOp::NotEq => "!=",
            BinOp::And => "and",
            BinOp::Or => "or",
        }
    }

    fn precedence(self) -> u8 {
        match self {
            BinOp::Or => 1,
            BinOp::And => 2,
            BinOp::Eq | BinOp::NotEq => 4,
            BinOp::Shr | BinOp::Shl => 5,
            BinOp::Add | BinOp::Sub => 6,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Name(String),
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    None,
    List(Vec<Expr>),
    Tuple(Vec<Expr>),
    Dict(Vec<(Expr, Expr)>),
    Attribute {
        value: Box<Expr>,
        attr: String,
    },
    Subscript {
        value: Box<Expr>,
        index: Box<Expr>,
    },
    Call {
        func: Box<Expr>,
        args: Vec<Expr>,
        keywords: Vec<Keyword>,
    },
    Binary {
        op: BinOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
}

fn child_depth(kind: &ExprKind) -> u32 {
    let max = |items: &[Expr]| items.iter().map(Expr::depth).max().unwrap_or(0);
    match kind {
        ExprKind::List(items) | ExprKind::Tuple(items) => max(items),
        ExprKind::Dict(pairs) => pairs.iter().map(|(k, v)| k.depth.max(v.depth)).max().unwrap_or(0),
        ExprKind::Attribute { value, .. } => value.depth,
        ExprKind::Subscript { value, index } => value.depth.max(index.depth),
        ExprKind::Call { func, args, keywords } => func
            .depth
            .max(max(args))
            .max(keywords.iter().map(|k| k.value.depth).max().unwrap_or(0)),
        ExprKind::Binary { left, right, .. } => left.depth.max(right.depth),
        ExprKind::Unary { operand, .. } => operand.depth,
        _ => 0,
    }
}

impl Expr {
    pub fn new(kind: ExprKind, line: u32) -> Self {
        let depth = 1 + child_depth(&kind);
        Self { kind, line, depth }
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }

    /// Dotted name for `Name` and chains of `Attribute` over a `Name`.
    pub fn dotted_name(&self) -> Option<String> {
        match &self.kind {
            ExprKind::Name(n) => Some(n.clone()),
            ExprKind::Attribute { value, attr } => value.dotted_name().map(|p| format!("{p}.{attr}")),
            _ => None,
        }
    }

    /// Visit this expression and every nested expression, parents first.
    pub fn walk<'a>(&'a self, f: &mut dyn FnMut(&'a Expr)) {
        f(self);
        match &self.kind {
            ExprKind::List(items) | ExprKind::Tuple(items) => {
                for e in items {
                    e.walk(f);
                }
            }
            ExprKind::Dict(pairs) => {
                for (k, v) in pairs {
                    k.walk(f);
                    v.walk(f);
                }
            }
            ExprKind::Attribute { value, .. } => value.walk(f),
            ExprKind::Subscript { value, index } => {
                value.walk(f);
                index.walk(f);
            }
            ExprKind::Call { func, args, keywords } => {
                func.walk(f);
                for e in args {
                    e.walk(f);
                }
                for k in keywords {
                    k.value.walk(f);
                }
            }
            ExprKind::Binary { left, right, .. } => {
                left.walk(f);
                right.walk(f);
            }
            ExprKind::Unary { operand, .. } => operand.walk(f),
            _ => {}
        }
    }

    /// Mutable counterpart of [`Expr::walk`]; children are visited after
    /// `f` has run on the parent.
    pub fn walk_mut(&mut self, f: &mut dyn FnMut(&mut Expr)) {
        f(self);
        match &mut self.kind {
            ExprKind::List(items) | ExprKind::Tuple(items) => {
                for e in items {
                    e.walk_mut(f);
                }
            }
            ExprKind::Dict(pairs) => {
                for (k, v) in pairs {
                    k.walk_mut(f);
                    v.walk_mut(f);
                }
            }
            ExprKind::Attribute { value, .. } => value.walk_mut(f),
            ExprKind::Subscript { value, index } => {
                value.walk_mut(f);
                index.walk_mut(f);
            }
            ExprKind::Call { func, args, keywords } => {
                func.walk_mut(f);
                for e in args {
                    e.walk_mut(f);
                }
                for k in keywords {
                    k.value.walk_mut(f);
                }
            }
            ExprKind::Binary { left, right, .. } => {
                left.walk_mut(f);
                right.walk_mut(f);
            }
            ExprKind::Unary { operand, .. } => operand.walk_mut(f),
            _ => {}
        }
        self.depth = 1 + child_depth(&self.kind);
    }

    fn precedence(&self) -> u8 {
        match &self.kind {
            ExprKind::Binary { op, .. } => op.precedence(),
            ExprKind::Unary { op: UnaryOp::Not, .. } => 3,
            ExprKind::Unary { op: UnaryOp::Neg, .. } => 7,
            _ => 8,
        }
    }
}

impl Stmt {
    pub fn new(kind: StmtKind, line: u32) -> Self {
        Self { kind, line }
    }

    /// Expressions owned directly by this statement (not by nested blocks).
    pub fn exprs(&self) -> Vec<&Expr> {
        match &self.kind {
            StmtKind::With { items, .. } => items.iter().map(|i| &i.context).collect(),
            StmtKind::For { iter, .. } => vec![iter],
            StmtKind::While { test, .. } | StmtKind::If { test, .. } => vec![test],
            StmtKind::Assign { value, .. } => vec![value],
            StmtKind::Expr(e) => vec![e],
            _ => Vec::new(),
        }
    }

    /// Nested statement blocks.
    pub fn blocks(&self) -> Vec<&[Stmt]> {
        match &self.kind {
            StmtKind::With { body, .. } | StmtKind::For { body, .. } | StmtKind::While { body, .. } => {
                vec![body.as_slice()]
            }
            StmtKind::If { body, orelse, .. } => vec![body.as_slice(), orelse.as_slice()],
            _ => Vec::new(),
        }
    }
}

impl Program {
    /// Visit every statement in source order, descending into blocks.
    pub fn walk_stmts<'a>(&'a self, f: &mut dyn FnMut(&'a Stmt)) {
        fn go<'a>(stmts: &'a [Stmt], f: &mut dyn FnMut(&'a Stmt)) {
            for s in stmts {
                f(s);
                for block in s.blocks() {
                    go(block, f);
                }
            }
        }
        go(&self.body, f);
    }

    /// Visit every expression mutably, statements in source order.
    pub fn walk_exprs_mut(&mut self, f: &mut dyn FnMut(&mut Expr)) {
        fn go(stmts: &mut [Stmt], f: &mut dyn FnMut(&mut Expr)) {
            for s in stmts {
                match &mut s.kind {
                    StmtKind::With { items, body } => {
                        for item in items.iter_mut() {
                            item.context.walk_mut(f);
                        }
                        go(body, f);
                    }
                    StmtKind::For { iter, body, .. } => {
                        iter.walk_mut(f);
                        go(body, f);
                    }
                    StmtKind::While { test, body } => {
                        test.walk_mut(f);
                        go(body, f);
                    }
                    StmtKind::If { test, body, orelse } => {
                        test.walk_mut(f);
                        go(body, f);
                        go(orelse, f);
                    }
                    StmtKind::Assign { value, .. } => value.walk_mut(f),
                    StmtKind::Expr(e) => e.walk_mut(f),
                    _ => {}
                }
            }
        }
        go(&mut self.body, f);
    }

    /// Visit every expression in the program.
    pub fn walk_exprs<'a>(&'a self, f: &mut dyn FnMut(&'a Expr)) {
        self.walk_stmts(&mut |s| {
            for e in s.exprs() {
                e.walk(f);
            }
        });
    }
}

// --- Printing ---

pub(crate) fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            c if (c as u32) < 0x20 => out.push_str(&format!("\\x{:02x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

fn write_operand(f: &mut fmt::Formatter<'_>, e: &Expr, min: u8) -> fmt::Result {
    if e.precedence() < min {
        write!(f, "({e})")
    } else {
        write!(f, "{e}")
    }
}

fn write_list(f: &mut fmt::Formatter<'_>, items: &[Expr]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ExprKind::Name(n) => f.write_str(n),
            ExprKind::Str(s) => f.write_str(&quote(s)),
            ExprKind::Int(i) => write!(f, "{i}"),
            ExprKind::Float(x) => write!(f, "{x:?}"),
            ExprKind::Bool(true) => f.write_str("True"),
            ExprKind::Bool(false) => f.write_str("False"),
            ExprKind::None => f.write_str("None"),
            ExprKind::List(items) => {
                f.write_str("[")?;
                write_list(f, items)?;
                f.write_str("]")
            }
            ExprKind::Tuple(items) => {
                f.write_str("(")?;
                write_list(f, items)?;
                if items.len() == 1 {
                    f.write_str(",")?;
                }
                f.write_str(")")
            }
            ExprKind::Dict(pairs) => {
                f.write_str("{")?;
                for (i, (k, v)) in pairs.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{k}: {v}")?;
                }
                f.write_str("}")
            }
            ExprKind::Attribute { value, attr } => {
                write_operand(f, value, 8)?;
                write!(f, ".{attr}")
            }
            ExprKind::Subscript { value, index } => {
                write_operand(f, value, 8)?;
                write!(f, "[{index}]")
            }
            ExprKind::Call { func, args, keywords } => {
                write_operand(f, func, 8)?;
                f.write_str("(")?;
                write_list(f, args)?;
                for (i, kw) in keywords.iter().enumerate() {
                    if i > 0 || !args.is_empty() {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}={}", kw.name, kw.value)?;
                }
                f.write_str(")")
            }
            ExprKind::Binary { op, left, right } => {
                let p = op.precedence();
                write_operand(f, left, p)?;
                write!(f, " {} ", op.symbol())?;
                write_operand(f, right, p + 1)
            }
            ExprKind::Unary { op: UnaryOp::Neg, operand } => {
                f.write_str("-")?;
                write_operand(f, operand, 7)
            }
            ExprKind::Unary { op: UnaryOp::Not, operand } => {
                f.write_str("not ")?;
                write_operand(f, operand, 3)
            }
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Name(n) => f.write_str(n),
            Target::Tuple(names) => f.write_str(&names.join(", ")),
        }
    }
}

fn write_names(names: &[ImportName]) -> String {
    names
        .iter()
        .map(|n| match &n.alias {
            Some(a) => format!("{} as {a}", n.name),
            None => n.name.clone(),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn write_block(out: &mut String, stmts: &[Stmt], depth: usize) {
    if stmts.is_empty() {
        out.push_str(&"    ".repeat(depth));
        out.push_str("pass\n");
        return;
    }
    for s in stmts {
        write_stmt(out, s, depth);
    }
}

fn write_stmt(out: &mut String, stmt: &Stmt, depth: usize) {
    let pad = "    ".repeat(depth);
    match &stmt.kind {
        StmtKind::Import(names) => out.push_str(&format!("{pad}import {}\n", write_names(names))),
        StmtKind::FromImport { module, level, names } => {
            let module = format!("{}{}", ".".repeat(*level), module.as_deref().unwrap_or(""));
            out.push_str(&format!("{pad}from {module} import {}\n", write_names(names)));
        }
        StmtKind::With { items, body } => {
            let items = items
                .iter()
                .map(|i| match &i.alias {
                    Some(a) => format!("{} as {a}", i.context),
                    None => i.context.to_string(),
                })
                .collect::<Vec<_>>()
                .join(", ");
            out.push_str(&format!("{pad}with {items}:\n"));
            write_block(out, body, depth + 1);
        }
        StmtKind::For { target, iter, body } => {
            out.push_str(&format!("{pad}for {target} in {iter}:\n"));
            write_block(out, body, depth + 1);
        }
        StmtKind::While { test, body } => {
            out.push_str(&format!("{pad}while {test}:\n"));
            write_block(out, body, depth + 1);
        }
        StmtKind::If { test, body, orelse } => {
            out.push_str(&format!("{pad}if {test}:\n"));
            write_block(out, body, depth + 1);
            if !orelse.is_empty() {
                out.push_str(&format!("{pad}else:\n"));
                write_block(out, orelse, depth + 1);
            }
        }
        StmtKind::Assign { target, value } => out.push_str(&format!("{pad}{target} = {value}\n")),
        StmtKind::Expr(e) => out.push_str(&format!("{pad}{e}\n")),
        StmtKind::Pass => out.push_str(&format!("{pad}pass\n")),
        StmtKind::Break => out.push_str(&format!("{pad}break\n")),
        StmtKind::Continue => out.push_str(&format!("{pad}continue\n")),
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = String::new();
        for s in &self.body {
            write_stmt(&mut out, s, 0);
        }
        f.write_str(&out)
    }
}
