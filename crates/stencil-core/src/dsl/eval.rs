use super::ast::*;
use super::diagram::{
    set_attr, Attrs, ClusterSpec, DiagramSpec, EdgeDirection, EdgeSpec, NodeSpec, CURVE_STYLES, DIRECTIONS,
};
use super::namespace::{Namespace, NodeClass};
use crate::OutputFormat;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Upper bounds on what one script may build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Limits {
    pub max_nodes: usize,
    pub max_edges: usize,
    /// String bytes plus collection items one value may hold.
    pub max_value_size: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_nodes: 2000,
            max_edges: 10_000,
            max_value_size: 100_000,
        }
    }
}

const MAX_RANGE: i64 = 10_000;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum EvalError {
    #[error("name '{name}' is not defined (line {line})")]
    Name { name: String, line: u32 },
    #[error("{message} (line {line})")]
    Runtime { message: String, line: u32 },
    #[error("{what} limit of {limit} exceeded (line {line})")]
    LimitExceeded { what: &'static str, limit: usize, line: u32 },
    #[error("evaluation cancelled")]
    Cancelled,
}

type EvalResult<T> = Result<T, EvalError>;

fn runtime(message: impl Into<String>, line: u32) -> EvalError {
    EvalError::Runtime {
        message: message.into(),
        line,
    }
}

// --- Values ---

#[derive(Debug, Clone, PartialEq, Default)]
struct EdgeAttrs {
    label: String,
    color: String,
    style: String,
    forward: bool,
    reverse: bool,
    extra: Attrs,
}

/// Result of `Edge(...)`, optionally already attached to source nodes.
#[derive(Debug, Clone, PartialEq)]
struct PendingEdge {
    sources: Vec<usize>,
    attrs: EdgeAttrs,
}

#[derive(Debug, Clone, PartialEq)]
struct DiagramArgs {
    name: String,
    filename: String,
    direction: String,
    curvestyle: String,
    outformat: OutputFormat,
    autolabel: bool,
    show: bool,
    strict: bool,
    graph_attr: Attrs,
    node_attr: Attrs,
    edge_attr: Attrs,
}

#[derive(Debug, Clone, PartialEq)]
struct ClusterArgs {
    label: String,
    direction: String,
    graph_attr: Attrs,
}

#[derive(Debug, Clone, PartialEq)]
enum Builtin {
    Diagram,
    Cluster,
    Edge,
    Custom,
    Node(NodeClass),
    Range,
    Len,
    Str,
    Print,
}

#[derive(Debug, Clone, PartialEq)]
enum Value {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
    Tuple(Vec<Value>),
    Dict(Vec<(String, Value)>),
    Node(usize),
    Edge(PendingEdge),
    Diagram(Box<DiagramArgs>),
    Cluster(ClusterArgs),
    Builtin(Builtin),
}

impl Value {
    /// Weight charged against `Limits::max_value_size`.
    fn size(&self) -> usize {
        match self {
            Value::Str(s) => s.len(),
            Value::List(items) | Value::Tuple(items) => Value::size_of(items),
            Value::Dict(pairs) => pairs.iter().map(|(k, v)| 1 + k.len() + v.size()).sum(),
            _ => 1,
        }
    }

    fn size_of(items: &[Value]) -> usize {
        items.iter().map(|v| 1 + v.size()).sum()
    }

    fn type_name(&self) -> &'static str {
        match self {
            Value::None => "NoneType",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::List(_) => "list",
            Value::Tuple(_) => "tuple",
            Value::Dict(_) => "dict",
            Value::Node(_) => "Node",
            Value::Edge(_) => "Edge",
            Value::Diagram(_) => "Diagram",
            Value::Cluster(_) => "Cluster",
            Value::Builtin(_) => "builtin_function_or_method",
        }
    }

    fn truthy(&self) -> bool {
        match self {
            Value::None => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(x) => *x != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::List(v) | Value::Tuple(v) => !v.is_empty(),
            Value::Dict(d) => !d.is_empty(),
            _ => true,
        }
    }

    fn loose_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => (*a as f64) == *b,
            (Value::Bool(a), Value::Int(b)) | (Value::Int(b), Value::Bool(a)) => i64::from(*a) == *b,
            (Value::List(a), Value::List(b)) | (Value::Tuple(a), Value::Tuple(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.loose_eq(y))
            }
            _ => self == other,
        }
    }

    /// Text used when a value becomes a Graphviz attribute or `str(x)`.
    fn to_text(&self) -> String {
        match self {
            Value::Str(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn seq(f: &mut fmt::Formatter<'_>, items: &[Value]) -> fmt::Result {
            for (i, v) in items.iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                match v {
                    Value::Str(s) => write!(f, "'{s}'")?,
                    other => write!(f, "{other}")?,
                }
            }
            Ok(())
        }
        match self {
            Value::None => f.write_str("None"),
            Value::Bool(true) => f.write_str("True"),
            Value::Bool(false) => f.write_str("False"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x:?}"),
            Value::Str(s) => f.write_str(s),
            Value::List(items) => {
                f.write_str("[")?;
                seq(f, items)?;
                f.write_str("]")
            }
            Value::Tuple(items) => {
                f.write_str("(")?;
                seq(f, items)?;
                if items.len() == 1 {
                    f.write_str(",")?;
                }
                f.write_str(")")
            }
            Value::Dict(pairs) => {
                f.write_str("{")?;
                for (i, (k, v)) in pairs.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "'{k}': {v}")?;
                }
                f.write_str("}")
            }
            Value::Node(id) => write!(f, "<Node node_{id}>"),
            Value::Edge(_) => f.write_str("<Edge>"),
            Value::Diagram(d) => write!(f, "<Diagram {:?}>", d.name),
            Value::Cluster(c) => write!(f, "<Cluster {:?}>", c.label),
            Value::Builtin(b) => write!(f, "<built-in {}>", builtin_name(b)),
        }
    }
}

fn builtin_name(b: &Builtin) -> &'static str {
    match b {
        Builtin::Diagram => "Diagram",
        Builtin::Cluster => "Cluster",
        Builtin::Edge => "Edge",
        Builtin::Custom => "Custom",
        Builtin::Node(c) => c.name,
        Builtin::Range => "range",
        Builtin::Len => "len",
        Builtin::Str => "str",
        Builtin::Print => "print",
    }
}

fn builtin(name: &str) -> Option<Builtin> {
    Some(match name {
        "Diagram" => Builtin::Diagram,
        "Cluster" => Builtin::Cluster,
        "Edge" => Builtin::Edge,
        "Custom" => Builtin::Custom,
        "range" => Builtin::Range,
        "len" => Builtin::Len,
        "str" => Builtin::Str,
        "print" => Builtin::Print,
        _ => return None,
    })
}

// --- Argument binding ---

/// Positional and keyword arguments matched against a parameter list.
struct Bound {
    slots: Vec<Option<Value>>,
    extra: Vec<(String, Value)>,
}

impl Bound {
    fn take(&mut self, i: usize) -> Option<Value> {
        self.slots.get_mut(i).and_then(Option::take)
    }
}

fn bind(
    fname: &str,
    params: &[&str],
    args: Vec<Value>,
    kwargs: Vec<(String, Value)>,
    allow_extra: bool,
    line: u32,
) -> EvalResult<Bound> {
    if args.len() > params.len() {
        return Err(runtime(
            format!(
                "{fname}() takes {} positional arguments but {} were given",
                params.len(),
                args.len()
            ),
            line,
        ));
    }
    let mut slots: Vec<Option<Value>> = vec![None; params.len()];
    for (i, v) in args.into_iter().enumerate() {
        slots[i] = Some(v);
    }
    let mut extra = Vec::new();
    for (name, v) in kwargs {
        match params.iter().position(|p| *p == name) {
            Some(i) if slots[i].is_some() => {
                return Err(runtime(format!("{fname}() got multiple values for argument '{name}'"), line));
            }
            Some(i) => slots[i] = Some(v),
            None if allow_extra => extra.push((name, v)),
            None => {
                return Err(runtime(format!("{fname}() got an unexpected keyword argument '{name}'"), line));
            }
        }
    }
    Ok(Bound { slots, extra })
}

fn want_str(fname: &str, param: &str, v: Option<Value>, default: &str, line: u32) -> EvalResult<String> {
    match v {
        None | Some(Value::None) => Ok(default.to_string()),
        Some(Value::Str(s)) => Ok(s),
        Some(other) => Err(runtime(
            format!("{fname}() argument '{param}' must be str, not {}", other.type_name()),
            line,
        )),
    }
}

fn want_bool(v: Option<Value>, default: bool) -> bool {
    v.map(|v| v.truthy()).unwrap_or(default)
}

fn want_attrs(fname: &str, param: &str, v: Option<Value>, line: u32) -> EvalResult<Attrs> {
    match v {
        None | Some(Value::None) => Ok(Vec::new()),
        Some(Value::Dict(pairs)) => pairs
            .into_iter()
            .map(|(k, v)| {
                let mut chars = k.chars();
                let valid = matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
                    && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
                if !valid {
                    return Err(runtime(format!("{fname}() argument '{param}' has invalid attribute name '{k}'"), line));
                }
                Ok((k, v.to_text()))
            })
            .collect(),
        Some(other) => Err(runtime(
            format!("{fname}() argument '{param}' must be dict, not {}", other.type_name()),
            line,
        )),
    }
}

fn want_direction(fname: &str, v: Option<Value>, line: u32) -> EvalResult<String> {
    let direction = want_str(fname, "direction", v, "LR", line)?;
    if !DIRECTIONS.contains(&direction.as_str()) {
        return Err(runtime(format!("{direction} is not a valid direction"), line));
    }
    Ok(direction)
}

// --- Evaluator ---

enum Flow {
    Normal,
    Break,
    Continue,
}

struct OpenDiagram {
    args: DiagramArgs,
    clusters: Vec<ClusterSpec>,
    nodes: Vec<NodeSpec>,
    edges: Vec<EdgeSpec>,
    /// Indices into `clusters` of the currently open `with Cluster` blocks.
    stack: Vec<usize>,
}

struct Evaluator<'a> {
    namespace: &'a Namespace,
    limits: Limits,
    cancel: &'a CancellationToken,
    vars: HashMap<String, Value>,
    open: Option<OpenDiagram>,
    finished: Option<DiagramSpec>,
    loop_depth: usize,
}

/// Run a parsed script and return the diagram it described, if any.
///
/// `cancel` is polled before every statement and loop iteration; once it
/// fires evaluation stops with [`EvalError::Cancelled`].
pub fn evaluate(
    program: &Program,
    namespace: &Namespace,
    limits: Limits,
    cancel: &CancellationToken,
) -> Result<Option<DiagramSpec>, EvalError> {
    let mut ev = Evaluator {
        namespace,
        limits,
        cancel,
        vars: HashMap::new(),
        open: None,
        finished: None,
        loop_depth: 0,
    };
    ev.block(&program.body)?;
    Ok(ev.finished)
}

impl Evaluator<'_> {
    fn check_cancel(&self) -> EvalResult<()> {
        if self.cancel.is_cancelled() {
            Err(EvalError::Cancelled)
        } else {
            Ok(())
        }
    }

    fn block(&mut self, stmts: &[Stmt]) -> EvalResult<Flow> {
        for stmt in stmts {
            match self.stmt(stmt)? {
                Flow::Normal => {}
                flow => return Ok(flow),
            }
        }
        Ok(Flow::Normal)
    }

    fn stmt(&mut self, stmt: &Stmt) -> EvalResult<Flow> {
        self.check_cancel()?;
        let line = stmt.line;
        match &stmt.kind {
            StmtKind::Import(_) | StmtKind::FromImport { .. } => {
                Err(runtime("import statements are not supported", line))
            }
            StmtKind::Pass => Ok(Flow::Normal),
            StmtKind::Break if self.loop_depth > 0 => Ok(Flow::Break),
            StmtKind::Continue if self.loop_depth > 0 => Ok(Flow::Continue),
            StmtKind::Break | StmtKind::Continue => Err(runtime("'break' or 'continue' outside loop", line)),
            StmtKind::Expr(e) => {
                self.expr(e)?;
                Ok(Flow::Normal)
            }
            StmtKind::Assign { target, value } => {
                let v = self.expr(value)?;
                self.assign(target, v, line)?;
                Ok(Flow::Normal)
            }
            StmtKind::If { test, body, orelse } => {
                if self.expr(test)?.truthy() {
                    self.block(body)
                } else {
                    self.block(orelse)
                }
            }
            StmtKind::While { test, body } => {
                self.loop_depth += 1;
                let result = self.while_loop(test, body);
                self.loop_depth -= 1;
                result
            }
            StmtKind::For { target, iter, body } => {
                let items = match self.expr(iter)? {
                    Value::List(v) | Value::Tuple(v) => v,
                    Value::Str(s) => s.chars().map(|c| Value::Str(c.to_string())).collect(),
                    Value::Dict(pairs) => pairs.into_iter().map(|(k, _)| Value::Str(k)).collect(),
                    other => return Err(runtime(format!("'{}' object is not iterable", other.type_name()), line)),
                };
                self.loop_depth += 1;
                let result = self.for_loop(target, items, body, line);
                self.loop_depth -= 1;
                result
            }
            StmtKind::With { items, body } => self.with(items, body, line),
        }
    }

    fn while_loop(&mut self, test: &Expr, body: &[Stmt]) -> EvalResult<Flow> {
        loop {
            self.check_cancel()?;
            if !self.expr(test)?.truthy() {
                return Ok(Flow::Normal);
            }
            if let Flow::Break = self.block(body)? {
                return Ok(Flow::Normal);
            }
        }
    }

    fn for_loop(&mut self, target: &Target, items: Vec<Value>, body: &[Stmt], line: u32) -> EvalResult<Flow> {
        for item in items {
            self.check_cancel()?;
            self.assign(target, item, line)?;
            if let Flow::Break = self.block(body)? {
                break;
            }
        }
        Ok(Flow::Normal)
    }

    fn assign(&mut self, target: &Target, value: Value, line: u32) -> EvalResult<()> {
        match target {
            Target::Name(n) => {
                self.vars.insert(n.clone(), value);
            }
            Target::Tuple(names) => {
                let items = match value {
                    Value::List(v) | Value::Tuple(v) => v,
                    other => {
                        return Err(runtime(
                            format!("cannot unpack non-iterable {} object", other.type_name()),
                            line,
                        ))
                    }
                };
                if items.len() != names.len() {
                    let message = if items.len() < names.len() {
                        format!("not enough values to unpack (expected {}, got {})", names.len(), items.len())
                    } else {
                        format!("too many values to unpack (expected {})", names.len())
                    };
                    return Err(runtime(message, line));
                }
                for (n, v) in names.iter().zip(items) {
                    self.vars.insert(n.clone(), v);
                }
            }
        }
        Ok(())
    }

    fn with(&mut self, items: &[WithItem], body: &[Stmt], line: u32) -> EvalResult<Flow> {
        let Some((item, rest)) = items.split_first() else {
            return self.block(body);
        };
        let ctx = self.expr(&item.context)?;
        if let Some(alias) = &item.alias {
            self.vars.insert(alias.clone(), ctx.clone());
        }
        match ctx {
            Value::Diagram(args) => {
                if self.open.is_some() {
                    return Err(runtime("Diagram contexts cannot be nested", line));
                }
                if self.finished.is_some() {
                    return Err(runtime("only one Diagram() context is supported per script", line));
                }
                debug!(name = %args.name, "opening diagram");
                self.open = Some(OpenDiagram {
                    args: *args,
                    clusters: Vec::new(),
                    nodes: Vec::new(),
                    edges: Vec::new(),
                    stack: Vec::new(),
                });
                let flow = self.with(rest, body, line)?;
                if let Some(open) = self.open.take() {
                    self.finished = Some(finish(open));
                }
                Ok(flow)
            }
            Value::Cluster(args) => {
                let Some(open) = self.open.as_mut() else {
                    return Err(runtime("Cluster() must be used inside a Diagram() context", line));
                };
                let parent = open.stack.last().copied();
                open.clusters.push(ClusterSpec {
                    label: args.label,
                    direction: args.direction,
                    parent,
                    graph_attr: args.graph_attr,
                });
                let index = open.clusters.len() - 1;
                open.stack.push(index);
                let flow = self.with(rest, body, line)?;
                if let Some(open) = self.open.as_mut() {
                    open.stack.pop();
                }
                Ok(flow)
            }
            other => Err(runtime(
                format!("'{}' object does not support the context manager protocol", other.type_name()),
                line,
            )),
        }
    }

    // --- Expressions ---

    fn lookup(&self, name: &str, line: u32) -> EvalResult<Value> {
        if let Some(v) = self.vars.get(name) {
            return Ok(v.clone());
        }
        if let Some(b) = builtin(name) {
            return Ok(Value::Builtin(b));
        }
        if let Some(class) = self.namespace.lookup(name) {
            return Ok(Value::Builtin(Builtin::Node(class.clone())));
        }
        Err(EvalError::Name {
            name: name.to_string(),
            line,
        })
    }

    fn expr(&mut self, e: &Expr) -> EvalResult<Value> {
        let line = e.line;
        match &e.kind {
            ExprKind::Name(n) => self.lookup(n, line),
            ExprKind::Str(s) => Ok(Value::Str(s.clone())),
            ExprKind::Int(i) => Ok(Value::Int(*i)),
            ExprKind::Float(x) => Ok(Value::Float(*x)),
            ExprKind::Bool(b) => Ok(Value::Bool(*b)),
            ExprKind::None => Ok(Value::None),
            ExprKind::List(items) => Ok(Value::List(self.exprs(items)?)),
            ExprKind::Tuple(items) => Ok(Value::Tuple(self.exprs(items)?)),
            ExprKind::Dict(pairs) => {
                let mut out: Vec<(String, Value)> = Vec::new();
                for (k, v) in pairs {
                    let key = match self.expr(k)? {
                        Value::Str(s) => s,
                        other => return Err(runtime(format!("dict keys must be str, not {}", other.type_name()), line)),
                    };
                    let value = self.expr(v)?;
                    match out.iter_mut().find(|(existing, _)| *existing == key) {
                        Some(slot) => slot.1 = value,
                        None => out.push((key, value)),
                    }
                }
                Ok(Value::Dict(out))
            }
            ExprKind::Attribute { value, attr } => {
                let v = self.expr(value)?;
                Err(runtime(format!("'{}' object has no attribute '{attr}'", v.type_name()), line))
            }
            ExprKind::Subscript { value, index } => {
                let v = self.expr(value)?;
                let i = self.expr(index)?;
                subscript(v, i, line)
            }
            ExprKind::Call { func, args, keywords } => {
                let f = self.expr(func)?;
                let args = self.exprs(args)?;
                let mut kwargs = Vec::with_capacity(keywords.len());
                for k in keywords {
                    kwargs.push((k.name.clone(), self.expr(&k.value)?));
                }
                self.call(f, args, kwargs, line)
            }
            ExprKind::Unary { op, operand } => {
                let v = self.expr(operand)?;
                match (op, v) {
                    (UnaryOp::Not, v) => Ok(Value::Bool(!v.truthy())),
                    (UnaryOp::Neg, Value::Int(i)) => i
                        .checked_neg()
                        .map(Value::Int)
                        .ok_or_else(|| runtime("integer overflow", line)),
                    (UnaryOp::Neg, Value::Float(x)) => Ok(Value::Float(-x)),
                    (UnaryOp::Neg, other) => Err(runtime(
                        format!("bad operand type for unary -: '{}'", other.type_name()),
                        line,
                    )),
                }
            }
            ExprKind::Binary { op: BinOp::And, left, right } => {
                let l = self.expr(left)?;
                if l.truthy() {
                    self.expr(right)
                } else {
                    Ok(l)
                }
            }
            ExprKind::Binary { op: BinOp::Or, left, right } => {
                let l = self.expr(left)?;
                if l.truthy() {
                    Ok(l)
                } else {
                    self.expr(right)
                }
            }
            ExprKind::Binary { op, left, right } => {
                let l = self.expr(left)?;
                let r = self.expr(right)?;
                self.binary(*op, l, r, line)
            }
        }
    }

    fn exprs(&mut self, items: &[Expr]) -> EvalResult<Vec<Value>> {
        items.iter().map(|e| self.expr(e)).collect()
    }

    fn check_size(&self, size: usize, line: u32) -> EvalResult<()> {
        let limit = self.limits.max_value_size;
        if size > limit {
            return Err(EvalError::LimitExceeded {
                what: "value size",
                limit,
                line,
            });
        }
        Ok(())
    }

    fn binary(&mut self, op: BinOp, l: Value, r: Value, line: u32) -> EvalResult<Value> {
        let unsupported = |l: &Value, r: &Value| {
            runtime(
                format!(
                    "unsupported operand type(s) for {}: '{}' and '{}'",
                    op.symbol(),
                    l.type_name(),
                    r.type_name()
                ),
                line,
            )
        };
        match op {
            BinOp::Eq => Ok(Value::Bool(l.loose_eq(&r))),
            BinOp::NotEq => Ok(Value::Bool(!l.loose_eq(&r))),
            BinOp::Add => match (l, r) {
                (Value::Int(a), Value::Int(b)) => a
                    .checked_add(b)
                    .map(Value::Int)
                    .ok_or_else(|| runtime("integer overflow", line)),
                (Value::Int(a), Value::Float(b)) => Ok(Value::Float(a as f64 + b)),
                (Value::Float(a), Value::Int(b)) => Ok(Value::Float(a + b as f64)),
                (Value::Float(a), Value::Float(b)) => Ok(Value::Float(a + b)),
                (Value::Str(a), Value::Str(b)) => {
                    self.check_size(a.len() + b.len(), line)?;
                    Ok(Value::Str(a + &b))
                }
                (Value::List(mut a), Value::List(b)) => {
                    self.check_size(Value::size_of(&a) + Value::size_of(&b), line)?;
                    a.extend(b);
                    Ok(Value::List(a))
                }
                (Value::Tuple(mut a), Value::Tuple(b)) => {
                    self.check_size(Value::size_of(&a) + Value::size_of(&b), line)?;
                    a.extend(b);
                    Ok(Value::Tuple(a))
                }
                (l, r) => Err(unsupported(&l, &r)),
            },
            BinOp::Sub => match (l, r) {
                (Value::Int(a), Value::Int(b)) => a
                    .checked_sub(b)
                    .map(Value::Int)
                    .ok_or_else(|| runtime("integer overflow", line)),
                (Value::Int(a), Value::Float(b)) => Ok(Value::Float(a as f64 - b)),
                (Value::Float(a), Value::Int(b)) => Ok(Value::Float(a - b as f64)),
                (Value::Float(a), Value::Float(b)) => Ok(Value::Float(a - b)),
                (l, r) => self.connect(op, l, r, line),
            },
            BinOp::Shr | BinOp::Shl => self.connect(op, l, r, line),
            BinOp::And | BinOp::Or => Err(unsupported(&l, &r)),
        }
    }

    /// Node indices for a node or a list/tuple of nodes.
    fn nodes_of(v: &Value) -> Option<Vec<usize>> {
        match v {
            Value::Node(id) => Some(vec![*id]),
            Value::List(items) | Value::Tuple(items) => items
                .iter()
                .map(|i| match i {
                    Value::Node(id) => Some(*id),
                    _ => None,
                })
                .collect(),
            _ => None,
        }
    }

    fn connect(&mut self, op: BinOp, l: Value, r: Value, line: u32) -> EvalResult<Value> {
        let unsupported = || {
            runtime(
                format!(
                    "unsupported operand type(s) for {}: '{}' and '{}'",
                    op.symbol(),
                    l.type_name(),
                    r.type_name()
                ),
                line,
            )
        };
        let (forward, reverse) = match op {
            BinOp::Shr => (true, false),
            BinOp::Shl => (false, true),
            _ => (false, false),
        };
        let left_is_seq = matches!(l, Value::List(_) | Value::Tuple(_));

        match (&l, &r) {
            (_, Value::Edge(pending)) => {
                if !pending.sources.is_empty() {
                    return Err(unsupported());
                }
                let sources = Self::nodes_of(&l).ok_or_else(unsupported)?;
                let mut attrs = pending.attrs.clone();
                attrs.forward |= forward;
                attrs.reverse |= reverse;
                Ok(Value::Edge(PendingEdge { sources, attrs }))
            }
            (Value::Edge(pending), _) => {
                if pending.sources.is_empty() {
                    return Err(runtime("Edge() must be connected from a node", line));
                }
                let heads = Self::nodes_of(&r).ok_or_else(unsupported)?;
                let mut attrs = pending.attrs.clone();
                attrs.forward |= forward;
                attrs.reverse |= reverse;
                let tails = pending.sources.clone();
                for &tail in &tails {
                    for &head in &heads {
                        self.add_edge(tail, head, &attrs, line)?;
                    }
                }
                Ok(r.clone())
            }
            _ => {
                let right_is_seq = matches!(r, Value::List(_) | Value::Tuple(_));
                if left_is_seq && right_is_seq {
                    return Err(unsupported());
                }
                let tails = Self::nodes_of(&l).ok_or_else(unsupported)?;
                let heads = Self::nodes_of(&r).ok_or_else(unsupported)?;
                let attrs = EdgeAttrs {
                    forward,
                    reverse,
                    ..EdgeAttrs::default()
                };
                for &tail in &tails {
                    for &head in &heads {
                        self.add_edge(tail, head, &attrs, line)?;
                    }
                }
                Ok(r.clone())
            }
        }
    }

    fn open_diagram(&mut self, what: &str, line: u32) -> EvalResult<&mut OpenDiagram> {
        self.open
            .as_mut()
            .ok_or_else(|| runtime(format!("{what} must be created inside a Diagram() context"), line))
    }

    fn add_edge(&mut self, tail: usize, head: usize, attrs: &EdgeAttrs, line: u32) -> EvalResult<()> {
        let limit = self.limits.max_edges;
        let open = self.open_diagram("Edges", line)?;
        if open.edges.len() >= limit {
            return Err(EvalError::LimitExceeded {
                what: "edge",
                limit,
                line,
            });
        }
        open.edges.push(EdgeSpec {
            tail,
            head,
            direction: EdgeDirection::from_flags(attrs.forward, attrs.reverse),
            label: attrs.label.clone(),
            color: attrs.color.clone(),
            style: attrs.style.clone(),
            attrs: attrs.extra.clone(),
        });
        Ok(())
    }

    fn add_node(&mut self, mut node: NodeSpec, line: u32) -> EvalResult<Value> {
        let limit = self.limits.max_nodes;
        let open = self.open_diagram("Nodes", line)?;
        if open.nodes.len() >= limit {
            return Err(EvalError::LimitExceeded {
                what: "node",
                limit,
                line,
            });
        }
        let index = open.nodes.len();
        node.id = format!("node_{index}");
        node.cluster = open.stack.last().copied();
        open.nodes.push(node);
        Ok(Value::Node(index))
    }

    fn call(&mut self, f: Value, args: Vec<Value>, kwargs: Vec<(String, Value)>, line: u32) -> EvalResult<Value> {
        let b = match f {
            Value::Builtin(b) => b,
            other => return Err(runtime(format!("'{}' object is not callable", other.type_name()), line)),
        };
        match b {
            Builtin::Diagram => {
                let params = [
                    "name",
                    "filename",
                    "direction",
                    "curvestyle",
                    "outformat",
                    "autolabel",
                    "show",
                    "strict",
                    "graph_attr",
                    "node_attr",
                    "edge_attr",
                ];
                let mut a = bind("Diagram", &params, args, kwargs, false, line)?;
                let name = want_str("Diagram", "name", a.take(0), "", line)?;
                let filename = want_str("Diagram", "filename", a.take(1), "", line)?;
                let direction = want_direction("Diagram", a.take(2), line)?;
                let curvestyle = want_str("Diagram", "curvestyle", a.take(3), "ortho", line)?;
                if !CURVE_STYLES.contains(&curvestyle.as_str()) {
                    return Err(runtime(format!("{curvestyle} is not a valid curvestyle"), line));
                }
                let format = want_str("Diagram", "outformat", a.take(4), "png", line)?;
                let outformat = OutputFormat::parse(&format)
                    .ok_or_else(|| runtime(format!("{format} is not a valid output format"), line))?;
                let autolabel = want_bool(a.take(5), false);
                let show = want_bool(a.take(6), true);
                let strict = want_bool(a.take(7), false);
                let graph_attr = want_attrs("Diagram", "graph_attr", a.take(8), line)?;
                let node_attr = want_attrs("Diagram", "node_attr", a.take(9), line)?;
                let edge_attr = want_attrs("Diagram", "edge_attr", a.take(10), line)?;
                Ok(Value::Diagram(Box::new(DiagramArgs {
                    name,
                    filename,
                    direction,
                    curvestyle,
                    outformat,
                    autolabel,
                    show,
                    strict,
                    graph_attr,
                    node_attr,
                    edge_attr,
                })))
            }
            Builtin::Cluster => {
                let mut a = bind("Cluster", &["label", "direction", "graph_attr"], args, kwargs, false, line)?;
                Ok(Value::Cluster(ClusterArgs {
                    label: want_str("Cluster", "label", a.take(0), "cluster", line)?,
                    direction: want_direction("Cluster", a.take(1), line)?,
                    graph_attr: want_attrs("Cluster", "graph_attr", a.take(2), line)?,
                }))
            }
            Builtin::Edge => {
                let params = ["node", "forward", "reverse", "label", "color", "style"];
                let mut a = bind("Edge", &params, args, kwargs, true, line)?;
                let sources = match a.take(0) {
                    None | Some(Value::None) => Vec::new(),
                    Some(v) => Self::nodes_of(&v)
                        .ok_or_else(|| runtime("Edge() argument 'node' must be a Node", line))?,
                };
                let attrs = EdgeAttrs {
                    forward: want_bool(a.take(1), false),
                    reverse: want_bool(a.take(2), false),
                    label: a.take(3).map(|v| v.to_text()).unwrap_or_default(),
                    color: a.take(4).map(|v| v.to_text()).unwrap_or_default(),
                    style: a.take(5).map(|v| v.to_text()).unwrap_or_default(),
                    extra: a.extra.into_iter().map(|(k, v)| (k, v.to_text())).collect(),
                };
                Ok(Value::Edge(PendingEdge { sources, attrs }))
            }
            Builtin::Custom => {
                let mut a = bind("Custom", &["label", "icon_path"], args, kwargs, true, line)?;
                let label = a.take(0).map(|v| v.to_text()).unwrap_or_default();
                let icon = want_str("Custom", "icon_path", a.take(1), "", line)?;
                if icon.is_empty() {
                    return Err(runtime("Custom() missing required argument: 'icon_path'", line));
                }
                let node = NodeSpec {
                    id: String::new(),
                    label,
                    class: "Custom".to_string(),
                    provider: None,
                    service: None,
                    icon: Some(icon),
                    cluster: None,
                    attrs: a.extra.into_iter().map(|(k, v)| (k, v.to_text())).collect(),
                };
                self.add_node(node, line)
            }
            Builtin::Node(class) => {
                let mut a = bind(class.name, &["label"], args, kwargs, true, line)?;
                let label = a.take(0).map(|v| v.to_text()).unwrap_or_default();
                let mut attrs: Attrs = Vec::new();
                for (k, v) in a.extra {
                    set_attr(&mut attrs, &k, v.to_text());
                }
                let node = NodeSpec {
                    id: String::new(),
                    label,
                    class: class.qualified(),
                    provider: Some(class.provider.to_string()),
                    service: Some(class.service.to_string()),
                    icon: self.namespace.icon_for(&class),
                    cluster: None,
                    attrs,
                };
                self.add_node(node, line)
            }
            Builtin::Range => {
                let mut ints = Vec::with_capacity(args.len());
                if !kwargs.is_empty() {
                    return Err(runtime("range() takes no keyword arguments", line));
                }
                for a in &args {
                    match a {
                        Value::Int(i) => ints.push(*i),
                        other => {
                            return Err(runtime(
                                format!("'{}' object cannot be interpreted as an integer", other.type_name()),
                                line,
                            ))
                        }
                    }
                }
                let (start, stop, step) = match ints.as_slice() {
                    [stop] => (0, *stop, 1),
                    [start, stop] => (*start, *stop, 1),
                    [start, stop, step] => (*start, *stop, *step),
                    _ => return Err(runtime(format!("range expected 1 to 3 arguments, got {}", ints.len()), line)),
                };
                if step == 0 {
                    return Err(runtime("range() arg 3 must not be zero", line));
                }
                let span = if step > 0 { stop.saturating_sub(start) } else { start.saturating_sub(stop) };
                let len = if span <= 0 { 0 } else { (span - 1) / step.saturating_abs() + 1 };
                if len > MAX_RANGE {
                    return Err(EvalError::LimitExceeded {
                        what: "range",
                        limit: MAX_RANGE as usize,
                        line,
                    });
                }
                Ok(Value::List((0..len).map(|i| Value::Int(start + i * step)).collect()))
            }
            Builtin::Len => {
                let mut a = bind("len", &["obj"], args, kwargs, false, line)?;
                match a.take(0) {
                    Some(Value::Str(s)) => Ok(Value::Int(s.chars().count() as i64)),
                    Some(Value::List(v)) | Some(Value::Tuple(v)) => Ok(Value::Int(v.len() as i64)),
                    Some(Value::Dict(d)) => Ok(Value::Int(d.len() as i64)),
                    Some(other) => Err(runtime(format!("object of type '{}' has no len()", other.type_name()), line)),
                    None => Err(runtime("len() takes exactly one argument (0 given)", line)),
                }
            }
            Builtin::Str => {
                let mut a = bind("str", &["object"], args, kwargs, false, line)?;
                let text = a.take(0).map(|v| v.to_text()).unwrap_or_default();
                self.check_size(text.len(), line)?;
                Ok(Value::Str(text))
            }
            Builtin::Print => {
                let text = args.iter().map(Value::to_text).collect::<Vec<_>>().join(" ");
                debug!(line, output = %text, "script print");
                Ok(Value::None)
            }
        }
    }
}

fn subscript(v: Value, i: Value, line: u32) -> EvalResult<Value> {
    let index = |len: usize, i: &Value, what: &str| -> EvalResult<usize> {
        let Value::Int(raw) = i else {
            return Err(runtime(
                format!("{what} indices must be integers, not {}", i.type_name()),
                line,
            ));
        };
        let len = len as i64;
        let idx = if *raw < 0 { raw + len } else { *raw };
        if idx < 0 || idx >= len {
            return Err(runtime(format!("{what} index out of range"), line));
        }
        Ok(idx as usize)
    };
    match v {
        Value::List(items) => {
            let n = index(items.len(), &i, "list")?;
            Ok(items[n].clone())
        }
        Value::Tuple(items) => {
            let n = index(items.len(), &i, "tuple")?;
            Ok(items[n].clone())
        }
        Value::Str(s) => {
            let chars: Vec<char> = s.chars().collect();
            let n = index(chars.len(), &i, "string")?;
            Ok(Value::Str(chars[n].to_string()))
        }
        Value::Dict(pairs) => {
            let key = i.to_text();
            pairs
                .into_iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| v)
                .ok_or_else(|| runtime(format!("KeyError: '{key}'"), line))
        }
        other => Err(runtime(format!("'{}' object is not subscriptable", other.type_name()), line)),
    }
}

fn finish(open: OpenDiagram) -> DiagramSpec {
    let args = open.args;
    let filename = if args.filename.is_empty() {
        if args.name.is_empty() {
            "diagrams_image".to_string()
        } else {
            args.name.to_lowercase().replace(' ', "_")
        }
    } else {
        args.filename
    };
    DiagramSpec {
        name: args.name,
        filename,
        direction: args.direction,
        curvestyle: args.curvestyle,
        outformat: args.outformat,
        show: args.show,
        strict: args.strict,
        autolabel: args.autolabel,
        graph_attr: args.graph_attr,
        node_attr: args.node_attr,
        edge_attr: args.edge_attr,
        clusters: open.clusters,
        nodes: open.nodes,
        edges: open.edges,
    }
}
