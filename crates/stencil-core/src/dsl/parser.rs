use super::ast::*;
use super::lexer::{is_reserved, tokenize, Token, TokenKind};
use super::SyntaxError;

/// Statement keywords that belong to Python but not to diagram scripts.
const UNSUPPORTED_STATEMENTS: &[&str] = &[
    "def", "class", "lambda", "return", "yield", "try", "except", "finally", "raise", "global",
    "nonlocal", "del", "assert", "async", "await",
];

/// Deepest expression tree or block nesting a script may use. The parser,
/// the scanner's tree walk and the evaluator all recurse on this structure.
pub const MAX_NESTING: u32 = 100;

pub fn parse(src: &str) -> Result<Program, SyntaxError> {
    let tokens = tokenize(src)?;
    let mut p = Parser { tokens, pos: 0, depth: 0 };
    let mut body = Vec::new();
    while !p.at(&TokenKind::Eof) {
        if p.eat(&TokenKind::Newline) {
            continue;
        }
        body.push(p.statement()?);
    }
    Ok(Program { body })
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    /// Current recursion depth through `enter`.
    depth: u32,
}

impl Parser {
    fn peek(&self) -> &Token {
        // tokenize always terminates the stream with Eof
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek_kind_at(&self, offset: usize) -> Option<&TokenKind> {
        self.tokens.get(self.pos + offset).map(|t| &t.kind)
    }

    fn advance(&mut self) -> Token {
        let tok = self.peek().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        tok
    }

    fn at(&self, kind: &TokenKind) -> bool {
        &self.peek().kind == kind
    }

    fn at_keyword(&self, word: &str) -> bool {
        matches!(&self.peek().kind, TokenKind::Name(n) if n == word)
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.at(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn eat_keyword(&mut self, word: &str) -> bool {
        if self.at_keyword(word) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn error_here(&self, message: impl Into<String>) -> SyntaxError {
        let tok = self.peek();
        SyntaxError::new(message, tok.line, tok.column)
    }

    fn unexpected(&self) -> SyntaxError {
        self.error_here(format!("invalid syntax: unexpected {}", self.peek().kind.describe()))
    }

    fn expect(&mut self, kind: &TokenKind) -> Result<Token, SyntaxError> {
        if self.at(kind) {
            Ok(self.advance())
        } else {
            Err(self.error_here(format!(
                "expected {}, found {}",
                kind.describe(),
                self.peek().kind.describe()
            )))
        }
    }

    fn expect_keyword(&mut self, word: &str) -> Result<(), SyntaxError> {
        if self.eat_keyword(word) {
            Ok(())
        } else {
            Err(self.error_here(format!("expected '{word}', found {}", self.peek().kind.describe())))
        }
    }

    fn enter(&mut self) -> Result<(), SyntaxError> {
        self.depth += 1;
        if self.depth > MAX_NESTING {
            return Err(self.error_here("too many nested expressions"));
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    /// Reject trees that grew too tall through operator or postfix chains.
    fn bounded(&self, expr: Expr) -> Result<Expr, SyntaxError> {
        if expr.depth() > MAX_NESTING {
            return Err(self.error_here("too many nested expressions"));
        }
        Ok(expr)
    }

    fn identifier(&mut self) -> Result<String, SyntaxError> {
        match &self.peek().kind {
            TokenKind::Name(n) if !is_reserved(n) => {
                let n = n.clone();
                self.advance();
                Ok(n)
            }
            _ => Err(self.error_here(format!("expected identifier, found {}", self.peek().kind.describe()))),
        }
    }

    fn end_of_statement(&mut self) -> Result<(), SyntaxError> {
        if self.eat(&TokenKind::Newline) || self.at(&TokenKind::Eof) || self.at(&TokenKind::Dedent) {
            Ok(())
        } else {
            Err(self.unexpected())
        }
    }

    // --- Statements ---

    fn statement(&mut self) -> Result<Stmt, SyntaxError> {
        let line = self.peek().line;
        let keyword = match &self.peek().kind {
            TokenKind::Name(n) => Some(n.clone()),
            TokenKind::Indent => return Err(self.error_here("unexpected indent")),
            _ => None,
        };
        match keyword.as_deref() {
            Some("with") => {
                self.advance();
                let mut items = vec![self.with_item()?];
                while self.eat(&TokenKind::Comma) {
                    items.push(self.with_item()?);
                }
                let body = self.block()?;
                Ok(Stmt::new(StmtKind::With { items, body }, line))
            }
            Some("for") => {
                self.advance();
                let target = self.target()?;
                self.expect_keyword("in")?;
                let iter = self.expression_list()?;
                let body = self.block()?;
                Ok(Stmt::new(StmtKind::For { target, iter, body }, line))
            }
            Some("while") => {
                self.advance();
                let test = self.expression()?;
                let body = self.block()?;
                Ok(Stmt::new(StmtKind::While { test, body }, line))
            }
            Some("if") => {
                self.advance();
                self.if_chain(line)
            }
            Some(word @ ("elif" | "else")) => Err(self.error_here(format!("'{word}' without matching 'if'"))),
            Some(word) if UNSUPPORTED_STATEMENTS.contains(&word) => {
                Err(self.error_here(format!("'{word}' is not supported in diagram scripts")))
            }
            _ => {
                let stmt = self.simple_statement()?;
                self.end_of_statement()?;
                Ok(stmt)
            }
        }
    }

    fn simple_statement(&mut self) -> Result<Stmt, SyntaxError> {
        let line = self.peek().line;
        if self.eat_keyword("pass") {
            return Ok(Stmt::new(StmtKind::Pass, line));
        }
        if self.eat_keyword("break") {
            return Ok(Stmt::new(StmtKind::Break, line));
        }
        if self.eat_keyword("continue") {
            return Ok(Stmt::new(StmtKind::Continue, line));
        }
        if self.eat_keyword("import") {
            let mut names = vec![self.import_name(true)?];
            while self.eat(&TokenKind::Comma) {
                names.push(self.import_name(true)?);
            }
            return Ok(Stmt::new(StmtKind::Import(names), line));
        }
        if self.eat_keyword("from") {
            return self.from_import(line);
        }
        if let TokenKind::Name(word) = &self.peek().kind {
            if UNSUPPORTED_STATEMENTS.contains(&word.as_str()) {
                return Err(self.error_here(format!("'{word}' is not supported in diagram scripts")));
            }
        }

        let expr = self.expression_list()?;
        if self.eat(&TokenKind::Assign) {
            let target = as_target(&expr).ok_or_else(|| {
                SyntaxError::new("cannot assign to expression", expr.line, 0)
            })?;
            let value = self.expression_list()?;
            if self.at(&TokenKind::Assign) {
                return Err(self.error_here("chained assignment is not supported"));
            }
            return Ok(Stmt::new(StmtKind::Assign { target, value }, line));
        }
        Ok(Stmt::new(StmtKind::Expr(expr), line))
    }

    fn import_name(&mut self, dotted: bool) -> Result<ImportName, SyntaxError> {
        let mut name = self.identifier()?;
        if dotted {
            while self.eat(&TokenKind::Dot) {
                name.push('.');
                name.push_str(&self.identifier()?);
            }
        }
        let alias = if self.eat_keyword("as") {
            Some(self.identifier()?)
        } else {
            None
        };
        Ok(ImportName { name, alias })
    }

    fn from_import(&mut self, line: u32) -> Result<Stmt, SyntaxError> {
        let mut level = 0;
        while self.eat(&TokenKind::Dot) {
            level += 1;
        }
        let module = if self.at_keyword("import") {
            None
        } else {
            let mut m = self.identifier()?;
            while self.eat(&TokenKind::Dot) {
                m.push('.');
                m.push_str(&self.identifier()?);
            }
            Some(m)
        };
        if module.is_none() && level == 0 {
            return Err(self.unexpected());
        }
        self.expect_keyword("import")?;
        let mut names = Vec::new();
        if self.eat(&TokenKind::Star) {
            names.push(ImportName {
                name: "*".to_string(),
                alias: None,
            });
        } else {
            let parens = self.eat(&TokenKind::LParen);
            names.push(self.import_name(false)?);
            while self.eat(&TokenKind::Comma) {
                if parens && self.at(&TokenKind::RParen) {
                    break;
                }
                names.push(self.import_name(false)?);
            }
            if parens {
                self.expect(&TokenKind::RParen)?;
            }
        }
        Ok(Stmt::new(StmtKind::FromImport { module, level, names }, line))
    }

    fn with_item(&mut self) -> Result<WithItem, SyntaxError> {
        let context = self.expression()?;
        let alias = if self.eat_keyword("as") {
            Some(self.identifier()?)
        } else {
            None
        };
        Ok(WithItem { context, alias })
    }

    fn target(&mut self) -> Result<Target, SyntaxError> {
        let first = self.identifier()?;
        if !self.at(&TokenKind::Comma) {
            return Ok(Target::Name(first));
        }
        let mut names = vec![first];
        while self.eat(&TokenKind::Comma) {
            if self.at_keyword("in") {
                break;
            }
            names.push(self.identifier()?);
        }
        Ok(Target::Tuple(names))
    }

    fn if_chain(&mut self, line: u32) -> Result<Stmt, SyntaxError> {
        let test = self.expression()?;
        let body = self.block()?;
        let orelse = if self.at_keyword("elif") {
            let elif_line = self.advance().line;
            self.enter()?;
            let nested = self.if_chain(elif_line)?;
            self.leave();
            vec![nested]
        } else if self.eat_keyword("else") {
            self.block()?
        } else {
            Vec::new()
        };
        Ok(Stmt::new(StmtKind::If { test, body, orelse }, line))
    }

    fn block(&mut self) -> Result<Vec<Stmt>, SyntaxError> {
        self.enter()?;
        let body = self.block_body()?;
        self.leave();
        Ok(body)
    }

    fn block_body(&mut self) -> Result<Vec<Stmt>, SyntaxError> {
        self.expect(&TokenKind::Colon)?;
        if !self.eat(&TokenKind::Newline) {
            let stmt = self.simple_statement()?;
            self.end_of_statement()?;
            return Ok(vec![stmt]);
        }
        if !self.eat(&TokenKind::Indent) {
            return Err(self.error_here("expected an indented block"));
        }
        let mut body = Vec::new();
        while !self.eat(&TokenKind::Dedent) {
            if self.at(&TokenKind::Eof) {
                break;
            }
            if self.eat(&TokenKind::Newline) {
                continue;
            }
            body.push(self.statement()?);
        }
        Ok(body)
    }

    // --- Expressions ---

    /// A comma-separated expression list; more than one item yields a tuple.
    fn expression_list(&mut self) -> Result<Expr, SyntaxError> {
        let first = self.expression()?;
        if !self.at(&TokenKind::Comma) {
            return Ok(first);
        }
        let line = first.line;
        let mut items = vec![first];
        while self.eat(&TokenKind::Comma) {
            if self.at_expression_end() {
                break;
            }
            items.push(self.expression()?);
        }
        Ok(Expr::new(ExprKind::Tuple(items), line))
    }

    fn at_expression_end(&self) -> bool {
        matches!(
            self.peek().kind,
            TokenKind::Newline | TokenKind::Eof | TokenKind::Assign | TokenKind::Colon | TokenKind::Dedent
        )
    }

    pub(super) fn expression(&mut self) -> Result<Expr, SyntaxError> {
        self.enter()?;
        let expr = self.or_test()?;
        self.leave();
        self.bounded(expr)
    }

    fn or_test(&mut self) -> Result<Expr, SyntaxError> {
        let mut left = self.and_test()?;
        while self.at_keyword("or") {
            self.advance();
            let right = self.and_test()?;
            left = self.bounded(binary(BinOp::Or, left, right))?;
        }
        Ok(left)
    }

    fn and_test(&mut self) -> Result<Expr, SyntaxError> {
        let mut left = self.not_test()?;
        while self.at_keyword("and") {
            self.advance();
            let right = self.not_test()?;
            left = self.bounded(binary(BinOp::And, left, right))?;
        }
        Ok(left)
    }

    fn not_test(&mut self) -> Result<Expr, SyntaxError> {
        if self.at_keyword("not") {
            let line = self.advance().line;
            self.enter()?;
            let operand = self.not_test()?;
            self.leave();
            return self.bounded(Expr::new(
                ExprKind::Unary {
                    op: UnaryOp::Not,
                    operand: Box::new(operand),
                },
                line,
            ));
        }
        self.comparison()
    }

    fn comparison(&mut self) -> Result<Expr, SyntaxError> {
        let left = self.shift()?;
        let op = match self.peek().kind {
            TokenKind::Eq => BinOp::Eq,
            TokenKind::NotEq => BinOp::NotEq,
            _ => return Ok(left),
        };
        self.advance();
        let right = self.shift()?;
        if matches!(self.peek().kind, TokenKind::Eq | TokenKind::NotEq) {
            return Err(self.error_here("chained comparisons are not supported"));
        }
        Ok(binary(op, left, right))
    }

    fn shift(&mut self) -> Result<Expr, SyntaxError> {
        let mut left = self.additive()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Shr => BinOp::Shr,
                TokenKind::Shl => BinOp::Shl,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.additive()?;
            left = self.bounded(binary(op, left, right))?;
        }
    }

    fn additive(&mut self) -> Result<Expr, SyntaxError> {
        let mut left = self.unary()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Plus => BinOp::Add,
                TokenKind::Minus => BinOp::Sub,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.unary()?;
            left = self.bounded(binary(op, left, right))?;
        }
    }

    fn unary(&mut self) -> Result<Expr, SyntaxError> {
        if self.at(&TokenKind::Minus) {
            let line = self.advance().line;
            self.enter()?;
            let operand = self.unary()?;
            self.leave();
            return self.bounded(Expr::new(
                ExprKind::Unary {
                    op: UnaryOp::Neg,
                    operand: Box::new(operand),
                },
                line,
            ));
        }
        if self.at(&TokenKind::Plus) {
            self.advance();
            self.enter()?;
            let operand = self.unary()?;
            self.leave();
            return Ok(operand);
        }
        self.postfix()
    }

    fn postfix(&mut self) -> Result<Expr, SyntaxError> {
        let mut expr = self.atom()?;
        loop {
            expr = self.bounded(expr)?;
            match self.peek().kind {
                TokenKind::LParen => {
                    self.advance();
                    let (args, keywords) = self.call_arguments()?;
                    let line = expr.line;
                    expr = Expr::new(
                        ExprKind::Call {
                            func: Box::new(expr),
                            args,
                            keywords,
                        },
                        line,
                    );
                }
                TokenKind::Dot => {
                    self.advance();
                    let attr = match &self.peek().kind {
                        TokenKind::Name(n) => n.clone(),
                        _ => return Err(self.unexpected()),
                    };
                    self.advance();
                    let line = expr.line;
                    expr = Expr::new(
                        ExprKind::Attribute {
                            value: Box::new(expr),
                            attr,
                        },
                        line,
                    );
                }
                TokenKind::LBracket => {
                    self.advance();
                    if self.at(&TokenKind::Colon) {
                        return Err(self.error_here("slices are not supported"));
                    }
                    let index = self.expression()?;
                    if self.at(&TokenKind::Colon) {
                        return Err(self.error_here("slices are not supported"));
                    }
                    self.expect(&TokenKind::RBracket)?;
                    let line = expr.line;
                    expr = Expr::new(
                        ExprKind::Subscript {
                            value: Box::new(expr),
                            index: Box::new(index),
                        },
                        line,
                    );
                }
                _ => return Ok(expr),
            }
        }
    }

    fn call_arguments(&mut self) -> Result<(Vec<Expr>, Vec<Keyword>), SyntaxError> {
        let mut args = Vec::new();
        let mut keywords: Vec<Keyword> = Vec::new();
        while !self.eat(&TokenKind::RParen) {
            if self.at(&TokenKind::Star) {
                return Err(self.error_here("argument unpacking is not supported"));
            }
            let is_keyword = matches!(&self.peek().kind, TokenKind::Name(n) if !is_reserved(n))
                && self.peek_kind_at(1) == Some(&TokenKind::Assign);
            if is_keyword {
                let name = self.identifier()?;
                self.advance();
                if keywords.iter().any(|k| k.name == name) {
                    return Err(self.error_here(format!("keyword argument repeated: {name}")));
                }
                let value = self.expression()?;
                keywords.push(Keyword { name, value });
            } else {
                if !keywords.is_empty() {
                    return Err(self.error_here("positional argument follows keyword argument"));
                }
                args.push(self.expression()?);
            }
            if !self.eat(&TokenKind::Comma) {
                self.expect(&TokenKind::RParen)?;
                break;
            }
        }
        Ok((args, keywords))
    }

    fn atom(&mut self) -> Result<Expr, SyntaxError> {
        let tok = self.peek().clone();
        let line = tok.line;
        match tok.kind {
            TokenKind::Name(n) => {
                let kind = match n.as_str() {
                    "True" => ExprKind::Bool(true),
                    "False" => ExprKind::Bool(false),
                    "None" => ExprKind::None,
                    "lambda" => return Err(self.error_here("'lambda' is not supported in diagram scripts")),
                    word if is_reserved(word) => return Err(self.unexpected()),
                    _ => ExprKind::Name(n),
                };
                self.advance();
                Ok(Expr::new(kind, line))
            }
            TokenKind::Str(s) => {
                self.advance();
                let mut text = s;
                while let TokenKind::Str(more) = &self.peek().kind {
                    text.push_str(more);
                    self.advance();
                }
                Ok(Expr::new(ExprKind::Str(text), line))
            }
            TokenKind::Int(i) => {
                self.advance();
                Ok(Expr::new(ExprKind::Int(i), line))
            }
            TokenKind::Float(x) => {
                self.advance();
                Ok(Expr::new(ExprKind::Float(x), line))
            }
            TokenKind::LBracket => {
                self.advance();
                let items = self.sequence(&TokenKind::RBracket)?;
                Ok(Expr::new(ExprKind::List(items), line))
            }
            TokenKind::LBrace => {
                self.advance();
                let mut pairs = Vec::new();
                while !self.eat(&TokenKind::RBrace) {
                    let key = self.expression()?;
                    self.expect(&TokenKind::Colon)?;
                    let value = self.expression()?;
                    pairs.push((key, value));
                    if !self.eat(&TokenKind::Comma) {
                        self.expect(&TokenKind::RBrace)?;
                        break;
                    }
                }
                Ok(Expr::new(ExprKind::Dict(pairs), line))
            }
            TokenKind::LParen => {
                self.advance();
                if self.eat(&TokenKind::RParen) {
                    return Ok(Expr::new(ExprKind::Tuple(Vec::new()), line));
                }
                let first = self.expression()?;
                if self.eat(&TokenKind::RParen) {
                    return Ok(first);
                }
                self.expect(&TokenKind::Comma)?;
                let mut items = vec![first];
                items.extend(self.sequence(&TokenKind::RParen)?);
                Ok(Expr::new(ExprKind::Tuple(items), line))
            }
            _ => Err(self.unexpected()),
        }
    }

    /// Comma-separated expressions up to and including `close`.
    fn sequence(&mut self, close: &TokenKind) -> Result<Vec<Expr>, SyntaxError> {
        let mut items = Vec::new();
        while !self.eat(close) {
            items.push(self.expression()?);
            if self.at_keyword("for") {
                return Err(self.error_here("comprehensions are not supported"));
            }
            if !self.eat(&TokenKind::Comma) {
                self.expect(close)?;
                break;
            }
        }
        Ok(items)
    }
}

fn binary(op: BinOp, left: Expr, right: Expr) -> Expr {
    let line = left.line;
    Expr::new(
        ExprKind::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        },
        line,
    )
}

fn as_target(expr: &Expr) -> Option<Target> {
    match &expr.kind {
        ExprKind::Name(n) => Some(Target::Name(n.clone())),
        ExprKind::Tuple(items) => items
            .iter()
            .map(|e| match &e.kind {
                ExprKind::Name(n) => Some(n.clone()),
                _ => None,
            })
            .collect::<Option<Vec<_>>>()
            .map(Target::Tuple),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn first(src: &str) -> StmtKind {
        parse(src).unwrap().body.remove(0).kind
    }

    #[test]
    fn parses_with_block_and_edges() {
        let prog = parse(
            "with Diagram(\"Web\", show=False):\n    a = Server(\"a\")\n    b = Server(\"b\")\n    a >> b\n",
        )
        .unwrap();
        assert_eq!(prog.body.len(), 1);
        let StmtKind::With { items, body } = &prog.body[0].kind else {
            panic!("expected with");
        };
        assert_eq!(items[0].context.to_string(), "Diagram(\"Web\", show=False)");
        assert_eq!(body.len(), 3);
        assert_eq!(body[2].line, 4);
    }

    #[test]
    fn shift_binds_looser_than_minus() {
        let StmtKind::Expr(e) = first("a - b >> c") else {
            panic!("expected expression");
        };
        let ExprKind::Binary { op, left, .. } = e.kind else {
            panic!("expected binary");
        };
        assert_eq!(op, BinOp::Shr);
        assert!(matches!(left.kind, ExprKind::Binary { op: BinOp::Sub, .. }));
    }

    #[test]
    fn imports_parse_so_they_can_be_rejected() {
        assert_eq!(
            first("from diagrams.aws.compute import EC2, Lambda as L"),
            StmtKind::FromImport {
                module: Some("diagrams.aws.compute".into()),
                level: 0,
                names: vec![
                    ImportName { name: "EC2".into(), alias: None },
                    ImportName { name: "Lambda".into(), alias: Some("L".into()) },
                ],
            }
        );
        assert!(matches!(first("import os.path"), StmtKind::Import(_)));
    }

    #[test]
    fn elif_becomes_nested_if() {
        let StmtKind::If { orelse, .. } = first("if a:\n    pass\nelif b:\n    pass\nelse:\n    pass\n") else {
            panic!("expected if");
        };
        assert!(matches!(orelse[0].kind, StmtKind::If { .. }));
    }

    #[test]
    fn tuple_assignment_and_inline_block() {
        assert!(matches!(
            first("a, b = X(\"a\"), Y(\"b\")"),
            StmtKind::Assign { target: Target::Tuple(_), .. }
        ));
        assert!(matches!(first("while True: pass"), StmtKind::While { .. }));
    }

    #[test]
    fn rejects_unsupported_constructs() {
        for src in ["def f():\n    pass\n", "class A:\n    pass\n", "f = lambda: 1", "f(*args)", "[x for x in y]"] {
            assert!(parse(src).is_err(), "{src} should not parse");
        }
    }

    #[test]
    fn syntax_error_has_position() {
        let err = parse("a = (1,\nb = 2\n").unwrap_err();
        assert!(err.line >= 1);
        let err = parse("x = = 1").unwrap_err();
        assert_eq!(err.line, 1);
    }

    #[test]
    fn deep_nesting_is_a_syntax_error() {
        let parens = format!("x = {}1{}\n", "(".repeat(5000), ")".repeat(5000));
        let err = parse(&parens).unwrap_err();
        assert_eq!(err.message, "too many nested expressions");

        for src in [
            format!("x = {}1{}\n", "[".repeat(5000), "]".repeat(5000)),
            format!("x = {}1\n", "-".repeat(5000)),
            format!("x = {}True\n", "not ".repeat(5000)),
            format!("x = 1{}\n", " + 1".repeat(50_000)),
            format!("x = a{}\n", ".b".repeat(50_000)),
        ] {
            assert!(parse(&src).is_err());
        }

        let fine = format!("x = {}1{}\n", "(".repeat(50), ")".repeat(50));
        assert!(parse(&fine).is_ok());
    }

    #[test]
    fn deep_blocks_are_a_syntax_error() {
        let mut src = String::new();
        for level in 0..150 {
            src.push_str(&"    ".repeat(level));
            src.push_str("if True:\n");
        }
        src.push_str(&"    ".repeat(150));
        src.push_str("pass\n");
        assert!(parse(&src).is_err());

        let elifs = format!("if x:\n    pass\n{}", "elif x:\n    pass\n".repeat(5000));
        assert!(parse(&elifs).is_err());
    }

    #[test]
    fn printing_round_trips_through_parser() {
        let src = "with Diagram(\"x\", direction=\"LR\"):\n    with Cluster(\"c\"):\n        a = [N(\"a\"), N(\"b\")]\n    a >> Edge(label=\"l\") >> M(\"m\")\n";
        let prog = parse(src).unwrap();
        let printed = prog.to_string();
        assert_eq!(parse(&printed).unwrap(), prog);
    }
}
