use super::SyntaxError;

/// Words that can never be used as identifiers.
pub const RESERVED: &[&str] = &[
    "False", "None", "True", "and", "as", "assert", "async", "await", "break", "class",
    "continue", "def", "del", "elif", "else", "except", "finally", "for", "from", "global", "if",
    "import", "in", "is", "lambda", "nonlocal", "not", "or", "pass", "raise", "return", "try",
    "while", "with", "yield",
];

pub fn is_reserved(word: &str) -> bool {
    RESERVED.contains(&word)
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Name(String),
    Str(String),
    Int(i64),
    Float(f64),
    Newline,
    Indent,
    Dedent,
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    Colon,
    Dot,
    Assign,
    Eq,
    NotEq,
    Shr,
    Shl,
    Plus,
    Minus,
    Star,
    Eof,
}

impl TokenKind {
    pub fn describe(&self) -> String {
        match self {
            TokenKind::Name(n) => format!("'{n}'"),
            TokenKind::Str(_) => "string literal".to_string(),
            TokenKind::Int(_) | TokenKind::Float(_) => "number".to_string(),
            TokenKind::Newline => "end of line".to_string(),
            TokenKind::Indent => "indent".to_string(),
            TokenKind::Dedent => "dedent".to_string(),
            TokenKind::Eof => "end of input".to_string(),
            other => format!("'{}'", other.symbol()),
        }
    }

    fn symbol(&self) -> &'static str {
        match self {
            TokenKind::LParen => "(",
            TokenKind::RParen => ")",
            TokenKind::LBracket => "[",
            TokenKind::RBracket => "]",
            TokenKind::LBrace => "{",
            TokenKind::RBrace => "}",
            TokenKind::Comma => ",",
            TokenKind::Colon => ":",
            TokenKind::Dot => ".",
            TokenKind::Assign => "=",
            TokenKind::Eq => "==",
            TokenKind::NotEq => "!=",
            TokenKind::Shr => ">>",
            TokenKind::Shl => "<<",
            TokenKind::Plus => "+",
            TokenKind::Minus => "-",
            TokenKind::Star => "*",
            _ => "",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub line: u32,
    pub column: u32,
}

struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: u32,
    col: u32,
    depth: usize,
    indents: Vec<usize>,
    tokens: Vec<Token>,
    at_line_start: bool,
}

/// Split source text into tokens, producing INDENT/DEDENT markers the way
/// Python does. Newlines inside brackets are ignored.
pub fn tokenize(src: &str) -> Result<Vec<Token>, SyntaxError> {
    let mut lx = Lexer {
        chars: src.chars().collect(),
        pos: 0,
        line: 1,
        col: 1,
        depth: 0,
        indents: vec![0],
        tokens: Vec::new(),
        at_line_start: true,
    };
    lx.run()?;
    Ok(lx.tokens)
}

impl Lexer {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.chars.get(self.pos).copied()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        Some(c)
    }

    fn push(&mut self, kind: TokenKind, line: u32, column: u32) {
        self.tokens.push(Token { kind, line, column });
    }

    fn err(&self, message: impl Into<String>) -> SyntaxError {
        SyntaxError::new(message, self.line, self.col)
    }

    fn last_is_newline(&self) -> bool {
        matches!(
            self.tokens.last().map(|t| &t.kind),
            None | Some(TokenKind::Newline) | Some(TokenKind::Indent) | Some(TokenKind::Dedent)
        )
    }

    fn run(&mut self) -> Result<(), SyntaxError> {
        loop {
            if self.at_line_start && self.depth == 0 {
                if !self.handle_indentation()? {
                    break;
                }
            }
            let Some(c) = self.peek() else { break };
            let (line, col) = (self.line, self.col);
            match c {
                ' ' | '\t' | '\x0c' | '\r' => {
                    self.bump();
                }
                '#' => self.skip_comment(),
                '\n' => {
                    self.bump();
                    if self.depth == 0 {
                        if !self.last_is_newline() {
                            self.push(TokenKind::Newline, line, col);
                        }
                        self.at_line_start = true;
                    }
                }
                '\\' => {
                    self.bump();
                    match self.peek() {
                        Some('\n') => {
                            self.bump();
                        }
                        Some('\r') if self.peek_at(1) == Some('\n') => {
                            self.bump();
                            self.bump();
                        }
                        _ => return Err(self.err("unexpected character after line continuation character")),
                    }
                }
                '"' | '\'' => {
                    let s = self.string(false)?;
                    self.push(TokenKind::Str(s), line, col);
                }
                c if c.is_ascii_digit() => {
                    let kind = self.number()?;
                    self.push(kind, line, col);
                }
                '.' if self.peek_at(1).is_some_and(|d| d.is_ascii_digit()) => {
                    let kind = self.number()?;
                    self.push(kind, line, col);
                }
                c if c == '_' || c.is_alphabetic() => {
                    let word = self.word();
                    let next = self.peek();
                    if matches!(next, Some('"') | Some('\'')) && word.len() <= 2 {
                        let lower = word.to_ascii_lowercase();
                        match lower.as_str() {
                            "r" => {
                                let s = self.string(true)?;
                                self.push(TokenKind::Str(s), line, col);
                                continue;
                            }
                            "u" => {
                                let s = self.string(false)?;
                                self.push(TokenKind::Str(s), line, col);
                                continue;
                            }
                            "f" | "rf" | "fr" => {
                                return Err(SyntaxError::new("f-strings are not supported", line, col))
                            }
                            "b" | "rb" | "br" => {
                                return Err(SyntaxError::new("bytes literals are not supported", line, col))
                            }
                            _ => {}
                        }
                    }
                    self.push(TokenKind::Name(word), line, col);
                }
                _ => {
                    let kind = self.operator()?;
                    self.push(kind, line, col);
                }
            }
        }

        if self.depth > 0 {
            return Err(self.err("unexpected EOF: unclosed bracket"));
        }
        let (line, col) = (self.line, self.col);
        if !self.last_is_newline() {
            self.push(TokenKind::Newline, line, col);
        }
        while self.indents.len() > 1 {
            self.indents.pop();
            self.push(TokenKind::Dedent, line, col);
        }
        self.push(TokenKind::Eof, line, col);
        Ok(())
    }

    /// Measure leading whitespace of a logical line. Returns false at EOF.
    fn handle_indentation(&mut self) -> Result<bool, SyntaxError> {
        loop {
            let mut width = 0usize;
            while let Some(c) = self.peek() {
                match c {
                    ' ' => width += 1,
                    '\t' => width = (width / 8 + 1) * 8,
                    '\x0c' | '\r' => {}
                    _ => break,
                }
                self.bump();
            }
            match self.peek() {
                None => return Ok(false),
                Some('\n') => {
                    self.bump();
                    continue;
                }
                Some('#') => {
                    self.skip_comment();
                    continue;
                }
                Some(_) => {}
            }
            self.at_line_start = false;
            let current = self.indents.last().copied().unwrap_or(0);
            let (line, col) = (self.line, self.col);
            if width > current {
                self.indents.push(width);
                self.push(TokenKind::Indent, line, col);
            } else {
                while width < self.indents.last().copied().unwrap_or(0) {
                    self.indents.pop();
                    self.push(TokenKind::Dedent, line, col);
                }
                if width != self.indents.last().copied().unwrap_or(0) {
                    return Err(SyntaxError::new(
                        "unindent does not match any outer indentation level",
                        line,
                        col,
                    ));
                }
            }
            return Ok(true);
        }
    }

    fn skip_comment(&mut self) {
        while let Some(c) = self.peek() {
            if c == '\n' {
                break;
            }
            self.bump();
        }
    }

    fn word(&mut self) -> String {
        let mut out = String::new();
        while let Some(c) = self.peek() {
            if c == '_' || c.is_alphanumeric() {
                out.push(c);
                self.bump();
            } else {
                break;
            }
        }
        out
    }

    fn number(&mut self) -> Result<TokenKind, SyntaxError> {
        let (line, col) = (self.line, self.col);
        let mut text = String::new();
        let mut is_float = false;
        while let Some(c) = self.peek() {
            match c {
                '0'..='9' => text.push(c),
                '_' => {}
                '.' if !is_float => {
                    is_float = true;
                    text.push(c);
                }
                'e' | 'E' => {
                    is_float = true;
                    text.push(c);
                    self.bump();
                    if let Some(sign @ ('+' | '-')) = self.peek() {
                        text.push(sign);
                        self.bump();
                    }
                    continue;
                }
                _ => break,
            }
            self.bump();
        }
        if self.peek().is_some_and(|c| c.is_alphabetic()) {
            return Err(SyntaxError::new("invalid decimal literal", line, col));
        }
        if is_float {
            text.parse::<f64>()
                .map(TokenKind::Float)
                .map_err(|_| SyntaxError::new("invalid number literal", line, col))
        } else {
            text.parse::<i64>()
                .map(TokenKind::Int)
                .map_err(|_| SyntaxError::new("integer literal is too large", line, col))
        }
    }

    fn string(&mut self, raw: bool) -> Result<String, SyntaxError> {
        let (line, col) = (self.line, self.col);
        let Some(quote) = self.bump() else {
            return Err(self.err("expected string"));
        };
        let triple = self.peek() == Some(quote) && self.peek_at(1) == Some(quote);
        if triple {
            self.bump();
            self.bump();
        }
        let mut out = String::new();
        loop {
            let Some(c) = self.bump() else {
                let what = if triple { "triple-quoted string" } else { "string" };
                return Err(SyntaxError::new(format!("unterminated {what} literal"), line, col));
            };
            if c == quote {
                if !triple {
                    return Ok(out);
                }
                if self.peek() == Some(quote) && self.peek_at(1) == Some(quote) {
                    self.bump();
                    self.bump();
                    return Ok(out);
                }
                out.push(c);
                continue;
            }
            if c == '\n' && !triple {
                return Err(SyntaxError::new("unterminated string literal", line, col));
            }
            if c != '\\' {
                out.push(c);
                continue;
            }
            let Some(esc) = self.bump() else {
                return Err(SyntaxError::new("unterminated string literal", line, col));
            };
            if raw {
                out.push('\\');
                out.push(esc);
                continue;
            }
            match esc {
                '\n' => {}
                'n' => out.push('\n'),
                't' => out.push('\t'),
                'r' => out.push('\r'),
                '0' => out.push('\0'),
                'a' => out.push('\x07'),
                'b' => out.push('\x08'),
                'f' => out.push('\x0c'),
                'v' => out.push('\x0b'),
                '\\' => out.push('\\'),
                '\'' => out.push('\''),
                '"' => out.push('"'),
                'x' => out.push(self.hex_escape(2, line, col)?),
                'u' => out.push(self.hex_escape(4, line, col)?),
                'U' => out.push(self.hex_escape(8, line, col)?),
                other => {
                    out.push('\\');
                    out.push(other);
                }
            }
        }
    }

    fn hex_escape(&mut self, digits: usize, line: u32, col: u32) -> Result<char, SyntaxError> {
        let mut value = 0u32;
        for _ in 0..digits {
            let d = self
                .bump()
                .and_then(|c| c.to_digit(16))
                .ok_or_else(|| SyntaxError::new("truncated escape sequence", line, col))?;
            value = value * 16 + d;
        }
        char::from_u32(value).ok_or_else(|| SyntaxError::new("invalid escape sequence", line, col))
    }

    fn operator(&mut self) -> Result<TokenKind, SyntaxError> {
        let (line, col) = (self.line, self.col);
        let c = self.bump().unwrap_or('\0');
        let next = self.peek();
        let kind = match (c, next) {
            ('>', Some('>')) => {
                self.bump();
                TokenKind::Shr
            }
            ('<', Some('<')) => {
                self.bump();
                TokenKind::Shl
            }
            ('=', Some('=')) => {
                self.bump();
                TokenKind::Eq
            }
            ('!', Some('=')) => {
                self.bump();
                TokenKind::NotEq
            }
            ('=', _) => TokenKind::Assign,
            ('+', _) => TokenKind::Plus,
            ('-', _) => TokenKind::Minus,
            ('*', _) => TokenKind::Star,
            (',', _) => TokenKind::Comma,
            (':', _) => TokenKind::Colon,
            ('.', _) => TokenKind::Dot,
            ('(', _) | ('[', _) | ('{', _) => {
                self.depth += 1;
                match c {
                    '(' => TokenKind::LParen,
                    '[' => TokenKind::LBracket,
                    _ => TokenKind::LBrace,
                }
            }
            (')', _) | (']', _) | ('}', _) => {
                if self.depth == 0 {
                    return Err(SyntaxError::new(format!("unmatched '{c}'"), line, col));
                }
                self.depth -= 1;
                match c {
                    ')' => TokenKind::RParen,
                    ']' => TokenKind::RBracket,
                    _ => TokenKind::RBrace,
                }
            }
            _ => return Err(SyntaxError::new(format!("unsupported character '{c}'"), line, col)),
        };
        Ok(kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        tokenize(src).unwrap().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn blocks_produce_indent_and_dedent() {
        let toks = kinds("with a:\n    b\nc\n");
        assert_eq!(
            toks,
            vec![
                TokenKind::Name("with".into()),
                TokenKind::Name("a".into()),
                TokenKind::Colon,
                TokenKind::Newline,
                TokenKind::Indent,
                TokenKind::Name("b".into()),
                TokenKind::Newline,
                TokenKind::Dedent,
                TokenKind::Name("c".into()),
                TokenKind::Newline,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn newlines_inside_brackets_are_joined() {
        let toks = kinds("x = [a,\n     b]\n");
        assert!(!toks[..toks.len() - 2].contains(&TokenKind::Newline));
    }

    #[test]
    fn triple_quoted_strings_span_lines() {
        let toks = tokenize("x = \"\"\"one\ntwo\"\"\"\ny = 1\n").unwrap();
        assert_eq!(toks[2].kind, TokenKind::Str("one\ntwo".into()));
        let y = toks.iter().find(|t| t.kind == TokenKind::Name("y".into())).unwrap();
        assert_eq!(y.line, 3);
    }

    #[test]
    fn escapes_and_raw_strings() {
        assert_eq!(kinds(r#"'a\nb'"#)[0], TokenKind::Str("a\nb".into()));
        assert_eq!(kinds(r#"r'a\nb'"#)[0], TokenKind::Str("a\\nb".into()));
    }

    #[test]
    fn shift_operators_are_single_tokens() {
        assert_eq!(
            kinds("a >> b << c"),
            vec![
                TokenKind::Name("a".into()),
                TokenKind::Shr,
                TokenKind::Name("b".into()),
                TokenKind::Shl,
                TokenKind::Name("c".into()),
                TokenKind::Newline,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn rejects_f_strings_and_bad_dedent() {
        assert!(tokenize("x = f'{y}'").is_err());
        let err = tokenize("if a:\n        b\n    c\n").unwrap_err();
        assert!(err.message.contains("unindent"));
    }

    #[test]
    fn unterminated_string_reports_line() {
        let err = tokenize("x = 1\ny = 'abc\n").unwrap_err();
        assert_eq!(err.line, 2);
    }
}
