//! Hand-written scanner for the Python-like surface syntax, in the idiom of
//! the original source's indentation-sensitive `scanner.c` (`SPEC_FULL.md`
//! §6): leading-whitespace-driven `INDENT`/`DEDENT` tokens, `#` comments,
//! backslash line continuation, and bracket-depth-suppressed newlines for
//! implicit continuation inside `(`/`[`/`{`.
//!
//! Tokenizes the whole source up front into a flat `Vec<Token>` rather than
//! the original's pull-one-token-at-a-time interface; the compiler then
//! walks that vector with simple lookahead, same net effect, easier to
//! reason about without a live scanner object threaded through every parse
//! function.

use std::fmt;

/// A compile-time diagnostic: a source position plus a human-readable
/// message (`spec.md` §7: `SyntaxError`, from the compiler).
#[derive(Debug, Clone)]
pub(crate) struct CompileError {
    pub(crate) path: String,
    pub(crate) line: u32,
    pub(crate) message: String,
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}: {}", self.path, self.line, self.message)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum TokenKind {
    Int(i64),
    Float(f64),
    Str(String),
    Ident(String),

    If,
    Elif,
    Else,
    While,
    For,
    In,
    Def,
    Return,
    Class,
    Try,
    Except,
    As,
    Raise,
    Pass,
    Break,
    Continue,
    Nonlocal,
    Del,
    And,
    Or,
    Not,
    TrueKw,
    FalseKw,
    NoneKw,
    Print,

    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    Dot,
    Colon,
    Semicolon,

    Plus,
    Minus,
    Star,
    Slash,
    SlashSlash,
    Percent,
    Equal,
    EqualEqual,
    BangEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,

    Newline,
    Indent,
    Dedent,
    Eof,
}

#[derive(Debug, Clone)]
pub(crate) struct Token {
    pub(crate) kind: TokenKind,
    pub(crate) line: u32,
}

pub(crate) fn tokenize(source: &str, path: &str) -> Result<Vec<Token>, CompileError> {
    let mut lexer = Lexer::new(source, path);
    lexer.run()?;
    Ok(lexer.tokens)
}

struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: u32,
    path: String,
    indent_stack: Vec<usize>,
    paren_depth: i32,
    at_line_start: bool,
    tokens: Vec<Token>,
}

impl Lexer {
    fn new(source: &str, path: &str) -> Self {
        Self {
            chars: source.chars().collect(),
            pos: 0,
            line: 1,
            path: path.to_owned(),
            indent_stack: vec![0],
            paren_depth: 0,
            at_line_start: true,
            tokens: Vec::new(),
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, n: usize) -> Option<char> {
        self.chars.get(self.pos + n).copied()
    }

    fn advance(&mut self) -> char {
        let c = self.chars[self.pos];
        self.pos += 1;
        c
    }

    fn match_char(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn skip_spaces_tabs(&mut self) {
        while matches!(self.peek(), Some(' ' | '\t' | '\r')) {
            self.pos += 1;
        }
    }

    fn error(&self, message: impl Into<String>) -> CompileError {
        CompileError {
            path: self.path.clone(),
            line: self.line,
            message: message.into(),
        }
    }

    /// Consumes leading spaces, skipping (and recursing past) blank or
    /// comment-only lines entirely -- they affect neither indentation nor
    /// the token stream, matching Python's own rule.
    fn process_indentation(&mut self) -> Result<(), CompileError> {
        if self.pos >= self.chars.len() {
            return Ok(());
        }
        let mut spaces = 0usize;
        while self.peek() == Some(' ') {
            spaces += 1;
            self.pos += 1;
        }
        if self.peek() == Some('\t') {
            return Err(self.error("tabs are not supported for indentation"));
        }
        match self.peek() {
            None | Some('\n' | '#') => {
                while self.peek().is_some_and(|c| c != '\n') {
                    self.pos += 1;
                }
                if self.peek() == Some('\n') {
                    self.pos += 1;
                    self.line += 1;
                }
                return self.process_indentation();
            }
            _ => {}
        }
        let current = *self.indent_stack.last().expect("indent_stack never empty");
        if spaces > current {
            self.indent_stack.push(spaces);
            self.tokens.push(Token { kind: TokenKind::Indent, line: self.line });
        } else {
            while spaces < *self.indent_stack.last().expect("indent_stack never empty") {
                self.indent_stack.pop();
                self.tokens.push(Token { kind: TokenKind::Dedent, line: self.line });
            }
            if spaces != *self.indent_stack.last().expect("indent_stack never empty") {
                return Err(self.error("unindent does not match any outer indentation level"));
            }
        }
        Ok(())
    }

    fn run(&mut self) -> Result<(), CompileError> {
        loop {
            if self.at_line_start && self.paren_depth == 0 {
                self.process_indentation()?;
                self.at_line_start = false;
                if self.peek().is_none() {
                    break;
                }
            }
            self.skip_spaces_tabs();
            let Some(c) = self.peek() else { break };
            match c {
                '#' => {
                    while self.peek().is_some_and(|ch| ch != '\n') {
                        self.pos += 1;
                    }
                }
                '\\' if self.peek_at(1) == Some('\n') => {
                    self.advance();
                    self.advance();
                    self.line += 1;
                }
                '\n' => {
                    self.advance();
                    if self.paren_depth == 0 {
                        self.tokens.push(Token { kind: TokenKind::Newline, line: self.line });
                        self.at_line_start = true;
                    }
                    self.line += 1;
                }
                '\'' | '"' => self.scan_string(c)?,
                c if c.is_ascii_digit() => self.scan_number()?,
                c if c.is_alphabetic() || c == '_' => self.scan_identifier(),
                _ => self.scan_operator()?,
            }
        }
        if !matches!(self.tokens.last().map(|t| &t.kind), None | Some(TokenKind::Newline)) {
            self.tokens.push(Token { kind: TokenKind::Newline, line: self.line });
        }
        while self.indent_stack.len() > 1 {
            self.indent_stack.pop();
            self.tokens.push(Token { kind: TokenKind::Dedent, line: self.line });
        }
        self.tokens.push(Token { kind: TokenKind::Eof, line: self.line });
        Ok(())
    }

    fn scan_string(&mut self, quote: char) -> Result<(), CompileError> {
        let line = self.line;
        self.advance();
        let mut content = String::new();
        loop {
            match self.peek() {
                None | Some('\n') => return Err(self.error("unterminated string literal")),
                Some(c) if c == quote => {
                    self.advance();
                    break;
                }
                Some('\\') => {
                    self.advance();
                    let Some(escaped) = self.peek() else {
                        return Err(self.error("unterminated string literal"));
                    };
                    self.advance();
                    content.push(resolve_escape(escaped));
                }
                Some(c) => {
                    self.advance();
                    content.push(c);
                }
            }
        }
        self.tokens.push(Token { kind: TokenKind::Str(content), line });
        Ok(())
    }

    fn scan_number(&mut self) -> Result<(), CompileError> {
        let line = self.line;
        let start = self.pos;
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.advance();
        }
        let mut is_float = false;
        if self.peek() == Some('.') && self.peek_at(1).is_some_and(|c| c.is_ascii_digit()) {
            is_float = true;
            self.advance();
            while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                self.advance();
            }
        }
        let text: String = self.chars[start..self.pos].iter().collect();
        let kind = if is_float {
            TokenKind::Float(text.parse::<f64>().map_err(|_| self.error("invalid float literal"))?)
        } else {
            TokenKind::Int(text.parse::<i64>().map_err(|_| self.error("integer literal out of range"))?)
        };
        self.tokens.push(Token { kind, line });
        Ok(())
    }

    fn scan_identifier(&mut self) {
        let line = self.line;
        let start = self.pos;
        while self.peek().is_some_and(|c| c.is_alphanumeric() || c == '_') {
            self.advance();
        }
        let text: String = self.chars[start..self.pos].iter().collect();
        let kind = match text.as_str() {
            "if" => TokenKind::If,
            "elif" => TokenKind::Elif,
            "else" => TokenKind::Else,
            "while" => TokenKind::While,
            "for" => TokenKind::For,
            "in" => TokenKind::In,
            "def" => TokenKind::Def,
            "return" => TokenKind::Return,
            "class" => TokenKind::Class,
            "try" => TokenKind::Try,
            "except" => TokenKind::Except,
            "as" => TokenKind::As,
            "raise" => TokenKind::Raise,
            "pass" => TokenKind::Pass,
            "break" => TokenKind::Break,
            "continue" => TokenKind::Continue,
            "nonlocal" => TokenKind::Nonlocal,
            "del" => TokenKind::Del,
            "and" => TokenKind::And,
            "or" => TokenKind::Or,
            "not" => TokenKind::Not,
            "True" => TokenKind::TrueKw,
            "False" => TokenKind::FalseKw,
            "None" => TokenKind::NoneKw,
            "print" => TokenKind::Print,
            _ => TokenKind::Ident(text),
        };
        self.tokens.push(Token { kind, line });
    }

    fn scan_operator(&mut self) -> Result<(), CompileError> {
        let line = self.line;
        let c = self.advance();
        let kind = match c {
            '(' => {
                self.paren_depth += 1;
                TokenKind::LParen
            }
            ')' => {
                self.paren_depth -= 1;
                TokenKind::RParen
            }
            '[' => {
                self.paren_depth += 1;
                TokenKind::LBracket
            }
            ']' => {
                self.paren_depth -= 1;
                TokenKind::RBracket
            }
            '{' => {
                self.paren_depth += 1;
                TokenKind::LBrace
            }
            '}' => {
                self.paren_depth -= 1;
                TokenKind::RBrace
            }
            ',' => TokenKind::Comma,
            '.' => TokenKind::Dot,
            ':' => TokenKind::Colon,
            ';' => TokenKind::Semicolon,
            '+' => TokenKind::Plus,
            '-' => TokenKind::Minus,
            '*' => TokenKind::Star,
            '/' => {
                if self.match_char('/') {
                    TokenKind::SlashSlash
                } else {
                    TokenKind::Slash
                }
            }
            '%' => TokenKind::Percent,
            '=' => {
                if self.match_char('=') {
                    TokenKind::EqualEqual
                } else {
                    TokenKind::Equal
                }
            }
            '!' => {
                if self.match_char('=') {
                    TokenKind::BangEqual
                } else {
                    return Err(self.error("unexpected character '!'"));
                }
            }
            '<' => {
                if self.match_char('=') {
                    TokenKind::LessEqual
                } else {
                    TokenKind::Less
                }
            }
            '>' => {
                if self.match_char('=') {
                    TokenKind::GreaterEqual
                } else {
                    TokenKind::Greater
                }
            }
            other => return Err(self.error(format!("unexpected character '{other}'"))),
        };
        self.tokens.push(Token { kind, line });
        Ok(())
    }
}

/// `spec.md` §4.2: recognized escapes are `\a \b \f \n \r \t \v \0 \e`; any
/// other character following `\` is copied verbatim (the backslash itself is
/// dropped).
fn resolve_escape(c: char) -> char {
    match c {
        'a' => '\u{07}',
        'b' => '\u{08}',
        'f' => '\u{0C}',
        'n' => '\n',
        'r' => '\r',
        't' => '\t',
        'v' => '\u{0B}',
        '0' => '\0',
        'e' => '\u{1B}',
        other => other,
    }
}
