//! Tokenizer for command scripts.
//!
//! [`tokenize`] never fails. Characters it cannot make sense of become
//! [`TokenKind::Unknown`] tokens and the parser decides how to report them,
//! so every error carries grammatical context.
//!
//! String literals are split into [`Fragment`]s as they are read: literal
//! text and the raw bodies of `$(...)` references. The parser turns those
//! into interpolated expressions without rescanning the string.

use std::fmt;
use std::iter::Peekable;
use std::str::CharIndices;

/// Reserved statement keywords.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyword {
    Set,
    When,
    Then,
    Else,
    End,
    Send,
}

impl Keyword {
    fn from_ident(ident: &str) -> Option<Self> {
        match ident {
            "set" => Some(Keyword::Set),
            "when" => Some(Keyword::When),
            "then" => Some(Keyword::Then),
            "else" => Some(Keyword::Else),
            "end" => Some(Keyword::End),
            "send" => Some(Keyword::Send),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Keyword::Set => "set",
            Keyword::When => "when",
            Keyword::Then => "then",
            Keyword::Else => "else",
            Keyword::End => "end",
            Keyword::Send => "send",
        }
    }
}

impl fmt::Display for Keyword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Assign,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Plus,
    Minus,
}

/// A piece of a string literal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fragment {
    Text(String),
    /// Raw text between `$(` and its matching `)`.
    Reference(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind {
    Keyword(Keyword),
    Ident(String),
    Str(Vec<Fragment>),
    Number(i64),
    Boolean(bool),
    Operator(Operator),
    LParen,
    RParen,
    Comma,
    Dollar,
    Newline,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub lexeme: String,
    pub line: usize,
}

type Chars<'a> = Peekable<CharIndices<'a>>;

/// Byte offset of the next unread character.
fn offset(chars: &mut Chars<'_>, source: &str) -> usize {
    chars.peek().map_or(source.len(), |&(i, _)| i)
}

fn peek_char(chars: &mut Chars<'_>) -> Option<char> {
    chars.peek().map(|&(_, c)| c)
}

pub fn tokenize(source: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut chars = source.char_indices().peekable();
    let mut line = 1usize;

    while let Some(&(start, ch)) = chars.peek() {
        let kind = match ch {
            '#' => {
                while let Some(c) = peek_char(&mut chars) {
                    if c == '\n' {
                        break;
                    }
                    chars.next();
                }
                continue;
            }
            ' ' | '\t' | '\r' => {
                chars.next();
                continue;
            }
            '\n' => {
                chars.next();
                tokens.push(Token { kind: TokenKind::Newline, lexeme: "\n".to_string(), line });
                line += 1;
                continue;
            }
            '(' => {
                chars.next();
                TokenKind::LParen
            }
            ')' => {
                chars.next();
                TokenKind::RParen
            }
            ',' => {
                chars.next();
                TokenKind::Comma
            }
            '$' => {
                chars.next();
                TokenKind::Dollar
            }
            '+' => {
                chars.next();
                TokenKind::Operator(Operator::Plus)
            }
            '-' => {
                chars.next();
                TokenKind::Operator(Operator::Minus)
            }
            '=' => {
                chars.next();
                if peek_char(&mut chars) == Some('=') {
                    chars.next();
                    TokenKind::Operator(Operator::Eq)
                } else {
                    TokenKind::Operator(Operator::Assign)
                }
            }
            '!' => {
                chars.next();
                if peek_char(&mut chars) == Some('=') {
                    chars.next();
                    TokenKind::Operator(Operator::NotEq)
                } else {
                    TokenKind::Unknown
                }
            }
            '<' | '>' => {
                chars.next();
                let with_eq = peek_char(&mut chars) == Some('=');
                if with_eq {
                    chars.next();
                }
                TokenKind::Operator(match (ch, with_eq) {
                    ('<', false) => Operator::Lt,
                    ('<', true) => Operator::LtEq,
                    ('>', false) => Operator::Gt,
                    _ => Operator::GtEq,
                })
            }
            '"' | '\'' => lex_string(&mut chars, ch),
            c if c.is_ascii_digit() => {
                while peek_char(&mut chars).map_or(false, |d| d.is_ascii_digit()) {
                    chars.next();
                }
                let end = offset(&mut chars, source);
                source[start..end]
                    .parse()
                    .map(TokenKind::Number)
                    .unwrap_or(TokenKind::Unknown)
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                while peek_char(&mut chars)
                    .map_or(false, |c| c.is_ascii_alphanumeric() || c == '_')
                {
                    chars.next();
                }
                let end = offset(&mut chars, source);
                let ident = &source[start..end];
                match ident {
                    "true" => TokenKind::Boolean(true),
                    "false" => TokenKind::Boolean(false),
                    _ => Keyword::from_ident(ident)
                        .map(TokenKind::Keyword)
                        .unwrap_or_else(|| TokenKind::Ident(ident.to_string())),
                }
            }
            _ => {
                chars.next();
                TokenKind::Unknown
            }
        };
        let end = offset(&mut chars, source);
        tokens.push(Token { kind, lexeme: source[start..end].to_string(), line });
    }

    tokens
}

/// Reads a quoted string starting at its opening quote. Stops short of a
/// newline, which leaves the string unterminated.
fn lex_string(chars: &mut Chars<'_>, quote: char) -> TokenKind {
    chars.next();
    let mut fragments = Vec::new();
    let mut text = String::new();

    loop {
        match peek_char(chars) {
            None | Some('\n') => return TokenKind::Unknown,
            Some('\\') => {
                chars.next();
                match peek_char(chars) {
                    None | Some('\n') => return TokenKind::Unknown,
                    Some(c) => {
                        chars.next();
                        match c {
                            'n' => text.push('\n'),
                            't' => text.push('\t'),
                            '\\' | '"' | '\'' | '$' => text.push(c),
                            other => {
                                text.push('\\');
                                text.push(other);
                            }
                        }
                    }
                }
            }
            Some('$') => {
                chars.next();
                if peek_char(chars) != Some('(') {
                    text.push('$');
                    continue;
                }
                chars.next();
                match read_reference_body(chars) {
                    Some(body) => {
                        if !text.is_empty() {
                            fragments.push(Fragment::Text(std::mem::take(&mut text)));
                        }
                        fragments.push(Fragment::Reference(body));
                    }
                    None => return TokenKind::Unknown,
                }
            }
            Some(c) if c == quote => {
                chars.next();
                break;
            }
            Some(c) => {
                chars.next();
                text.push(c);
            }
        }
    }

    if !text.is_empty() || fragments.is_empty() {
        fragments.push(Fragment::Text(text));
    }
    TokenKind::Str(fragments)
}

/// Reads the body of a `$(...)` run, just past the `(`, up to and including
/// its matching `)`. Quoted arguments may contain parentheses. Returns
/// `None` if a newline or end of input comes first.
pub(crate) fn read_reference_body(chars: &mut Chars<'_>) -> Option<String> {
    let mut body = String::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;

    loop {
        let c = peek_char(chars)?;
        if c == '\n' {
            return None;
        }
        chars.next();
        match (quote, c) {
            (Some(_), '\\') => {
                body.push(c);
                match peek_char(chars) {
                    None | Some('\n') => return None,
                    Some(escaped) => {
                        chars.next();
                        body.push(escaped);
                    }
                }
                continue;
            }
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') => quote = Some(c),
            (None, '(') => depth += 1,
            (None, ')') if depth == 0 => return Some(body),
            (None, ')') => depth -= 1,
            _ => {}
        }
        body.push(c);
    }
}

/// Splits template text into fragments. Malformed `$(` runs stay literal.
pub(crate) fn scan_template(text: &str) -> Vec<Fragment> {
    let mut fragments = Vec::new();
    let mut literal = String::new();
    let mut chars = text.char_indices().peekable();

    while let Some((_, c)) = chars.next() {
        if c == '$' && peek_char(&mut chars) == Some('(') {
            let mut lookahead = chars.clone();
            lookahead.next();
            if let Some(body) = read_reference_body(&mut lookahead) {
                if !literal.is_empty() {
                    fragments.push(Fragment::Text(std::mem::take(&mut literal)));
                }
                fragments.push(Fragment::Reference(body));
                chars = lookahead;
                continue;
            }
        }
        literal.push(c);
    }

    if !literal.is_empty() {
        fragments.push(Fragment::Text(literal));
    }
    fragments
}
