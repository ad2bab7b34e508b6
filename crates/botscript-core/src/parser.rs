//! Recursive-descent parser producing a [`Program`].
//!
//! Blocks are delimited purely by keywords (`when` … `then` … [`else`] …
//! `end`); newlines separate statements and indentation is ignored. Each
//! `end` closes the innermost open `when`.

use tracing::trace;

use crate::ast::*;
use crate::error::ParseError;
use crate::lexer::{tokenize, Fragment, Keyword, Operator, Token, TokenKind};
use crate::value::Value;

/// Maximum number of nested `when` blocks accepted by [`parse`].
pub const DEFAULT_MAX_DEPTH: usize = 64;

/// Operators, groups, calls and references allowed in one statement's
/// expression. Keeps expression trees shallow enough to evaluate and drop
/// recursively.
pub const MAX_EXPRESSION_SIZE: usize = 256;

/// Parses script source with the default nesting limit.
pub fn parse(source: &str) -> Result<Program, ParseError> {
    Parser::new(source).parse()
}

pub struct Parser<'a> {
    source: &'a str,
    tokens: Vec<Token>,
    pos: usize,
    max_depth: usize,
    depth: usize,
    /// Expression budget spent by the statement being parsed.
    size: usize,
}

impl<'a> Parser<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            tokens: tokenize(source),
            pos: 0,
            max_depth: DEFAULT_MAX_DEPTH,
            depth: 0,
            size: 0,
        }
    }

    /// Caps how deeply `when` blocks may nest.
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn parse(mut self) -> Result<Program, ParseError> {
        self.skip_newlines();
        if self.peek().is_none() {
            return Err(self.error(1, "Script is empty"));
        }

        let statements = self.parse_block(&[])?;
        trace!(statements = statements.len(), "parsed script");
        Ok(Program { statements })
    }

    fn error(&self, line: usize, message: impl Into<String>) -> ParseError {
        ParseError::at(self.source, line, message)
    }

    fn current_line(&self) -> usize {
        self.tokens.get(self.pos).map_or(
            self.tokens.last().map_or(1, |t| t.line),
            |t| t.line,
        )
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_kind(&self) -> Option<&TokenKind> {
        self.peek().map(|t| &t.kind)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn skip_newlines(&mut self) {
        while self.peek_kind() == Some(&TokenKind::Newline) {
            self.advance();
        }
    }

    fn peek_keyword(&self) -> Option<Keyword> {
        match self.peek_kind() {
            Some(TokenKind::Keyword(k)) => Some(*k),
            _ => None,
        }
    }

    /// True where a statement may legally end: a newline, end of input, or
    /// the keyword that starts the next statement or closes a block.
    fn at_statement_end(&self) -> bool {
        matches!(
            self.peek_kind(),
            None | Some(TokenKind::Newline) | Some(TokenKind::Keyword(_))
        )
    }

    /// Counts one operator or nested construct against the statement's
    /// expression budget.
    fn grow(&mut self, line: usize) -> Result<(), ParseError> {
        self.size += 1;
        if self.size > MAX_EXPRESSION_SIZE {
            return Err(self.error(
                line,
                format!(
                    "Expression is too large (more than {} operators, groups or references)",
                    MAX_EXPRESSION_SIZE
                ),
            ));
        }
        Ok(())
    }

    fn unexpected(&self, context: &str) -> ParseError {
        match self.peek() {
            Some(token) if token.kind == TokenKind::Newline => {
                self.error(token.line, format!("Unexpected end of line {}", context))
            }
            Some(token) => self.error(
                token.line,
                format!("Unexpected '{}' {}", token.lexeme, context),
            ),
            None => self.error(
                self.current_line(),
                format!("Unexpected end of input {}", context),
            ),
        }
    }

    /// Parses statements until end of input or one of `terminators`, which
    /// is left unconsumed.
    fn parse_block(&mut self, terminators: &[Keyword]) -> Result<Vec<Statement>, ParseError> {
        let mut statements = Vec::new();
        loop {
            self.skip_newlines();
            match self.peek_keyword() {
                Some(k) if terminators.contains(&k) => break,
                _ => {}
            }
            if self.peek().is_none() {
                break;
            }
            statements.push(self.parse_statement()?);
            if !self.at_statement_end() {
                return Err(self.unexpected("after statement"));
            }
        }
        Ok(statements)
    }

    fn parse_statement(&mut self) -> Result<Statement, ParseError> {
        let token = match self.peek() {
            Some(token) => token.clone(),
            None => return Err(self.error(self.current_line(), "Expected a statement")),
        };
        match token.kind {
            TokenKind::Keyword(Keyword::Set) => self.parse_set(),
            TokenKind::Keyword(Keyword::When) => self.parse_when(),
            TokenKind::Keyword(Keyword::Send) => self.parse_send(),
            TokenKind::Keyword(k @ (Keyword::Then | Keyword::Else | Keyword::End)) => Err(
                self.error(token.line, format!("'{}' without a matching 'when'", k)),
            ),
            TokenKind::Ident(name) => {
                Err(self.error(token.line, format!("Unknown keyword '{}'", name)))
            }
            _ => Err(self.error(
                token.line,
                format!("Expected a statement, found '{}'", token.lexeme),
            )),
        }
    }

    fn parse_set(&mut self) -> Result<Statement, ParseError> {
        let line = self.current_line();
        self.advance();
        let variable = match self.peek_kind() {
            Some(TokenKind::Ident(name)) => name.clone(),
            _ => return Err(self.error(line, "Expected a variable name after 'set'")),
        };
        self.advance();
        if self.peek_kind() == Some(&TokenKind::Operator(Operator::Assign)) {
            self.advance();
        }
        if self.at_statement_end() {
            return Err(self.error(line, format!("'set {}' is missing a value", variable)));
        }
        self.size = 0;
        let expr = self.parse_expression()?;
        Ok(Statement::Set { variable, expr, line })
    }

    fn parse_send(&mut self) -> Result<Statement, ParseError> {
        let line = self.current_line();
        self.advance();
        if self.at_statement_end() {
            return Err(self.error(line, "'send' is missing a value"));
        }
        self.size = 0;
        let expr = self.parse_expression()?;
        Ok(Statement::Send { expr, line })
    }

    fn parse_when(&mut self) -> Result<Statement, ParseError> {
        let line = self.current_line();
        self.advance();
        if self.depth >= self.max_depth {
            return Err(self.error(
                line,
                format!("'when' blocks nested deeper than {} levels", self.max_depth),
            ));
        }
        if self.at_statement_end() {
            return Err(self.error(line, "'when' is missing a condition"));
        }
        self.size = 0;
        let condition = self.parse_expression()?;
        if self.peek_keyword() != Some(Keyword::Then) {
            return Err(self.error(line, "Expected 'then' after the 'when' condition"));
        }
        self.advance();

        self.depth += 1;
        let then_branch = self.parse_block(&[Keyword::Else, Keyword::End])?;
        let else_branch = if self.peek_keyword() == Some(Keyword::Else) {
            self.advance();
            let branch = self.parse_block(&[Keyword::Else, Keyword::End])?;
            if self.peek_keyword() == Some(Keyword::Else) {
                let message = "'when' block has more than one 'else'";
                return Err(self.error(self.current_line(), message));
            }
            Some(branch)
        } else {
            None
        };
        if self.peek_keyword() != Some(Keyword::End) {
            return Err(self.error(line, "'when' has no matching 'end'"));
        }
        self.advance();
        self.depth -= 1;

        Ok(Statement::Conditional { condition, then_branch, else_branch, line })
    }

    fn parse_expression(&mut self) -> Result<Expression, ParseError> {
        let left = self.parse_additive()?;
        let op = match self.peek_kind() {
            Some(TokenKind::Operator(Operator::Eq)) => BinOp::Eq,
            Some(TokenKind::Operator(Operator::NotEq)) => BinOp::NotEq,
            Some(TokenKind::Operator(Operator::Lt)) => BinOp::Lt,
            Some(TokenKind::Operator(Operator::LtEq)) => BinOp::LtEq,
            Some(TokenKind::Operator(Operator::Gt)) => BinOp::Gt,
            Some(TokenKind::Operator(Operator::GtEq)) => BinOp::GtEq,
            _ => return Ok(left),
        };
        self.grow(self.current_line())?;
        self.advance();
        let right = self.parse_additive()?;
        Ok(Expression::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        })
    }

    fn parse_additive(&mut self) -> Result<Expression, ParseError> {
        let mut expr = self.parse_primary()?;
        loop {
            let op = match self.peek_kind() {
                Some(TokenKind::Operator(Operator::Plus)) => BinOp::Add,
                Some(TokenKind::Operator(Operator::Minus)) => BinOp::Sub,
                _ => return Ok(expr),
            };
            self.grow(self.current_line())?;
            self.advance();
            let right = self.parse_primary()?;
            expr = Expression::Binary {
                op,
                left: Box::new(expr),
                right: Box::new(right),
            };
        }
    }

    fn parse_primary(&mut self) -> Result<Expression, ParseError> {
        let token = match self.peek() {
            Some(token) if token.kind != TokenKind::Newline => token.clone(),
            _ => return Err(self.unexpected("where an expression was expected")),
        };
        match token.kind {
            TokenKind::Str(fragments) => {
                self.advance();
                self.build_string(fragments, token.line)
            }
            TokenKind::Number(n) => {
                self.advance();
                Ok(Expression::Literal(Value::Number(n)))
            }
            TokenKind::Boolean(b) => {
                self.advance();
                Ok(Expression::Literal(Value::Boolean(b)))
            }
            TokenKind::Operator(Operator::Minus) => {
                self.advance();
                match self.peek_kind() {
                    Some(TokenKind::Number(n)) => {
                        let n = -*n;
                        self.advance();
                        Ok(Expression::Literal(Value::Number(n)))
                    }
                    _ => Err(self.error(token.line, "Expected a number after '-'")),
                }
            }
            TokenKind::Ident(name) => {
                self.advance();
                if self.peek_kind() == Some(&TokenKind::LParen) {
                    self.parse_call(name)
                } else {
                    Ok(Expression::VariableRef(name))
                }
            }
            TokenKind::Dollar => {
                self.grow(token.line)?;
                self.advance();
                if self.peek_kind() != Some(&TokenKind::LParen) {
                    return Err(self.error(token.line, "Expected '(' after '$'"));
                }
                self.advance();
                let expr = self.parse_reference_target()?;
                if self.peek_kind() != Some(&TokenKind::RParen) {
                    return Err(self.unexpected("in '$(...)' reference, expected ')'"));
                }
                self.advance();
                Ok(expr)
            }
            TokenKind::LParen => {
                self.grow(token.line)?;
                self.advance();
                let expr = self.parse_expression()?;
                if self.peek_kind() != Some(&TokenKind::RParen) {
                    return Err(self.unexpected("in parenthesized expression, expected ')'"));
                }
                self.advance();
                Ok(expr)
            }
            TokenKind::Keyword(k) => Err(self.error(
                token.line,
                format!("Expected an expression, found keyword '{}'", k),
            )),
            _ => Err(self.unexpected("where an expression was expected")),
        }
    }

    /// The part of a reference after `$(`: a name, a call, or an argument
    /// position.
    fn parse_reference_target(&mut self) -> Result<Expression, ParseError> {
        match self.peek_kind().cloned() {
            Some(TokenKind::Ident(name)) => {
                self.advance();
                if self.peek_kind() == Some(&TokenKind::LParen) {
                    self.parse_call(name)
                } else {
                    Ok(Expression::BuiltinRef(name))
                }
            }
            Some(TokenKind::Number(n)) => {
                self.advance();
                Ok(Expression::BuiltinRef(n.to_string()))
            }
            _ => Err(self.unexpected("in '$(...)', expected a name")),
        }
    }

    /// Parses `(args...)` following a function name.
    fn parse_call(&mut self, name: String) -> Result<Expression, ParseError> {
        self.grow(self.current_line())?;
        self.advance();
        let mut args = Vec::new();
        if self.peek_kind() == Some(&TokenKind::RParen) {
            self.advance();
            return Ok(Expression::FunctionCall { name, args });
        }

        loop {
            args.push(self.parse_expression()?);
            match self.peek_kind() {
                Some(TokenKind::Comma) => {
                    self.advance();
                }
                Some(TokenKind::RParen) => {
                    self.advance();
                    break;
                }
                _ => {
                    let context = format!("in call to '{}', expected ',' or ')'", name);
                    return Err(self.unexpected(&context));
                }
            }
        }
        Ok(Expression::FunctionCall { name, args })
    }

    fn build_string(
        &mut self,
        fragments: Vec<Fragment>,
        line: usize,
    ) -> Result<Expression, ParseError> {
        let mut parts = Vec::with_capacity(fragments.len());
        for fragment in fragments {
            parts.push(match fragment {
                Fragment::Text(text) => Expression::Literal(Value::String(text)),
                Fragment::Reference(body) => {
                    self.grow(line)?;
                    let (expr, size) = parse_reference_within(self.source, &body, line, self.size)?;
                    self.size = size;
                    expr
                }
            });
        }
        Ok(match parts.len() {
            1 => parts.remove(0),
            _ => Expression::Interpolated(parts),
        })
    }
}

/// Parses the body of a `$(...)` run found on `line` of `source`.
pub(crate) fn parse_reference(
    source: &str,
    body: &str,
    line: usize,
) -> Result<Expression, ParseError> {
    parse_reference_within(source, body, line, 0).map(|(expr, _)| expr)
}

/// Like [`parse_reference`], starting from `size` already spent and
/// returning the new total.
fn parse_reference_within(
    source: &str,
    body: &str,
    line: usize,
    size: usize,
) -> Result<(Expression, usize), ParseError> {
    let mut tokens = tokenize(body);
    for token in &mut tokens {
        token.line = line;
    }
    let mut parser = Parser {
        source,
        tokens,
        pos: 0,
        max_depth: DEFAULT_MAX_DEPTH,
        depth: 0,
        size,
    };
    if parser.peek().is_none() {
        return Err(parser.error(line, "Empty '$()' reference"));
    }
    let expr = parser.parse_reference_target()?;
    if let Some(token) = parser.peek() {
        return Err(parser.error(
            line,
            format!("Unexpected '{}' in '$({})'", token.lexeme, body),
        ));
    }
    Ok((expr, parser.size))
}
