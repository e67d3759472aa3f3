use std::rc::Rc;

use anyhow::{anyhow, bail, Result};

use crate::{
    ast::{Block, ControlKind, Expression, ForLoop, Program},
    lexer::Lexer,
    token::Token,
};

#[derive(Debug, Clone, PartialOrd, PartialEq, Eq, Ord)]
enum Precedence {
    Lowest,
    Shift,
    Assign,
    Conditional,
    Push,
    Range,
    Or,
    And,
    Equals,
    LessGreater,
    Sum,
    Product,
    Postfix,
    Prefix,
    Call,
}

impl Precedence {
    fn from_token(token: &Token) -> Self {
        match token {
            Token::Arrow => Precedence::Shift,
            Token::Question => Precedence::Conditional,
            Token::PushAngle => Precedence::Push,
            Token::DoubleDot => Precedence::Range,
            Token::Or => Precedence::Or,
            Token::And => Precedence::And,
            Token::Eq => Precedence::Equals,
            Token::Lt | Token::Gt | Token::LtEq | Token::GtEq => Precedence::LessGreater,
            Token::Plus | Token::Minus => Precedence::Sum,
            Token::Asterisk | Token::Slash | Token::Percent => Precedence::Product,
            Token::Increment | Token::Decrement => Precedence::Postfix,
            Token::Lparen | Token::Lbracket | Token::Dot => Precedence::Call,
            _ => Precedence::Lowest,
        }
    }
}

pub struct Parser {
    tokens: Vec<Token>,
    position: usize,
}

impl Parser {
    pub fn new(lexer: Lexer) -> Self {
        Self {
            tokens: lexer.collect(),
            position: 0,
        }
    }

    pub fn parse_program(&mut self) -> Result<Program> {
        let mut expressions: Vec<Expression> = Vec::new();
        while let Some(token) = self.cur_token() {
            if !token.variant_eq(Token::Semicolon) {
                expressions.push(self.parse_expression_statement()?);
            }
            self.next_token();
        }
        Ok(Program { expressions })
    }

    fn cur_token(&self) -> Option<Token> {
        self.tokens.get(self.position).cloned()
    }

    fn peek_token(&self) -> Option<Token> {
        self.tokens.get(self.position + 1).cloned()
    }

    fn next_token(&mut self) -> &mut Self {
        self.position += 1;
        self
    }

    fn cur_token_is(&self, token: Token) -> bool {
        self.cur_token().is_some_and(|cur| cur.variant_eq(token))
    }

    fn peek_token_is(&self, token: Token) -> bool {
        self.peek_token().is_some_and(|peek| peek.variant_eq(token))
    }

    /// Whether the tokens after the current one open an assignment:
    /// `[op][&](= | ::)` or a `$limit` clause.
    fn peek_assignment(&self) -> bool {
        let is_assign = |offset: usize| {
            matches!(
                self.tokens.get(self.position + offset),
                Some(Token::Assign | Token::DoubleColon)
            )
        };
        let is_ref_assign = |offset: usize| {
            matches!(self.tokens.get(self.position + offset), Some(Token::Ampersand))
                && is_assign(offset + 1)
        };
        match self.peek_token() {
            Some(Token::Assign | Token::DoubleColon | Token::Dollar) => true,
            Some(Token::Ampersand) => is_assign(2),
            Some(token) if token.is_binary_operator() => is_assign(2) || is_ref_assign(2),
            _ => false,
        }
    }

    fn peek_precedence(&self) -> Precedence {
        if self.peek_assignment() {
            return Precedence::Assign;
        }
        self.peek_token()
            .map(|token| Precedence::from_token(&token))
            .unwrap_or(Precedence::Lowest)
    }

    fn cur_precedence(&self) -> Result<Precedence> {
        Ok(Precedence::from_token(
            &self.cur_token().ok_or(anyhow!("unexpected end of input"))?,
        ))
    }

    fn expect_peek(&mut self, exp_token: Token) -> Result<()> {
        match self.peek_token() {
            Some(peek_token) if peek_token.variant_eq(exp_token.clone()) => {
                self.next_token();
                Ok(())
            }
            Some(peek_token) => bail!("expected next token to be {exp_token}, found {peek_token}"),
            None => bail!("expected next token to be {exp_token}, found end of input"),
        }
    }

    fn parse_expression_statement(&mut self) -> Result<Expression> {
        let expression = self.parse_expression(Precedence::Lowest)?;

        if self.peek_token_is(Token::Semicolon) {
            self.next_token();
        }

        Ok(expression)
    }

    fn parse_expression(&mut self, precedence: Precedence) -> Result<Expression> {
        let cur_token = self.cur_token().ok_or(anyhow!("unexpected end of input"))?;

        let mut left_exp = match cur_token.clone() {
            Token::Ident(value) => Expression::Identifier(value),
            Token::Number(value) => self.parse_number_literal(value)?,
            Token::String(value) => Expression::StringLiteral(value),
            Token::Char(value) => Expression::CharacterLiteral(value),
            Token::True => Expression::BooleanLiteral(true),
            Token::False => Expression::BooleanLiteral(false),
            Token::Null => Expression::NullLiteral,
            Token::Break | Token::Continue => self.parse_control_expression(cur_token),
            Token::Bang
            | Token::Minus
            | Token::Increment
            | Token::Decrement
            | Token::Asterisk => self.parse_prefix_expression(cur_token)?,
            Token::Lparen if self.is_function_literal() => self.parse_function_literal()?,
            Token::Lparen => self.parse_grouped_expression()?,
            Token::Lbracket => Expression::ListLiteral(self.parse_expression_list(Token::Rbracket)?),
            Token::Lbrace => Expression::Block(self.parse_block()?),
            Token::While => self.parse_while_expression()?,
            Token::For => self.parse_for_expression()?,
            Token::PopAngle => self.parse_pop_expression()?,
            Token::DoubleDot => self.parse_range_expression(Expression::NumberLiteral(0.0))?,
            Token::Illegal(value) => bail!("illegal token {value}"),
            token => bail!("no prefix parse function for {token}"),
        };

        while self
            .peek_token()
            .is_some_and(|token| !token.variant_eq(Token::Semicolon))
            && precedence < self.peek_precedence()
        {
            if self.peek_assignment() {
                self.next_token();
                left_exp = self.parse_assign_expression(left_exp)?;
                continue;
            }
            match self.peek_token().ok_or(anyhow!("unexpected end of input"))? {
                Token::Arrow => {
                    self.next_token();
                    left_exp = self.parse_shift_expression(left_exp)?;
                }
                Token::Question => {
                    self.next_token();
                    left_exp = self.parse_conditional_expression(left_exp)?;
                }
                Token::PushAngle => {
                    self.next_token();
                    left_exp = self.parse_push_expression(left_exp)?;
                }
                Token::DoubleDot => {
                    self.next_token();
                    left_exp = self.parse_range_expression(left_exp)?;
                }
                Token::Increment | Token::Decrement => {
                    self.next_token();
                    left_exp = Expression::Postfix {
                        operator: self.cur_token().ok_or(anyhow!("unexpected end of input"))?,
                        left: Box::new(left_exp),
                    };
                }
                Token::Lparen => {
                    self.next_token();
                    left_exp = Expression::Call {
                        function: Box::new(left_exp),
                        arguments: self.parse_expression_list(Token::Rparen)?,
                    };
                }
                Token::Lbracket => {
                    self.next_token();
                    left_exp = self.parse_index_expression(left_exp)?;
                }
                Token::Dot => {
                    self.next_token();
                    left_exp = self.parse_method_expression(left_exp)?;
                }
                token if token.is_binary_operator() => {
                    self.next_token();
                    left_exp = self.parse_infix_expression(left_exp)?;
                }
                _ => return Ok(left_exp),
            };
        }

        Ok(left_exp)
    }

    fn parse_number_literal(&mut self, literal: String) -> Result<Expression> {
        let value = literal
            .parse::<f64>()
            .map_err(|err| anyhow!("could not parse number literal as f64: {err}"))?;
        Ok(Expression::NumberLiteral(value))
    }

    fn parse_control_expression(&mut self, token: Token) -> Expression {
        let kind = match token {
            Token::Break => ControlKind::Break,
            _ => ControlKind::Continue,
        };
        let mut carry = 0;
        while self.peek_token_is(Token::Octothorp) {
            self.next_token();
            carry += 1;
        }
        Expression::Control { kind, carry }
    }

    fn parse_prefix_expression(&mut self, token: Token) -> Result<Expression> {
        self.next_token();
        let right = self.parse_expression(Precedence::Prefix)?;
        Ok(Expression::Prefix {
            operator: token,
            right: Box::new(right),
        })
    }

    fn parse_infix_expression(&mut self, left: Expression) -> Result<Expression> {
        let token = self.cur_token().ok_or(anyhow!("unexpected end of input"))?;
        let precedence = self.cur_precedence()?;
        self.next_token();
        let right = self.parse_expression(precedence)?;
        Ok(Expression::Infix {
            left: Box::new(left),
            operator: token,
            right: Box::new(right),
        })
    }

    fn parse_assign_expression(&mut self, target: Expression) -> Result<Expression> {
        let limit = if self.cur_token_is(Token::Dollar) {
            self.next_token();
            let limit = self.parse_expression(Precedence::Prefix)?;
            self.next_token();
            Some(Box::new(limit))
        } else {
            None
        };

        let operator = match self.cur_token() {
            Some(token) if token.is_binary_operator() => {
                self.next_token();
                Some(token)
            }
            _ => None,
        };

        let is_ref = self.cur_token_is(Token::Ampersand);
        if is_ref {
            self.next_token();
        }

        let is_const = match self.cur_token() {
            Some(Token::Assign) => false,
            Some(Token::DoubleColon) => true,
            Some(token) => bail!("expected assignment operator, found {token}"),
            None => bail!("expected assignment operator, found end of input"),
        };

        self.next_token();
        let value = self.parse_expression(Precedence::Lowest)?;

        Ok(Expression::Assign {
            target: Box::new(target),
            value: Box::new(value),
            operator,
            is_ref,
            is_const,
            limit,
        })
    }

    fn parse_shift_expression(&mut self, source: Expression) -> Result<Expression> {
        self.next_token();
        let destination = self.parse_expression(Precedence::Shift)?;
        Ok(Expression::Shift {
            source: Box::new(source),
            destination: Box::new(destination),
        })
    }

    fn parse_conditional_expression(&mut self, condition: Expression) -> Result<Expression> {
        self.next_token();
        let consequence = self.parse_body()?;

        let alternative = if self.peek_token_is(Token::Colon) {
            self.next_token();
            self.next_token();
            Some(self.parse_body()?)
        } else {
            None
        };

        Ok(Expression::If {
            condition: Box::new(condition),
            consequence,
            alternative,
        })
    }

    /// Parses a loop or branch body: either a braced block or a single
    /// expression.
    fn parse_body(&mut self) -> Result<Block> {
        if self.cur_token_is(Token::Lbrace) {
            self.parse_block()
        } else {
            Ok(Block::single(self.parse_expression(Precedence::Lowest)?))
        }
    }

    fn parse_block(&mut self) -> Result<Block> {
        self.next_token();

        let mut expressions: Vec<Expression> = Vec::new();

        while self
            .cur_token()
            .is_some_and(|token| !token.variant_eq(Token::Rbrace))
        {
            if !self.cur_token_is(Token::Semicolon) {
                expressions.push(self.parse_expression_statement()?);
            }
            self.next_token();
        }

        if self.cur_token().is_none() {
            bail!("expected next token to be }}, found end of input");
        }

        Ok(Block(expressions))
    }

    fn parse_grouped_expression(&mut self) -> Result<Expression> {
        self.next_token();
        let exp = self.parse_expression(Precedence::Lowest)?;
        self.expect_peek(Token::Rparen)?;
        Ok(exp)
    }

    /// Looks past the parenthesis under the cursor for its match and reports
    /// whether a `=>` follows it.
    fn is_function_literal(&self) -> bool {
        let mut depth = 0usize;
        for (offset, token) in self.tokens[self.position..].iter().enumerate() {
            match token {
                Token::Lparen => depth += 1,
                Token::Rparen => {
                    depth -= 1;
                    if depth == 0 {
                        return matches!(
                            self.tokens.get(self.position + offset + 1),
                            Some(Token::FatArrow)
                        );
                    }
                }
                _ => {}
            }
        }
        false
    }

    fn parse_function_literal(&mut self) -> Result<Expression> {
        let mut parameters: Vec<String> = Vec::new();

        if self.peek_token_is(Token::Rparen) {
            self.next_token();
        } else {
            loop {
                match self.next_token().cur_token() {
                    Some(Token::Ident(name)) => parameters.push(name),
                    Some(token) => bail!("expected parameter name, found {token}"),
                    None => bail!("expected parameter name, found end of input"),
                }
                if !self.peek_token_is(Token::Comma) {
                    break;
                }
                self.next_token();
            }
            self.expect_peek(Token::Rparen)?;
        }

        self.expect_peek(Token::FatArrow)?;
        self.next_token();

        let body = self.parse_body()?;

        Ok(Expression::FunctionLiteral {
            parameters,
            body: Rc::new(body),
        })
    }

    fn parse_while_expression(&mut self) -> Result<Expression> {
        self.expect_peek(Token::Lparen)?;
        self.next_token();

        let condition = self.parse_expression(Precedence::Lowest)?;

        self.expect_peek(Token::Rparen)?;
        self.next_token();

        let body = self.parse_body()?;

        Ok(Expression::While {
            condition: Box::new(condition),
            body,
        })
    }

    fn parse_for_expression(&mut self) -> Result<Expression> {
        self.expect_peek(Token::Lparen)?;
        self.next_token();

        if let (Some(Token::Ident(variable)), Some(kind @ (Token::In | Token::Of))) =
            (self.cur_token(), self.peek_token())
        {
            self.next_token();
            self.next_token();
            let iterable = Box::new(self.parse_expression(Precedence::Lowest)?);
            self.expect_peek(Token::Rparen)?;
            self.next_token();
            let body = self.parse_body()?;
            let r#loop = match kind {
                Token::In => ForLoop::In { variable, iterable },
                _ => ForLoop::Of { variable, iterable },
            };
            return Ok(Expression::For { r#loop, body });
        }

        let init = if self.cur_token_is(Token::Semicolon) {
            None
        } else {
            let init = self.parse_expression(Precedence::Lowest)?;
            self.expect_peek(Token::Semicolon)?;
            Some(Box::new(init))
        };

        self.next_token();
        let condition = Box::new(self.parse_expression(Precedence::Lowest)?);
        self.expect_peek(Token::Semicolon)?;

        let step = if self.peek_token_is(Token::Rparen) {
            None
        } else {
            self.next_token();
            Some(Box::new(self.parse_expression(Precedence::Lowest)?))
        };

        self.expect_peek(Token::Rparen)?;
        self.next_token();

        let body = self.parse_body()?;

        Ok(Expression::For {
            r#loop: ForLoop::Traditional {
                init,
                condition,
                step,
            },
            body,
        })
    }

    /// Parses the optional `(index)` that directly follows `<<` or `>>`.
    fn parse_angle_index(&mut self) -> Result<Option<Box<Expression>>> {
        if !self.peek_token_is(Token::Lparen) {
            return Ok(None);
        }
        self.next_token();
        self.next_token();
        let index = self.parse_expression(Precedence::Lowest)?;
        self.expect_peek(Token::Rparen)?;
        Ok(Some(Box::new(index)))
    }

    fn parse_pop_expression(&mut self) -> Result<Expression> {
        let index = self.parse_angle_index()?;
        self.next_token();
        let list = self.parse_expression(Precedence::Prefix)?;
        Ok(Expression::Pop {
            list: Box::new(list),
            index,
        })
    }

    fn parse_push_expression(&mut self, value: Expression) -> Result<Expression> {
        let index = self.parse_angle_index()?;
        self.next_token();
        let list = self.parse_expression(Precedence::Push)?;
        Ok(Expression::Push {
            value: Box::new(value),
            list: Box::new(list),
            index,
        })
    }

    fn parse_range_expression(&mut self, start: Expression) -> Result<Expression> {
        let inclusive = self.peek_token_is(Token::Assign);
        if inclusive {
            self.next_token();
        }

        self.next_token();
        let end = self.parse_expression(Precedence::Range)?;

        let step = if self.peek_token_is(Token::DoubleDot) {
            self.next_token();
            self.next_token();
            Some(Box::new(self.parse_expression(Precedence::Range)?))
        } else {
            None
        };

        Ok(Expression::Range {
            start: Box::new(start),
            end: Box::new(end),
            step,
            inclusive,
        })
    }

    fn parse_index_expression(&mut self, left: Expression) -> Result<Expression> {
        self.next_token();
        let index = self.parse_expression(Precedence::Lowest)?;
        self.expect_peek(Token::Rbracket)?;
        Ok(Expression::Index {
            left: Box::new(left),
            index: Box::new(index),
        })
    }

    fn parse_method_expression(&mut self, receiver: Expression) -> Result<Expression> {
        let name = match self.peek_token() {
            Some(Token::Ident(name)) => name,
            Some(token) => bail!("expected next token to be identifier, found {token}"),
            None => bail!("expected next token to be identifier, found end of input"),
        };
        self.next_token();

        let arguments = if self.peek_token_is(Token::Lparen) {
            self.next_token();
            self.parse_expression_list(Token::Rparen)?
        } else {
            Vec::new()
        };

        Ok(Expression::Method {
            receiver: Box::new(receiver),
            name,
            arguments,
        })
    }

    fn parse_expression_list(&mut self, end_token: Token) -> Result<Vec<Expression>> {
        let mut expressions: Vec<Expression> = Vec::new();

        if self.peek_token_is(end_token.clone()) {
            self.next_token();
            return Ok(expressions);
        }

        self.next_token();
        expressions.push(self.parse_expression(Precedence::Lowest)?);

        while self.peek_token_is(Token::Comma) {
            self.next_token();
            self.next_token();
            expressions.push(self.parse_expression(Precedence::Lowest)?);
        }

        self.expect_peek(end_token)?;

        Ok(expressions)
    }
}
