use std::{fmt, rc::Rc};

use crate::token::Token;

#[derive(Debug, PartialEq, Clone)]
pub struct Program {
    pub expressions: Vec<Expression>,
}

impl Program {
    pub fn into_block(self) -> Block {
        Block(self.expressions)
    }
}

/// A sequence of expressions evaluated in order; the value of a block is the
/// value of its last expression.
#[derive(Debug, PartialEq, Clone, Default)]
pub struct Block(pub Vec<Expression>);

impl Block {
    pub fn single(expression: Expression) -> Self {
        Block(vec![expression])
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Expression> {
        self.0.iter()
    }
}

#[derive(Debug, PartialEq, Clone, Copy)]
pub enum ControlKind {
    Break,
    Continue,
}

#[derive(Debug, PartialEq, Clone)]
pub enum ForLoop {
    Traditional {
        init: Option<Box<Expression>>,
        condition: Box<Expression>,
        step: Option<Box<Expression>>,
    },
    /// `for (i in xs)` walks the indices of `xs`.
    In { variable: String, iterable: Box<Expression> },
    /// `for (x of xs)` walks the elements of `xs`.
    Of { variable: String, iterable: Box<Expression> },
}

#[derive(Debug, PartialEq, Clone)]
pub enum Expression {
    NullLiteral,
    NumberLiteral(f64),
    BooleanLiteral(bool),
    CharacterLiteral(char),
    StringLiteral(String),
    ListLiteral(Vec<Expression>),
    Block(Block),
    Control {
        kind: ControlKind,
        carry: usize,
    },
    Identifier(String),
    Prefix {
        operator: Token,
        right: Box<Expression>,
    },
    Postfix {
        operator: Token,
        left: Box<Expression>,
    },
    Infix {
        left: Box<Expression>,
        operator: Token,
        right: Box<Expression>,
    },
    Assign {
        target: Box<Expression>,
        value: Box<Expression>,
        operator: Option<Token>,
        is_ref: bool,
        is_const: bool,
        limit: Option<Box<Expression>>,
    },
    FunctionLiteral {
        parameters: Vec<String>,
        body: Rc<Block>,
    },
    Call {
        function: Box<Expression>,
        arguments: Vec<Expression>,
    },
    Method {
        receiver: Box<Expression>,
        name: String,
        arguments: Vec<Expression>,
    },
    Index {
        left: Box<Expression>,
        index: Box<Expression>,
    },
    If {
        condition: Box<Expression>,
        consequence: Block,
        alternative: Option<Block>,
    },
    While {
        condition: Box<Expression>,
        body: Block,
    },
    For {
        r#loop: ForLoop,
        body: Block,
    },
    Range {
        start: Box<Expression>,
        end: Box<Expression>,
        step: Option<Box<Expression>>,
        inclusive: bool,
    },
    Pop {
        list: Box<Expression>,
        index: Option<Box<Expression>>,
    },
    Push {
        value: Box<Expression>,
        list: Box<Expression>,
        index: Option<Box<Expression>>,
    },
    Shift {
        source: Box<Expression>,
        destination: Box<Expression>,
    },
}

impl Expression {
    /// Whether the expression names a storage location (a binding or a
    /// container slot).
    pub fn is_location(&self) -> bool {
        matches!(self, Expression::Identifier(_) | Expression::Index { .. })
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for expression in &self.expressions {
            write!(f, "{}", expression)?;
        }
        Ok(())
    }
}

fn join(expressions: &[Expression]) -> String {
    expressions
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<String>>()
        .join(", ")
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let body = self
            .0
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<String>>()
            .join("; ");
        write!(f, "{{ {} }}", body)
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Expression::NullLiteral => write!(f, "null"),
            Expression::NumberLiteral(value) => write!(f, "{}", value),
            Expression::BooleanLiteral(value) => write!(f, "{}", value),
            Expression::CharacterLiteral(value) => write!(f, "'{}'", value),
            Expression::StringLiteral(value) => write!(f, "\"{}\"", value),
            Expression::ListLiteral(items) => write!(f, "[{}]", join(items)),
            Expression::Block(block) => write!(f, "{}", block),
            Expression::Control { kind, carry } => {
                let keyword = match kind {
                    ControlKind::Break => "break",
                    ControlKind::Continue => "continue",
                };
                write!(f, "{}{}", keyword, "#".repeat(*carry))
            }
            Expression::Identifier(name) => write!(f, "{}", name),
            Expression::Prefix { operator, right } => write!(f, "({}{})", operator, right),
            Expression::Postfix { operator, left } => write!(f, "({}{})", left, operator),
            Expression::Infix {
                left,
                operator,
                right,
            } => write!(f, "({} {} {})", left, operator, right),
            Expression::Assign {
                target,
                value,
                operator,
                is_ref,
                is_const,
                limit,
            } => {
                write!(f, "{}", target)?;
                if let Some(limit) = limit {
                    write!(f, "${}", limit)?;
                }
                write!(f, " ")?;
                if let Some(operator) = operator {
                    write!(f, "{}", operator)?;
                }
                if *is_ref {
                    write!(f, "&")?;
                }
                write!(f, "{} {}", if *is_const { "::" } else { "=" }, value)
            }
            Expression::FunctionLiteral { parameters, body } => {
                write!(f, "({}) => {}", parameters.join(", "), body)
            }
            Expression::Call {
                function,
                arguments,
            } => write!(f, "{}({})", function, join(arguments)),
            Expression::Method {
                receiver,
                name,
                arguments,
            } => write!(f, "{}.{}({})", receiver, name, join(arguments)),
            Expression::Index { left, index } => write!(f, "{}[{}]", left, index),
            Expression::If {
                condition,
                consequence,
                alternative,
            } => {
                write!(f, "{} ? {}", condition, consequence)?;
                if let Some(alternative) = alternative {
                    write!(f, " : {}", alternative)?;
                }
                Ok(())
            }
            Expression::While { condition, body } => write!(f, "while ({}) {}", condition, body),
            Expression::For { r#loop, body } => match r#loop {
                ForLoop::Traditional {
                    init,
                    condition,
                    step,
                } => {
                    let init = init.as_ref().map(|e| e.to_string()).unwrap_or_default();
                    let step = step.as_ref().map(|e| e.to_string()).unwrap_or_default();
                    write!(f, "for ({}; {}; {}) {}", init, condition, step, body)
                }
                ForLoop::In { variable, iterable } => {
                    write!(f, "for ({} in {}) {}", variable, iterable, body)
                }
                ForLoop::Of { variable, iterable } => {
                    write!(f, "for ({} of {}) {}", variable, iterable, body)
                }
            },
            Expression::Range {
                start,
                end,
                step,
                inclusive,
            } => {
                write!(f, "{}..{}{}", start, if *inclusive { "=" } else { "" }, end)?;
                if let Some(step) = step {
                    write!(f, "..{}", step)?;
                }
                Ok(())
            }
            Expression::Pop { list, index } => match index {
                Some(index) => write!(f, "<<({}) {}", index, list),
                None => write!(f, "<< {}", list),
            },
            Expression::Push { value, list, index } => match index {
                Some(index) => write!(f, "{} >>({}) {}", value, index, list),
                None => write!(f, "{} >> {}", value, list),
            },
            Expression::Shift {
                source,
                destination,
            } => write!(f, "{} -> {}", source, destination),
        }
    }
}
