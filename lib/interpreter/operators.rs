use anyhow::{bail, Result};

use super::{
    capability::{dispatch, Operation},
    error::RuntimeError,
    value::Value,
};
use crate::token::Token;

impl Operation {
    pub fn from_token(token: &Token) -> Option<Self> {
        let operation = match token {
            Token::Plus => Operation::Add,
            Token::Minus => Operation::Sub,
            Token::Asterisk => Operation::Mul,
            Token::Slash => Operation::Div,
            Token::Percent => Operation::Mod,
            Token::Eq => Operation::Equal,
            Token::Gt => Operation::Greater,
            Token::Lt => Operation::Lesser,
            Token::GtEq => Operation::GreaterEq,
            Token::LtEq => Operation::LesserEq,
            Token::And => Operation::And,
            Token::Or => Operation::Or,
            _ => return None,
        };
        Some(operation)
    }
}

pub fn eval_binary(operator: &Token, left: &Value, right: &Value) -> Result<Value> {
    let Some(operation) = Operation::from_token(operator) else {
        bail!(RuntimeError::Syntax(format!(
            "{} is not a binary operator",
            operator
        )));
    };

    if let Some(value) = dispatch(operation, left, right)? {
        return Ok(value);
    }
    if operation == Operation::Equal
        && left.capabilities().equal.is_none()
        && left.kind() == right.kind()
    {
        return Ok(Value::Boolean(left == right));
    }

    bail!(RuntimeError::Type(format!(
        "{} is not defined between type {} and {}",
        operation,
        left.kind(),
        right.kind()
    )))
}

pub fn eval_prefix(operator: &Token, right: &Value) -> Result<Value> {
    match operator {
        Token::Minus => negate(right),
        Token::Bang => match right {
            Value::Boolean(value) => Ok(Value::Boolean(!value)),
            other => bail!(RuntimeError::Type(format!(
                "Logical not is not defined for type {}",
                other.kind()
            ))),
        },
        Token::Increment => step(right, 1.0).map(|(_, new)| Value::number(new)),
        Token::Decrement => step(right, -1.0).map(|(_, new)| Value::number(new)),
        token => bail!(RuntimeError::Syntax(format!(
            "{} is not a prefix operator",
            token
        ))),
    }
}

/// `x++` and `x--` update the number in place and yield the old value.
pub fn eval_postfix(operator: &Token, left: &Value) -> Result<Value> {
    let delta = match operator {
        Token::Increment => 1.0,
        Token::Decrement => -1.0,
        token => bail!(RuntimeError::Syntax(format!(
            "{} is not a postfix operator",
            token
        ))),
    };
    step(left, delta).map(|(old, _)| Value::number(old))
}

fn negate(value: &Value) -> Result<Value> {
    match value {
        Value::Number(cell) => Ok(Value::number(-cell.get())),
        Value::List(items) => {
            let items = items.borrow().clone();
            Ok(Value::list(
                items.iter().map(negate).collect::<Result<Vec<Value>>>()?,
            ))
        }
        other => bail!(RuntimeError::Type(format!(
            "Negation is not defined for type {}",
            other.kind()
        ))),
    }
}

fn step(value: &Value, delta: f64) -> Result<(f64, f64)> {
    match value {
        Value::Number(cell) => {
            let old = cell.get();
            cell.set(old + delta);
            Ok((old, old + delta))
        }
        other => bail!(RuntimeError::Type(format!(
            "{} is not defined for type {}",
            if delta > 0.0 { "Increment" } else { "Decrement" },
            other.kind()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_binary_errors_name_both_kinds() {
        let err = eval_binary(&Token::Plus, &Value::Boolean(true), &Value::Null).unwrap_err();
        assert_eq!(
            err.to_string(),
            "TypeError: Addition is not defined between type Boolean and Null"
        );
    }

    #[test]
    fn test_equality_fallback() {
        let cases = vec![
            (Value::Null, Value::Null, Ok(true)),
            (Value::number(1.0), Value::number(1.0), Ok(true)),
            (Value::string("a"), Value::string("b"), Ok(false)),
            (Value::Null, Value::number(0.0), Err(())),
        ];
        for (left, right, expected) in cases {
            let result = eval_binary(&Token::Eq, &left, &right).map_err(|_| ());
            assert_eq!(result, expected.map(Value::Boolean));
        }
    }

    #[test]
    fn test_step_operators() {
        let number = Value::number(5.0);
        assert_eq!(eval_postfix(&Token::Increment, &number).unwrap(), Value::number(5.0));
        assert_eq!(number.as_number(), Some(6.0));
        assert_eq!(eval_prefix(&Token::Decrement, &number).unwrap(), Value::number(5.0));
        assert_eq!(number.as_number(), Some(5.0));
        assert!(eval_prefix(&Token::Increment, &Value::Null).is_err());
    }

    #[test]
    fn test_negation() {
        let list = Value::list(vec![Value::number(1.0), Value::list(vec![Value::number(-2.0)])]);
        assert_eq!(
            eval_prefix(&Token::Minus, &list).unwrap(),
            Value::list(vec![Value::number(-1.0), Value::list(vec![Value::number(2.0)])])
        );
        assert_eq!(
            eval_prefix(&Token::Bang, &Value::Boolean(false)).unwrap(),
            Value::Boolean(true)
        );
        assert!(eval_prefix(&Token::Bang, &Value::number(1.0)).is_err());
    }
}
