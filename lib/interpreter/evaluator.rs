use std::{cell::RefCell, rc::Rc};

use anyhow::{bail, Result};

use super::{
    environment::{produce_environment, Environment, Limits},
    error::RuntimeError,
    operators,
    value::{Control, Function, Value, MAX_LIST_LEN},
};
use crate::{
    ast::{Block, ControlKind, Expression, ForLoop, Program},
    token::Token,
};

pub struct Evaluator {
    env: Rc<RefCell<Environment>>,
}

impl Default for Evaluator {
    fn default() -> Self {
        Self::new()
    }
}

impl Evaluator {
    pub fn new() -> Self {
        Self::with_limits(Limits::default())
    }

    pub fn with_limits(limits: Limits) -> Self {
        Self {
            env: produce_environment(limits),
        }
    }

    /// An evaluator working on an existing environment, as used by `eval`
    /// and the speculative read of a shift.
    pub fn with_environment(env: Rc<RefCell<Environment>>) -> Self {
        Self { env }
    }

    pub fn environment(&self) -> Rc<RefCell<Environment>> {
        self.env.clone()
    }

    pub fn eval(&mut self, program: &Program) -> Result<Value> {
        self.eval_expressions(&program.expressions)
    }

    pub fn eval_block(&mut self, block: &Block) -> Result<Value> {
        self.eval_expressions(&block.0)
    }

    pub fn trace(&self) -> Vec<Value> {
        self.env.borrow().trace()
    }

    fn eval_expressions(&mut self, expressions: &[Expression]) -> Result<Value> {
        let mut result = Value::Null;
        for expression in expressions {
            result = self.eval_expression(expression)?;
            self.env.borrow_mut().push_trace(&result);

            if let Value::Control(control) = result {
                if control.carry > 0 {
                    return Ok(Value::Control(Control {
                        kind: control.kind,
                        carry: control.carry - 1,
                    }));
                }
                return Ok(match control.kind {
                    ControlKind::Break => Value::Null,
                    ControlKind::Continue => Value::Boolean(true),
                });
            }
        }
        Ok(result)
    }

    fn eval_expression(&mut self, expression: &Expression) -> Result<Value> {
        let value = match expression {
            Expression::NullLiteral => Value::Null,
            Expression::NumberLiteral(value) => Value::number(*value),
            Expression::BooleanLiteral(value) => Value::Boolean(*value),
            Expression::CharacterLiteral(value) => Value::Character(*value),
            Expression::StringLiteral(value) => Value::string(value),
            Expression::ListLiteral(items) => Value::list(self.eval_arguments(items)?),
            Expression::Block(block) => self.eval_block(block)?,
            Expression::Control { kind, carry } => Value::Control(Control {
                kind: *kind,
                carry: *carry,
            }),
            Expression::Identifier(name) => self.env.borrow_mut().read(name)?,
            Expression::Prefix {
                operator: Token::Asterisk,
                right,
            } => self.eval_unsign(right)?,
            Expression::Prefix { operator, right } => {
                let right = self.eval_expression(right)?;
                operators::eval_prefix(operator, &right)?
            }
            Expression::Postfix { operator, left } => {
                let left = self.eval_expression(left)?;
                operators::eval_postfix(operator, &left)?
            }
            Expression::Infix {
                left,
                operator,
                right,
            } => {
                let left = self.eval_expression(left)?;
                let right = self.eval_expression(right)?;
                operators::eval_binary(operator, &left, &right)?
            }
            Expression::Assign {
                target,
                value,
                operator,
                is_ref,
                is_const,
                limit,
            } => self.eval_assign(
                target,
                value,
                operator.as_ref(),
                *is_ref,
                *is_const,
                limit.as_deref(),
            )?,
            Expression::FunctionLiteral { parameters, body } => {
                Value::Function(Rc::new(Function {
                    parameters: parameters.clone(),
                    body: body.clone(),
                }))
            }
            Expression::Call {
                function,
                arguments,
            } => self.eval_call(function, arguments)?,
            Expression::Method {
                receiver,
                name,
                arguments,
            } => self.eval_method(receiver, name, arguments)?,
            Expression::Index { left, index } => {
                let container = self.eval_expression(left)?;
                let index = self.eval_expression(index)?;
                index_value(&container, &index)?
            }
            Expression::If {
                condition,
                consequence,
                alternative,
            } => {
                if self.eval_condition(condition)? {
                    self.eval_block(consequence)?
                } else {
                    match alternative {
                        Some(alternative) => self.eval_block(alternative)?,
                        None => Value::Null,
                    }
                }
            }
            Expression::While { condition, body } => self.eval_loop(None, condition, None, body)?,
            Expression::For { r#loop, body } => match r#loop {
                ForLoop::Traditional {
                    init,
                    condition,
                    step,
                } => self.eval_loop(init.as_deref(), condition, step.as_deref(), body)?,
                ForLoop::In { variable, iterable } => {
                    self.eval_for_each(variable, iterable, body, true)?
                }
                ForLoop::Of { variable, iterable } => {
                    self.eval_for_each(variable, iterable, body, false)?
                }
            },
            Expression::Range {
                start,
                end,
                step,
                inclusive,
            } => self.eval_range(start, end, step.as_deref(), *inclusive)?,
            Expression::Pop { list, index } => self.eval_pop(list, index.as_deref())?,
            Expression::Push { value, list, index } => {
                self.eval_push(value, list, index.as_deref())?
            }
            Expression::Shift {
                source,
                destination,
            } => self.eval_shift(source, destination)?,
        };
        Ok(value)
    }

    fn eval_arguments(&mut self, arguments: &[Expression]) -> Result<Vec<Value>> {
        arguments
            .iter()
            .map(|argument| self.eval_expression(argument))
            .collect()
    }

    fn eval_condition(&mut self, condition: &Expression) -> Result<bool> {
        match self.eval_expression(condition)? {
            Value::Boolean(value) => Ok(value),
            other => bail!(RuntimeError::Type(format!(
                "condition must be a Boolean, got {}",
                other.kind()
            ))),
        }
    }

    fn eval_assign(
        &mut self,
        target: &Expression,
        value: &Expression,
        operator: Option<&Token>,
        is_ref: bool,
        is_const: bool,
        limit: Option<&Expression>,
    ) -> Result<Value> {
        if !target.is_location() {
            bail!(RuntimeError::Syntax(format!(
                "cannot assign to {}, expected an identifier or index",
                target
            )));
        }

        let value = match operator {
            Some(operator) => {
                let current = self.eval_expression(target)?;
                let right = self.eval_expression(value)?;
                operators::eval_binary(operator, &current, &right)?
            }
            None => self.eval_expression(value)?,
        };
        let limit = match limit {
            Some(limit) => {
                let limit = self.eval_expression(limit)?;
                access_limit(&limit)?
            }
            None => None,
        };

        self.assign_to(target, value, is_const, is_ref, limit)
    }

    fn assign_to(
        &mut self,
        target: &Expression,
        value: Value,
        is_const: bool,
        is_ref: bool,
        limit: Option<u64>,
    ) -> Result<Value> {
        match target {
            Expression::Identifier(name) => {
                self.env
                    .borrow_mut()
                    .assign(name, value, is_const, is_ref, limit)
            }
            Expression::Index { left, index } => {
                if is_const || limit.is_some() {
                    bail!(RuntimeError::Syntax(format!(
                        "{} is an element, only bindings can be constant or limited",
                        target
                    )));
                }
                let container = self.eval_expression(left)?;
                let index = self.eval_expression(index)?;
                assign_index(&container, &index, value, is_ref)
            }
            other => bail!(RuntimeError::Syntax(format!(
                "cannot assign to {}, expected an identifier or index",
                other
            ))),
        }
    }

    fn eval_unsign(&mut self, target: &Expression) -> Result<Value> {
        match target {
            Expression::Identifier(name) => self.env.borrow_mut().unsign(name),
            Expression::Index { left, index } => {
                let container = self.eval_expression(left)?;
                let index = self.eval_expression(index)?;
                take(&items_of(&container)?, &index)
            }
            other => bail!(RuntimeError::Syntax(format!(
                "cannot unsign {}, expected an identifier or index",
                other
            ))),
        }
    }

    fn eval_call(&mut self, function: &Expression, arguments: &[Expression]) -> Result<Value> {
        let arguments = self.eval_arguments(arguments)?;
        match self.eval_expression(function)? {
            Value::Function(function) => self.apply_function(&function, arguments),
            Value::NativeFunction(native) => {
                tracing::debug!(name = native.name, arity = arguments.len(), "native call");
                (native.call)(arguments, &self.env)
            }
            other => bail!(RuntimeError::Type(format!(
                "{} is not callable",
                other.kind()
            ))),
        }
    }

    #[tracing::instrument(level = "debug", skip_all, fields(parameters = ?function.parameters))]
    fn apply_function(&mut self, function: &Function, arguments: Vec<Value>) -> Result<Value> {
        if function.parameters.len() != arguments.len() {
            bail!(RuntimeError::Type(format!(
                "wrong number of arguments: want={}, got={}",
                function.parameters.len(),
                arguments.len()
            )));
        }

        self.env.borrow_mut().enter_call()?;
        let result = self.eval_function_body(function, arguments);
        self.env.borrow_mut().exit_call();
        result
    }

    /// Binds the parameters in the calling environment, runs the body and
    /// drops every binding of those names made since, so the caller's
    /// bindings of the same names are visible afterwards.
    fn eval_function_body(&mut self, function: &Function, arguments: Vec<Value>) -> Result<Value> {
        let mut bound = Vec::with_capacity(arguments.len());
        for (parameter, argument) in function.parameters.iter().zip(arguments) {
            let depth = self.env.borrow().depth(parameter);
            let assigned = self
                .env
                .borrow_mut()
                .assign(parameter, argument, false, false, None);
            if let Err(err) = assigned {
                self.release(&bound);
                return Err(err);
            }
            bound.push((parameter.as_str(), depth));
        }

        let result = self.eval_block(&function.body);
        self.release(&bound);
        result
    }

    fn release(&mut self, bound: &[(&str, usize)]) {
        let mut env = self.env.borrow_mut();
        for &(name, depth) in bound.iter().rev() {
            env.truncate(name, depth);
        }
    }

    fn eval_method(
        &mut self,
        receiver: &Expression,
        name: &str,
        arguments: &[Expression],
    ) -> Result<Value> {
        let receiver = self.eval_expression(receiver)?;
        let arguments = self.eval_arguments(arguments)?;

        let capabilities = receiver.capabilities();
        if capabilities.methods.is_empty() {
            bail!(RuntimeError::Type(format!(
                "type {} does not have any method",
                receiver.kind()
            )));
        }
        match capabilities.method(name) {
            Some(method) => method(&receiver, arguments),
            None => bail!(RuntimeError::Reference(format!(
                "type {} does not have method \"{}\"",
                receiver.kind(),
                name
            ))),
        }
    }

    fn check_budget(&self, iterations: usize) -> Result<()> {
        let max_iterations = self.env.borrow().limits().max_iterations;
        if iterations >= max_iterations {
            tracing::debug!(max_iterations, "loop budget exhausted");
            bail!(RuntimeError::Resource(format!(
                "loop exceeded {} iterations",
                max_iterations
            )));
        }
        Ok(())
    }

    /// Runs `while` and traditional `for` loops. A Null body ends the loop;
    /// a Control body ends it and is handed to the enclosing block.
    fn eval_loop(
        &mut self,
        init: Option<&Expression>,
        condition: &Expression,
        step: Option<&Expression>,
        body: &Block,
    ) -> Result<Value> {
        if let Some(init) = init {
            self.eval_expression(init)?;
        }

        let mut iterations = 0;
        while self.eval_condition(condition)? {
            self.check_budget(iterations)?;
            let result = self.eval_block(body)?;
            iterations += 1;
            match result {
                Value::Null => break,
                Value::Control(_) => return Ok(result),
                _ => {}
            }
            if let Some(step) = step {
                self.eval_expression(step)?;
            }
        }

        Ok(Value::number(iterations as f64))
    }

    fn eval_for_each(
        &mut self,
        variable: &str,
        iterable: &Expression,
        body: &Block,
        indices: bool,
    ) -> Result<Value> {
        let iterable = self.eval_expression(iterable)?;
        let capabilities = iterable.capabilities();
        let sequence = match (indices, capabilities.enumerate, capabilities.iterate) {
            (true, Some(enumerate), _) => enumerate(&iterable),
            (false, _, Some(iterate)) => iterate(&iterable),
            _ => bail!(RuntimeError::Type(format!(
                "cannot {} through type {}",
                if indices { "enumerate" } else { "iterate" },
                iterable.kind()
            ))),
        };

        for item in sequence.iter() {
            let depth = self.env.borrow().depth(variable);
            self.env
                .borrow_mut()
                .assign(variable, item.clone(), false, false, None)?;
            let result = self.eval_block(body);
            self.env.borrow_mut().truncate(variable, depth);
            match result? {
                Value::Null => break,
                control @ Value::Control(_) => return Ok(control),
                _ => {}
            }
        }

        Ok(Value::number(sequence.len() as f64))
    }

    fn eval_number(&mut self, what: &str, expression: &Expression) -> Result<f64> {
        match self.eval_expression(expression)? {
            Value::Number(cell) => Ok(cell.get()),
            other => bail!(RuntimeError::Type(format!(
                "{} must be a Number, got {}",
                what,
                other.kind()
            ))),
        }
    }

    fn eval_range(
        &mut self,
        start: &Expression,
        end: &Expression,
        step: Option<&Expression>,
        inclusive: bool,
    ) -> Result<Value> {
        let start = self.eval_number("range start", start)?;
        let end = self.eval_number("range end", end)?;
        let step = match step {
            Some(step) => self.eval_number("range step", step)?,
            None => 1.0,
        };

        if step == 0.0 || step.is_nan() {
            bail!(RuntimeError::Range(format!(
                "range step must be a non-zero Number, got {}",
                step
            )));
        }
        if !start.is_finite() || !end.is_finite() {
            bail!(RuntimeError::Range(format!(
                "range bounds must be finite, got {}..{}",
                start, end
            )));
        }

        if (end - start) / step >= MAX_LIST_LEN as f64 {
            bail!(RuntimeError::Range(format!(
                "range {}..{} exceeds {} elements",
                start, end, MAX_LIST_LEN
            )));
        }

        let within = |value: f64| match (step > 0.0, inclusive) {
            (true, true) => value <= end,
            (true, false) => value < end,
            (false, true) => value >= end,
            (false, false) => value > end,
        };
        let mut items = Vec::new();
        let mut value = start;
        while within(value) {
            items.push(Value::number(value));
            value = start + step * items.len() as f64;
        }

        Ok(Value::list(items))
    }

    fn eval_pop(&mut self, list: &Expression, index: Option<&Expression>) -> Result<Value> {
        let list = self.eval_expression(list)?;
        let index = match index {
            Some(index) => self.eval_expression(index)?,
            None => Value::number(0.0),
        };
        match &list {
            Value::List(items) => take(items, &index),
            _ => Ok(list),
        }
    }

    fn eval_push(
        &mut self,
        value: &Expression,
        list: &Expression,
        index: Option<&Expression>,
    ) -> Result<Value> {
        let value = self.eval_expression(value)?;
        let list = self.eval_expression(list)?;
        let Value::List(items) = &list else {
            bail!(RuntimeError::Type(format!(
                "cannot push into type {}",
                list.kind()
            )));
        };

        let len = items.borrow().len();
        let position = match index {
            Some(index) => clamp_position(self.eval_number("push index", index)?, len),
            None => len,
        };
        items.borrow_mut().insert(position, value.deep_copy());

        Ok(list)
    }

    /// `source -> destination` moves the source into the destination and
    /// yields what the destination held before.
    fn eval_shift(&mut self, source: &Expression, destination: &Expression) -> Result<Value> {
        if !destination.is_location() {
            bail!(RuntimeError::Syntax(format!(
                "cannot shift into {}, expected an identifier or index",
                destination
            )));
        }

        let snapshot = Rc::new(RefCell::new(self.env.borrow().clone()));
        let previous = Evaluator::with_environment(snapshot)
            .eval_expression(destination)
            .unwrap_or(Value::Null);

        let value = if source.is_location() {
            self.eval_unsign(source)?
        } else {
            self.eval_expression(source)?
        };
        self.assign_to(destination, value, false, true, None)?;

        Ok(previous)
    }
}

fn access_limit(limit: &Value) -> Result<Option<u64>> {
    match limit {
        Value::Number(cell) if cell.get() == f64::INFINITY => Ok(None),
        Value::Number(cell) if cell.get() >= 1.0 => Ok(Some(cell.get().round() as u64)),
        Value::Number(cell) => bail!(RuntimeError::Range(format!(
            "access limit must be at least 1, got {}",
            cell.get()
        ))),
        other => bail!(RuntimeError::Type(format!(
            "access limit must be a Number, got {}",
            other.kind()
        ))),
    }
}

fn items_of(container: &Value) -> Result<Rc<RefCell<Vec<Value>>>> {
    match container {
        Value::List(items) if container.capabilities().indexable => Ok(items.clone()),
        other => bail!(RuntimeError::Type(format!(
            "type {} is not indexable",
            other.kind()
        ))),
    }
}

/// Resolves a possibly negative index against `len`.
fn position(index: f64, len: usize) -> Option<usize> {
    let index = index.round();
    let index = if index < 0.0 { index + len as f64 } else { index };
    if (0.0..len as f64).contains(&index) {
        Some(index as usize)
    } else {
        None
    }
}

/// Like `position`, but clamps into `0..=len` instead of failing.
fn clamp_position(index: f64, len: usize) -> usize {
    let index = index.round();
    let index = if index < 0.0 { index + len as f64 } else { index };
    index.clamp(0.0, len as f64) as usize
}

fn out_of_range(index: f64, len: usize) -> RuntimeError {
    RuntimeError::Range(format!(
        "index {} is out of range for a List of length {}",
        index, len
    ))
}

fn index_value(container: &Value, index: &Value) -> Result<Value> {
    let items = items_of(container)?;
    match index {
        Value::Number(cell) => {
            let items = items.borrow();
            match position(cell.get(), items.len()) {
                Some(position) => Ok(items[position].clone()),
                None => bail!(out_of_range(cell.get(), items.len())),
            }
        }
        Value::List(indices) => {
            let indices = indices.borrow().clone();
            let values = indices
                .iter()
                .map(|index| index_value(container, index))
                .collect::<Result<Vec<Value>>>()?;
            Ok(Value::list(values))
        }
        other => bail!(RuntimeError::Type(format!(
            "index must be a Number or a List of Numbers, got {}",
            other.kind()
        ))),
    }
}

fn assign_index(container: &Value, index: &Value, value: Value, is_ref: bool) -> Result<Value> {
    let items = items_of(container)?;
    match index {
        Value::Number(cell) => {
            let value = if is_ref { value } else { value.deep_copy() };
            let mut items = items.borrow_mut();
            let position = clamp_position(cell.get(), items.len());
            if position == items.len() {
                items.push(value.clone());
            } else {
                items[position] = value.clone();
            }
            Ok(value)
        }
        Value::List(indices) => {
            let indices = indices.borrow().clone();
            let Value::List(values) = &value else {
                bail!(RuntimeError::Type(format!(
                    "assigning to {} indices needs a List, got {}",
                    indices.len(),
                    value.kind()
                )));
            };
            let values = values.borrow().clone();
            if values.len() != indices.len() {
                bail!(RuntimeError::Range(format!(
                    "cannot assign {} values to {} indices",
                    values.len(),
                    indices.len()
                )));
            }
            for (index, item) in indices.iter().zip(values) {
                assign_index(container, index, item, is_ref)?;
            }
            Ok(value)
        }
        other => bail!(RuntimeError::Type(format!(
            "index must be a Number or a List of Numbers, got {}",
            other.kind()
        ))),
    }
}

/// Removes the addressed element(s). Vector positions refer to the list as
/// it was before any removal.
fn take(items: &Rc<RefCell<Vec<Value>>>, index: &Value) -> Result<Value> {
    let len = items.borrow().len();
    if len == 0 {
        bail!(RuntimeError::Range(
            "cannot remove from an empty List".to_string()
        ));
    }

    let resolve = |index: &Value| match index {
        Value::Number(cell) => position(cell.get(), len).ok_or_else(|| out_of_range(cell.get(), len)),
        other => Err(RuntimeError::Type(format!(
            "index must be a Number or a List of Numbers, got {}",
            other.kind()
        ))),
    };

    match index {
        Value::List(indices) => {
            let positions = indices
                .borrow()
                .iter()
                .map(resolve)
                .collect::<Result<Vec<usize>, RuntimeError>>()?;
            let mut items = items.borrow_mut();
            let removed = positions.iter().map(|p| items[*p].clone()).collect();

            let mut descending = positions;
            descending.sort_unstable_by(|a, b| b.cmp(a));
            descending.dedup();
            for position in descending {
                items.remove(position);
            }
            Ok(Value::list(removed))
        }
        index => {
            let position = resolve(index)?;
            Ok(items.borrow_mut().remove(position))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{lexer::Lexer, parser::Parser};

    #[test]
    fn test_eval_number_expression() {
        let tests = vec![
            ("5", 5.0),
            ("-5", -5.0),
            ("5 + 5 + 5 + 5 - 10", 10.0),
            ("2 * 2 * 2 * 2 * 2", 32.0),
            ("-50 + 100 + -50", 0.0),
            ("5 * 2 + 10", 20.0),
            ("5 + 2 * 10", 25.0),
            ("50 / 2 * 2 + 10", 60.0),
            ("2 * (5 + 10)", 30.0),
            ("(5 + 10 * 2 + 15 / 3) * 2 + -10", 50.0),
            ("7 % 4", 3.0),
            ("7.5 % 2", 1.5),
            ("1 / 4", 0.25),
        ];
        for (input, expected) in tests {
            assert_eq!(test_eval(input).unwrap(), Value::number(expected), "{input}");
        }
    }

    #[test]
    fn test_eval_boolean_expression() {
        let tests = vec![
            ("true", true),
            ("1 < 2", true),
            ("1 > 2", false),
            ("1 <= 1", true),
            ("2 >= 3", false),
            ("1 == 1", true),
            ("true == false", false),
            ("!true", false),
            ("!!false", false),
            ("true && false", false),
            ("false || true", true),
            ("(1 < 2) == true", true),
            ("'a' < 'b'", true),
            ("\"ab\" == \"ab\"", true),
            ("null == null", true),
            ("[1, [2]] == [1, [2]]", true),
        ];
        for (input, expected) in tests {
            assert_eq!(test_eval(input).unwrap(), Value::Boolean(expected), "{input}");
        }
    }

    #[test]
    fn test_broadcasting() {
        let tests = vec![
            ("[1, 2, 3] + 10 == [11, 12, 13]", true),
            ("[1, 2] + [3, 4] == [4, 6]", true),
            ("10 - [1, 2] == [9, 8]", true),
            ("[1, 2] * -1 == [2, 1]", true),
            ("-[1, 2] == [-1, -2]", true),
            ("\"ab\" + 'c' == \"abc\"", true),
        ];
        for (input, expected) in tests {
            assert_eq!(test_eval(input).unwrap(), Value::Boolean(expected), "{input}");
        }
    }

    #[test]
    fn test_error_handling() {
        let tests = vec![
            (
                "5 + true",
                RuntimeError::Type(
                    "Addition is not defined between type Number and Boolean".to_string(),
                ),
            ),
            (
                "foobar",
                RuntimeError::Reference("\"foobar\" is not bound".to_string()),
            ),
            (
                "1 ? { 2 }",
                RuntimeError::Type("condition must be a Boolean, got Number".to_string()),
            ),
            (
                "[1, 2][2]",
                RuntimeError::Range("index 2 is out of range for a List of length 2".to_string()),
            ),
            (
                "[1, 2][true]",
                RuntimeError::Type(
                    "index must be a Number or a List of Numbers, got Boolean".to_string(),
                ),
            ),
            (
                "5[0]",
                RuntimeError::Type("type Number is not indexable".to_string()),
            ),
            (
                "f = (a) => a; f(1, 2)",
                RuntimeError::Type("wrong number of arguments: want=1, got=2".to_string()),
            ),
            (
                "5(1)",
                RuntimeError::Type("Number is not callable".to_string()),
            ),
            (
                "k :: 1; k = 2",
                RuntimeError::Type("cannot assign to constant \"k\"".to_string()),
            ),
            (
                "1 = 2",
                RuntimeError::Syntax(
                    "cannot assign to 1, expected an identifier or index".to_string(),
                ),
            ),
            (
                "a = 1; a -> 2",
                RuntimeError::Syntax(
                    "cannot shift into 2, expected an identifier or index".to_string(),
                ),
            ),
            (
                "true.length",
                RuntimeError::Type("type Boolean does not have any method".to_string()),
            ),
            (
                "[1].missing()",
                RuntimeError::Reference("type List does not have method \"missing\"".to_string()),
            ),
            (
                "0..5..0",
                RuntimeError::Range("range step must be a non-zero Number, got 0".to_string()),
            ),
        ];
        for (input, expected) in tests {
            let err = test_eval(input).unwrap_err();
            assert_eq!(err.downcast_ref::<RuntimeError>(), Some(&expected), "{input}");
        }
    }

    #[test]
    fn test_assignment_pushes_bindings() {
        let tests = vec![
            ("x = 1; x", 1.0),
            ("x = 1; x = 2; x", 2.0),
            ("x = 1; x = 2; *x", 2.0),
            ("x = 1; x = 2; *x; x", 1.0),
            ("x = 2; x += 3; x", 5.0),
            ("x = 2; x *= 3; *x; x", 2.0),
            ("x = 5; x++; x", 6.0),
            ("x = 5; x++", 5.0),
            ("x = 5; ++x", 6.0),
            ("x = 5; y = x; x++; y", 5.0),
        ];
        for (input, expected) in tests {
            assert_eq!(test_eval(input).unwrap(), Value::number(expected), "{input}");
        }
    }

    #[test]
    fn test_access_limits() {
        assert_eq!(test_eval("x$2 = 5; x + x").unwrap(), Value::number(10.0));
        assert_eq!(test_eval("x$2 = 5; lifetime(\"x\")").unwrap(), Value::number(2.0));
        assert_eq!(test_eval("x = 1; x$1 = 5; x; x").unwrap(), Value::number(1.0));
        assert_eq!(
            test_eval("x$(1 / 0) = 1; lifetime(\"x\")").unwrap(),
            Value::number(f64::INFINITY)
        );

        let err = test_eval("x$2 = 5; x; x; x").unwrap_err();
        assert_eq!(
            err.downcast_ref::<RuntimeError>(),
            Some(&RuntimeError::Reference("\"x\" is not bound".to_string()))
        );
        assert!(test_eval("x$0 = 5").is_err());
    }

    #[test]
    fn test_value_and_reference_assignment() {
        let tests = vec![
            ("a = [1]; b = a; a[1] = 2; b", "[1]"),
            ("a = [1]; b &= a; a[1] = 2; b", "[1, 2]"),
            ("a = [1]; b = a; b.push(2); a", "[1]"),
            ("a = [1]; b &= a; b.push(2); a", "[1, 2]"),
            ("a = [[1]]; b = a[0]; b.push(2); a", "[[1]]"),
        ];
        for (input, expected) in tests {
            assert_eq!(test_eval(input).unwrap().to_print(), expected, "{input}");
        }
    }

    #[test]
    fn test_indexing() {
        let tests = vec![
            ("[1, 2, 3][0]", "1"),
            ("[1, 2, 3][-1]", "3"),
            ("[1, 2, 3][1.4]", "2"),
            ("[1, 2, 3][[0, 2]]", "[1, 3]"),
            ("\"hey\"[1]", "'e'"),
            ("l = [1, 2, 3]; l[[0, 2]] = [9, 8]; l[[0, 2]] == [9, 8]", "true"),
            ("l = [1, 2, 3]; l[[0, 2]] = [9, 8]; l[1]", "2"),
            ("l = [1, 2]; l[5] = 3; l", "[1, 2, 3]"),
            ("l = [1, 2]; l[-1] = 0; l", "[1, 0]"),
            ("l = [1, 2]; l[-9] = 0; l", "[0, 2]"),
            ("l = [1, 2, 3]; *l[1]; l", "[1, 3]"),
            ("l = [1, 2, 3]; *l[[0, 2]]", "[1, 3]"),
            ("m = [[1, 2], [3]]; m[0][1] = 5; m", "[[1, 5], [3]]"),
        ];
        for (input, expected) in tests {
            assert_eq!(test_eval(input).unwrap().to_print(), expected, "{input}");
        }

        let err = test_eval("l = [1, 2]; l[[0, 1]] = [1]").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<RuntimeError>(),
            Some(RuntimeError::Range(_))
        ));
    }

    #[test]
    fn test_functions() {
        let tests = vec![
            ("identity = (x) => x; identity(5)", 5.0),
            ("identity = (x) => { x }; identity(5)", 5.0),
            ("double = (x) => x * 2; double(5)", 10.0),
            ("add = (x, y) => x + y; add(5 + 5, add(5, 5))", 20.0),
            ("((x) => x)(5)", 5.0),
            ("x = 1; f = (x) => x * 10; f(2); x", 1.0),
            (
                "fib = (n) => n < 2 ? n : fib(n - 1) + fib(n - 2); fib(10)",
                55.0,
            ),
            ("n = 0; bump = () => n++; bump(); bump(); n", 2.0),
            ("x = 1; f = (x) => *x; f(2); x", 1.0),
            ("x = 1; f = (x) => { x = 5 }; f(2); x", 1.0),
            ("x = 1; f = (x) => { x = 5; x = 6 }; f(2)", 6.0),
        ];
        for (input, expected) in tests {
            assert_eq!(test_eval(input).unwrap(), Value::number(expected), "{input}");
        }
        assert_eq!(
            test_eval("(a, b) => { a + b }").unwrap().to_print(),
            "(a, b) => { (a + b) }"
        );

        let err = test_eval("f = (y) => { y = 5 }; f(2); y").unwrap_err();
        assert_eq!(err.to_string(), "ReferenceError: \"y\" is not bound");
    }

    #[test]
    fn test_call_depth() {
        let mut evaluator = Evaluator::with_limits(Limits {
            max_call_depth: 20,
            ..Limits::default()
        });
        let before = evaluator.environment().borrow().binding_count();
        let err = eval_with(&mut evaluator, "f = (n) => f(n + 1); f(0)").unwrap_err();
        assert_eq!(
            err.downcast_ref::<RuntimeError>(),
            Some(&RuntimeError::Resource(
                "call depth exceeded 20 nested calls".to_string()
            ))
        );
        assert_eq!(evaluator.environment().borrow().binding_count(), before + 1);
        assert!(!evaluator.environment().borrow().is_bound("n"));

        assert_eq!(
            eval_with(&mut evaluator, "d = (n) => n == 0 ? 0 : d(n - 1); d(19)").unwrap(),
            Value::number(0.0)
        );
    }

    #[test]
    fn test_parameters_are_released() {
        let mut evaluator = Evaluator::new();
        let before = evaluator.environment().borrow().binding_count();
        eval_with(&mut evaluator, "f = (a, b) => a + b; f(1, 2)").unwrap();
        assert_eq!(evaluator.environment().borrow().binding_count(), before + 1);
        assert!(!evaluator.environment().borrow().is_bound("a"));
    }

    #[test]
    fn test_conditionals() {
        let tests = vec![
            ("true ? { 10 }", "10"),
            ("false ? { 10 }", "null"),
            ("1 < 2 ? 10 : 20", "10"),
            ("1 > 2 ? 10 : 20", "20"),
            ("x = 3; x == 3 ? { \"three\" } : { \"other\" }", "\"three\""),
        ];
        for (input, expected) in tests {
            assert_eq!(test_eval(input).unwrap().to_print(), expected, "{input}");
        }
    }

    #[test]
    fn test_control_carry() {
        let tests = vec![
            ("{ 1; break; 2 }", "null"),
            ("{ 1; continue; 2 }", "true"),
            ("{ { break }; 3 }", "3"),
            ("{ { break#; 1 }; 3 }", "null"),
            ("x = 0; { { { break##; x = 1 }; x = 2 }; x = 3 }; x", "0"),
            ("x = 0; { { break#; x = 1 }; x = 2 }; x", "0"),
            ("x = 0; { { break; x = 1 }; x = 2 }; x", "2"),
        ];
        for (input, expected) in tests {
            assert_eq!(test_eval(input).unwrap().to_print(), expected, "{input}");
        }
    }

    #[test]
    fn test_loops() {
        let tests = vec![
            ("i = 0; while (i < 3) { i++ }", "3"),
            ("i = 0; while (i < 3) { i++ }; i", "3"),
            ("i = 0; while (i < 10) { i == 4 ? { break# }; i++ }; i", "4"),
            ("i = 0; while (true) { i++ < 2 ? 1 : null }", "3"),
            ("s = 0; for (i = 0; i < 4; i++) { s += i }; s", "6"),
            ("for (i = 0; i < 4; i++) { i }", "4"),
            ("s = 0; for (x of [1, 2, 3]) { s += x }; s", "6"),
            ("s = []; for (i in \"abc\") { i >> s }; s", "[0, 1, 2]"),
            ("for (x of [5, 6]) { x }", "2"),
            ("x = 9; for (x of [5, 6]) { x }; x", "9"),
            ("x = 9; for (x of [5, 6]) { *x }; x", "9"),
            ("x = 9; for (x of [5, 6]) { x = 0 }; x", "9"),
            ("s = 0; for (x of [1, 2, 3, 4]) { x == 3 ? { break# }; s += x }; s", "3"),
        ];
        for (input, expected) in tests {
            assert_eq!(test_eval(input).unwrap().to_print(), expected, "{input}");
        }

        let err = test_eval("for (x of 5) { x }").unwrap_err();
        assert_eq!(err.to_string(), "TypeError: cannot iterate through type Number");
    }

    #[test]
    fn test_loop_budget() {
        let mut evaluator = Evaluator::with_limits(Limits {
            max_iterations: 50,
            ..Limits::default()
        });
        let err = eval_with(&mut evaluator, "i = 0; while (true) { i++ }").unwrap_err();
        assert_eq!(
            err.downcast_ref::<RuntimeError>(),
            Some(&RuntimeError::Resource(
                "loop exceeded 50 iterations".to_string()
            ))
        );
        assert_eq!(eval_with(&mut evaluator, "i").unwrap(), Value::number(50.0));

        assert_eq!(
            eval_with(&mut evaluator, "j = 0; while (j < 50) { j++ }").unwrap(),
            Value::number(50.0)
        );
    }

    #[test]
    fn test_binding_cap() {
        let mut evaluator = Evaluator::with_limits(Limits {
            max_bindings: 40,
            ..Limits::default()
        });
        let live = evaluator.environment().borrow().binding_count();
        for n in live..40 {
            eval_with(&mut evaluator, &format!("x = {n}")).unwrap();
        }

        let err = eval_with(&mut evaluator, "y = 1").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<RuntimeError>(),
            Some(RuntimeError::Resource(_))
        ));
        assert_eq!(evaluator.environment().borrow().binding_count(), 40);
        assert!(!evaluator.environment().borrow().is_bound("y"));
    }

    #[test]
    fn test_shift() {
        let tests = vec![
            ("a = 5; b = 1; a -> b", "1"),
            ("a = 5; b = 1; a -> b; b", "5"),
            ("a = 5; a -> b", "null"),
            ("l = [1, 2]; a = 9; a -> l[0]", "1"),
            ("l = [1, 2]; a = 9; a -> l[0]; l", "[9, 2]"),
            ("l = [1, 2]; l[0] -> x; [x, l]", "[1, [2]]"),
            ("7 -> x; x", "7"),
            ("n = 0; bump = () => { n++; 0 }; l = [1]; a = 5; a -> l[bump()]; n", "1"),
            ("k$1 = 0; peek = () => k; l = [1]; a = 5; a -> l[peek()]", "1"),
            ("k$1 = 0; peek = () => k; l = [1]; a = 5; a -> l[peek()]; l", "[5]"),
            ("k$2 = 0; l = [1]; a = 5; a -> l[k]; lifetime(\"k\")", "1"),
        ];
        for (input, expected) in tests {
            assert_eq!(test_eval(input).unwrap().to_print(), expected, "{input}");
        }

        let err = test_eval("a = 5; b = 1; a -> b; a").unwrap_err();
        assert_eq!(
            err.downcast_ref::<RuntimeError>(),
            Some(&RuntimeError::Reference("\"a\" is not bound".to_string()))
        );
    }

    #[test]
    fn test_shift_keeps_identity() {
        assert_eq!(
            test_eval("l = [1]; m &= l; l -> k; k.push(2); m").unwrap().to_print(),
            "[1, 2]"
        );
    }

    #[test]
    fn test_ranges() {
        let tests = vec![
            ("0..3", "[0, 1, 2]"),
            ("0..=3", "[0, 1, 2, 3]"),
            ("..3", "[0, 1, 2]"),
            ("0..10..3", "[0, 3, 6, 9]"),
            ("3..0..-1", "[3, 2, 1]"),
            ("3..=0..-1", "[3, 2, 1, 0]"),
            ("0..1..0.25", "[0, 0.25, 0.5, 0.75]"),
            ("5..1", "[]"),
        ];
        for (input, expected) in tests {
            assert_eq!(test_eval(input).unwrap().to_print(), expected, "{input}");
        }
        assert!(test_eval("0..true").is_err());

        let err = test_eval("0..100000000000").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<RuntimeError>(),
            Some(RuntimeError::Range(_))
        ));
    }

    #[test]
    fn test_pop_and_push() {
        let tests = vec![
            ("l = [1, 2, 3]; << l", "1"),
            ("l = [1, 2, 3]; << l; l", "[2, 3]"),
            ("l = [1, 2, 3]; <<(-1) l", "3"),
            ("l = [1, 2, 3, 4]; <<([0, 2]) l", "[1, 3]"),
            ("l = [1, 2, 3, 4]; <<([0, 2]) l; l", "[2, 4]"),
            ("<< 5", "5"),
            ("l = [1]; 2 >> l", "[1, 2]"),
            ("l = [1]; 0 >>(0) l; l", "[0, 1]"),
            ("l = [1, 3]; 2 >>(1) l", "[1, 2, 3]"),
            ("l = [1]; 2 >>(99) l", "[1, 2]"),
            ("l = []; v = [1]; v >> l; v.push(2); l", "[[1]]"),
        ];
        for (input, expected) in tests {
            assert_eq!(test_eval(input).unwrap().to_print(), expected, "{input}");
        }

        let err = test_eval("l = []; << l").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<RuntimeError>(),
            Some(RuntimeError::Range(_))
        ));
    }

    #[test]
    fn test_methods() {
        let tests = vec![
            ("[1, 2, 3].length", "3"),
            ("[1, 2, 3].length()", "3"),
            ("l = [1]; l.push(2, 3); l", "[1, 2, 3]"),
            ("[1, 2].reverse()", "[2, 1]"),
            ("[1, 2].contains(2)", "true"),
            ("[1, 2].join(\", \")", "\"1, 2\""),
            ("\"Hey\".upper()", "\"HEY\""),
            ("\"  hey \".trim()", "\"hey\""),
            ("\"a b\".split()", "[\"a\", \"b\"]"),
            ("n = 3.14159; n.toFixed(2); n", "3.14"),
        ];
        for (input, expected) in tests {
            assert_eq!(test_eval(input).unwrap().to_print(), expected, "{input}");
        }
    }

    #[test]
    fn test_trace() {
        let mut evaluator = Evaluator::new();
        eval_with(&mut evaluator, "1; 2; 3").unwrap();
        let trace = evaluator.trace();
        assert_eq!(trace[..3], [Value::number(3.0), Value::number(2.0), Value::number(1.0)]);
    }

    fn eval_with(evaluator: &mut Evaluator, input: &str) -> Result<Value> {
        let lexer = Lexer::new(input);
        let mut parser = Parser::new(lexer);
        let program = parser.parse_program().unwrap();
        evaluator.eval(&program)
    }

    fn test_eval(input: &str) -> Result<Value> {
        let mut evaluator = Evaluator::new();
        eval_with(&mut evaluator, input)
    }
}
