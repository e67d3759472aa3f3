use std::{cell::RefCell, fmt, rc::Rc};

use anyhow::{bail, Result};

use super::{
    error::RuntimeError,
    natives::expect_args,
    value::{Value, ValueKind, MAX_LIST_LEN},
};
use crate::ast::ControlKind;

pub type BinaryCapability = fn(&Value, &Value) -> Result<Option<Value>>;
pub type Method = fn(&Value, Vec<Value>) -> Result<Value>;

/// The per-kind table of optional behaviours. A missing entry only fails
/// when something tries to use it.
pub struct Capabilities {
    pub add: Option<BinaryCapability>,
    pub sub: Option<BinaryCapability>,
    pub mul: Option<BinaryCapability>,
    pub div: Option<BinaryCapability>,
    pub modulo: Option<BinaryCapability>,
    pub equal: Option<BinaryCapability>,
    pub greater: Option<BinaryCapability>,
    pub lesser: Option<BinaryCapability>,
    pub greater_eq: Option<BinaryCapability>,
    pub lesser_eq: Option<BinaryCapability>,
    pub and: Option<BinaryCapability>,
    pub or: Option<BinaryCapability>,

    pub length: Option<fn(&Value) -> usize>,
    pub enumerate: Option<fn(&Value) -> Vec<Value>>,
    pub iterate: Option<fn(&Value) -> Vec<Value>>,
    pub indexable: bool,

    pub to_string: Option<fn(&Value) -> String>,
    pub to_number: Option<fn(&Value) -> f64>,
    pub to_print: Option<fn(&Value) -> String>,

    pub methods: &'static [(&'static str, Method)],
}

impl Capabilities {
    pub fn method(&self, name: &str) -> Option<Method> {
        self.methods
            .iter()
            .find(|(method, _)| *method == name)
            .map(|(_, method)| *method)
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Operation {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Equal,
    Greater,
    Lesser,
    GreaterEq,
    LesserEq,
    And,
    Or,
}

impl Operation {
    pub fn select(self, capabilities: &Capabilities) -> Option<BinaryCapability> {
        match self {
            Operation::Add => capabilities.add,
            Operation::Sub => capabilities.sub,
            Operation::Mul => capabilities.mul,
            Operation::Div => capabilities.div,
            Operation::Mod => capabilities.modulo,
            Operation::Equal => capabilities.equal,
            Operation::Greater => capabilities.greater,
            Operation::Lesser => capabilities.lesser,
            Operation::GreaterEq => capabilities.greater_eq,
            Operation::LesserEq => capabilities.lesser_eq,
            Operation::And => capabilities.and,
            Operation::Or => capabilities.or,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            Operation::Add => "Addition",
            Operation::Sub => "Subtraction",
            Operation::Mul => "Multiplication",
            Operation::Div => "Division",
            Operation::Mod => "Modulus",
            Operation::Equal => "Equality",
            Operation::Greater => "Greater than comparison",
            Operation::Lesser => "Lesser than comparison",
            Operation::GreaterEq => "Greater than or equal comparison",
            Operation::LesserEq => "Lesser than or equal comparison",
            Operation::And => "Logical and",
            Operation::Or => "Logical or",
        };
        write!(f, "{}", name)
    }
}

/// Calls the capability selected by `operation` on the left operand.
/// `Ok(None)` means the pair of operands is not supported.
pub fn dispatch(operation: Operation, left: &Value, right: &Value) -> Result<Option<Value>> {
    match operation.select(left.capabilities()) {
        Some(capability) => capability(left, right),
        None => Ok(None),
    }
}

pub fn of(kind: ValueKind) -> &'static Capabilities {
    match kind {
        ValueKind::Null => &NULL,
        ValueKind::Number => &NUMBER,
        ValueKind::Boolean => &BOOLEAN,
        ValueKind::Character => &CHARACTER,
        ValueKind::List => &LIST,
        ValueKind::Function | ValueKind::NativeFunction => &CALLABLE,
        ValueKind::Control | ValueKind::None => &INTERNAL,
    }
}

/// `toString` when the kind has one, the printed form otherwise.
pub fn to_text(value: &Value) -> String {
    match value.capabilities().to_string {
        Some(to_string) => to_string(value),
        None => value.to_print(),
    }
}

pub fn format_number(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else if value.is_infinite() {
        if value > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else if value == 0.0 {
        "0".to_string()
    } else {
        format!("{}", value)
    }
}

const NONE: Capabilities = Capabilities {
    add: None,
    sub: None,
    mul: None,
    div: None,
    modulo: None,
    equal: None,
    greater: None,
    lesser: None,
    greater_eq: None,
    lesser_eq: None,
    and: None,
    or: None,
    length: None,
    enumerate: None,
    iterate: None,
    indexable: false,
    to_string: None,
    to_number: None,
    to_print: None,
    methods: &[],
};

static NULL: Capabilities = Capabilities {
    to_string: Some(null_to_string as fn(&Value) -> String),
    to_number: Some(null_to_number as fn(&Value) -> f64),
    to_print: Some(null_to_string as fn(&Value) -> String),
    ..NONE
};

static NUMBER: Capabilities = Capabilities {
    add: Some(number_add as BinaryCapability),
    sub: Some(number_sub as BinaryCapability),
    mul: Some(number_mul as BinaryCapability),
    div: Some(number_div as BinaryCapability),
    modulo: Some(number_mod as BinaryCapability),
    equal: Some(number_equal as BinaryCapability),
    greater: Some(number_greater as BinaryCapability),
    lesser: Some(number_lesser as BinaryCapability),
    greater_eq: Some(number_greater_eq as BinaryCapability),
    lesser_eq: Some(number_lesser_eq as BinaryCapability),
    to_string: Some(number_to_string as fn(&Value) -> String),
    to_number: Some(number_to_number as fn(&Value) -> f64),
    to_print: Some(number_to_string as fn(&Value) -> String),
    methods: &[("toFixed", number_to_fixed as Method)],
    ..NONE
};

static BOOLEAN: Capabilities = Capabilities {
    equal: Some(boolean_equal as BinaryCapability),
    and: Some(boolean_and as BinaryCapability),
    or: Some(boolean_or as BinaryCapability),
    to_string: Some(boolean_to_string as fn(&Value) -> String),
    to_number: Some(boolean_to_number as fn(&Value) -> f64),
    to_print: Some(boolean_to_string as fn(&Value) -> String),
    ..NONE
};

static CHARACTER: Capabilities = Capabilities {
    add: Some(character_add as BinaryCapability),
    equal: Some(character_equal as BinaryCapability),
    greater: Some(character_greater as BinaryCapability),
    lesser: Some(character_lesser as BinaryCapability),
    greater_eq: Some(character_greater_eq as BinaryCapability),
    lesser_eq: Some(character_lesser_eq as BinaryCapability),
    to_string: Some(character_to_string as fn(&Value) -> String),
    to_number: Some(character_to_number as fn(&Value) -> f64),
    to_print: Some(character_to_print as fn(&Value) -> String),
    ..NONE
};

static LIST: Capabilities = Capabilities {
    add: Some(list_add as BinaryCapability),
    sub: Some(list_sub as BinaryCapability),
    mul: Some(list_mul as BinaryCapability),
    div: Some(list_div as BinaryCapability),
    modulo: Some(list_mod as BinaryCapability),
    equal: Some(list_equal as BinaryCapability),
    length: Some(list_length as fn(&Value) -> usize),
    enumerate: Some(list_enumerate as fn(&Value) -> Vec<Value>),
    iterate: Some(list_iterate as fn(&Value) -> Vec<Value>),
    indexable: true,
    to_string: Some(list_to_string as fn(&Value) -> String),
    to_number: Some(list_to_number as fn(&Value) -> f64),
    to_print: Some(list_to_print as fn(&Value) -> String),
    methods: &[
        ("length", list_length_method as Method),
        ("push", list_push as Method),
        ("reverse", list_reverse as Method),
        ("contains", list_contains as Method),
        ("join", list_join as Method),
        ("upper", text_upper as Method),
        ("lower", text_lower as Method),
        ("trim", text_trim as Method),
        ("split", text_split as Method),
    ],
    ..NONE
};

static CALLABLE: Capabilities = Capabilities {
    to_string: Some(callable_to_print as fn(&Value) -> String),
    to_print: Some(callable_to_print as fn(&Value) -> String),
    ..NONE
};

static INTERNAL: Capabilities = Capabilities {
    to_print: Some(internal_to_print as fn(&Value) -> String),
    ..NONE
};

fn null_to_string(_: &Value) -> String {
    "null".to_string()
}

fn null_to_number(_: &Value) -> f64 {
    0.0
}

/// Applies `operation` to every pair, failing as a whole when one pair is
/// unsupported.
fn collect(
    operation: Operation,
    pairs: impl Iterator<Item = (Value, Value)>,
) -> Result<Option<Value>> {
    let mut out = Vec::new();
    for (left, right) in pairs {
        match dispatch(operation, &left, &right)? {
            Some(value) => out.push(value),
            None => return Ok(None),
        }
    }
    Ok(Some(Value::list(out)))
}

fn number_arithmetic(
    operation: Operation,
    left: &Value,
    right: &Value,
    op: fn(f64, f64) -> f64,
) -> Result<Option<Value>> {
    match (left, right) {
        (Value::Number(l), Value::Number(r)) => Ok(Some(Value::number(op(l.get(), r.get())))),
        (Value::Number(_), Value::List(items)) => {
            let items = items.borrow().clone();
            collect(operation, items.into_iter().map(|item| (left.clone(), item)))
        }
        _ => Ok(None),
    }
}

fn number_compare(left: &Value, right: &Value, op: fn(f64, f64) -> bool) -> Result<Option<Value>> {
    match (left, right) {
        (Value::Number(l), Value::Number(r)) => Ok(Some(Value::Boolean(op(l.get(), r.get())))),
        _ => Ok(None),
    }
}

fn number_add(left: &Value, right: &Value) -> Result<Option<Value>> {
    number_arithmetic(Operation::Add, left, right, |l, r| l + r)
}

fn number_sub(left: &Value, right: &Value) -> Result<Option<Value>> {
    number_arithmetic(Operation::Sub, left, right, |l, r| l - r)
}

fn number_mul(left: &Value, right: &Value) -> Result<Option<Value>> {
    number_arithmetic(Operation::Mul, left, right, |l, r| l * r)
}

fn number_div(left: &Value, right: &Value) -> Result<Option<Value>> {
    number_arithmetic(Operation::Div, left, right, |l, r| l / r)
}

fn number_mod(left: &Value, right: &Value) -> Result<Option<Value>> {
    number_arithmetic(Operation::Mod, left, right, |l, r| l % r)
}

fn number_equal(left: &Value, right: &Value) -> Result<Option<Value>> {
    number_compare(left, right, |l, r| l == r)
}

fn number_greater(left: &Value, right: &Value) -> Result<Option<Value>> {
    number_compare(left, right, |l, r| l > r)
}

fn number_lesser(left: &Value, right: &Value) -> Result<Option<Value>> {
    number_compare(left, right, |l, r| l < r)
}

fn number_greater_eq(left: &Value, right: &Value) -> Result<Option<Value>> {
    number_compare(left, right, |l, r| l >= r)
}

fn number_lesser_eq(left: &Value, right: &Value) -> Result<Option<Value>> {
    number_compare(left, right, |l, r| l <= r)
}

fn number_to_string(value: &Value) -> String {
    format_number(value.as_number().unwrap_or(f64::NAN))
}

fn number_to_number(value: &Value) -> f64 {
    value.as_number().unwrap_or(f64::NAN)
}

/// Rounds the number in place and returns it.
fn number_to_fixed(receiver: &Value, args: Vec<Value>) -> Result<Value> {
    expect_args("toFixed", &args, 0, 1)?;
    let digits = match args.first() {
        None => 1.0,
        Some(Value::Number(digits)) => digits.get(),
        Some(other) => bail!(RuntimeError::Type(format!(
            "toFixed expects a Number of digits, got {}",
            other.kind()
        ))),
    };
    if !(0.0..=100.0).contains(&digits) {
        bail!(RuntimeError::Range(format!(
            "toFixed digits must be between 0 and 100, got {}",
            format_number(digits)
        )));
    }
    if let Value::Number(cell) = receiver {
        let factor = 10f64.powi(digits.round() as i32);
        cell.set((cell.get() * factor).round() / factor);
    }
    Ok(receiver.clone())
}

fn boolean_logic(left: &Value, right: &Value, op: fn(bool, bool) -> bool) -> Result<Option<Value>> {
    match (left, right) {
        (Value::Boolean(l), Value::Boolean(r)) => Ok(Some(Value::Boolean(op(*l, *r)))),
        _ => Ok(None),
    }
}

fn boolean_equal(left: &Value, right: &Value) -> Result<Option<Value>> {
    boolean_logic(left, right, |l, r| l == r)
}

fn boolean_and(left: &Value, right: &Value) -> Result<Option<Value>> {
    boolean_logic(left, right, |l, r| l && r)
}

fn boolean_or(left: &Value, right: &Value) -> Result<Option<Value>> {
    boolean_logic(left, right, |l, r| l || r)
}

fn boolean_to_string(value: &Value) -> String {
    match value {
        Value::Boolean(true) => "true".to_string(),
        _ => "false".to_string(),
    }
}

fn boolean_to_number(value: &Value) -> f64 {
    match value {
        Value::Boolean(true) => 1.0,
        _ => 0.0,
    }
}

fn character_compare(
    left: &Value,
    right: &Value,
    op: fn(char, char) -> bool,
) -> Result<Option<Value>> {
    match (left, right) {
        (Value::Character(l), Value::Character(r)) => Ok(Some(Value::Boolean(op(*l, *r)))),
        _ => Ok(None),
    }
}

fn character_add(left: &Value, right: &Value) -> Result<Option<Value>> {
    let Value::Character(c) = left else {
        return Ok(None);
    };
    match right {
        Value::Character(other) => Ok(Some(Value::list(vec![
            Value::Character(*c),
            Value::Character(*other),
        ]))),
        Value::List(_) => Ok(right.as_text().map(|text| Value::string(&format!("{c}{text}")))),
        _ => Ok(None),
    }
}

fn character_equal(left: &Value, right: &Value) -> Result<Option<Value>> {
    character_compare(left, right, |l, r| l == r)
}

fn character_greater(left: &Value, right: &Value) -> Result<Option<Value>> {
    character_compare(left, right, |l, r| l > r)
}

fn character_lesser(left: &Value, right: &Value) -> Result<Option<Value>> {
    character_compare(left, right, |l, r| l < r)
}

fn character_greater_eq(left: &Value, right: &Value) -> Result<Option<Value>> {
    character_compare(left, right, |l, r| l >= r)
}

fn character_lesser_eq(left: &Value, right: &Value) -> Result<Option<Value>> {
    character_compare(left, right, |l, r| l <= r)
}

fn character_to_string(value: &Value) -> String {
    match value {
        Value::Character(c) => c.to_string(),
        _ => String::new(),
    }
}

fn character_to_number(value: &Value) -> f64 {
    match value {
        Value::Character(c) => c.to_digit(10).map_or(f64::NAN, f64::from),
        _ => f64::NAN,
    }
}

fn character_to_print(value: &Value) -> String {
    format!("'{}'", character_to_string(value))
}

fn list_arithmetic(operation: Operation, left: &Value, right: &Value) -> Result<Option<Value>> {
    let Value::List(items) = left else {
        return Ok(None);
    };
    let items = items.borrow().clone();
    match right {
        Value::Number(_) => collect(
            operation,
            items.into_iter().map(|item| (item, right.clone())),
        ),
        Value::List(other) => {
            let other = other.borrow().clone();
            if items.len() != other.len() {
                bail!(RuntimeError::Range(format!(
                    "{} between Lists of length {} and {}",
                    operation,
                    items.len(),
                    other.len()
                )));
            }
            collect(operation, items.into_iter().zip(other))
        }
        _ => Ok(None),
    }
}

fn list_add(left: &Value, right: &Value) -> Result<Option<Value>> {
    if let Some(text) = left.as_text() {
        if let Some(other) = right.as_text() {
            return Ok(Some(Value::string(&(text + &other))));
        }
        if let Value::Character(c) = right {
            return Ok(Some(Value::string(&format!("{text}{c}"))));
        }
    }
    list_arithmetic(Operation::Add, left, right)
}

fn list_sub(left: &Value, right: &Value) -> Result<Option<Value>> {
    list_arithmetic(Operation::Sub, left, right)
}

/// A List times a Number repeats it; a negative count reverses it first.
fn list_mul(left: &Value, right: &Value) -> Result<Option<Value>> {
    let (Value::List(items), Value::Number(count)) = (left, right) else {
        return list_arithmetic(Operation::Mul, left, right);
    };
    let count = count.get();
    if !count.is_finite() {
        bail!(RuntimeError::Range(format!(
            "cannot repeat a List {} times",
            format_number(count)
        )));
    }
    let mut items = items.borrow().clone();
    if items.is_empty() {
        return Ok(Some(Value::list(items)));
    }
    if count < 0.0 {
        items.reverse();
    }
    let times = count.abs().round() as usize;
    let len = match items.len().checked_mul(times) {
        Some(len) if len <= MAX_LIST_LEN => len,
        _ => bail!(RuntimeError::Range(format!(
            "repeating a List of length {} {} times exceeds {} elements",
            items.len(),
            format_number(count.abs().round()),
            MAX_LIST_LEN
        ))),
    };
    let mut out = Vec::with_capacity(len);
    for _ in 0..times {
        out.extend(items.iter().map(Value::deep_copy));
    }
    Ok(Some(Value::list(out)))
}

fn list_div(left: &Value, right: &Value) -> Result<Option<Value>> {
    list_arithmetic(Operation::Div, left, right)
}

fn list_mod(left: &Value, right: &Value) -> Result<Option<Value>> {
    list_arithmetic(Operation::Mod, left, right)
}

fn list_equal(left: &Value, right: &Value) -> Result<Option<Value>> {
    match (left, right) {
        (Value::List(_), Value::List(_)) => Ok(Some(Value::Boolean(left == right))),
        _ => Ok(None),
    }
}

fn list_length(value: &Value) -> usize {
    match value {
        Value::List(items) => items.borrow().len(),
        _ => 0,
    }
}

fn list_enumerate(value: &Value) -> Vec<Value> {
    (0..list_length(value))
        .map(|index| Value::number(index as f64))
        .collect()
}

fn list_iterate(value: &Value) -> Vec<Value> {
    match value {
        Value::List(items) => items.borrow().clone(),
        _ => Vec::new(),
    }
}

fn list_to_string(value: &Value) -> String {
    match value.as_text() {
        Some(text) => text,
        None => list_to_print(value),
    }
}

fn list_to_number(value: &Value) -> f64 {
    value
        .as_text()
        .and_then(|text| text.trim().parse::<f64>().ok())
        .unwrap_or(f64::NAN)
}

fn list_to_print(value: &Value) -> String {
    let Value::List(items) = value else {
        return String::new();
    };
    let items = items.borrow();
    if items.is_empty() {
        return "[]".to_string();
    }
    if let Some(text) = value.as_text() {
        return format!("\"{}\"", text);
    }
    let items: Vec<String> = items.iter().map(Value::to_print).collect();
    format!("[{}]", items.join(", "))
}

fn list_of(receiver: &Value) -> Result<&Rc<RefCell<Vec<Value>>>> {
    match receiver {
        Value::List(items) => Ok(items),
        other => bail!(RuntimeError::Type(format!(
            "expected a List receiver, got {}",
            other.kind()
        ))),
    }
}

fn text_of(method: &str, value: &Value) -> Result<String> {
    match value.as_text() {
        Some(text) => Ok(text),
        None => bail!(RuntimeError::Type(format!(
            "{method} is only defined on Character Lists, got {}",
            value.to_print()
        ))),
    }
}

fn list_length_method(receiver: &Value, args: Vec<Value>) -> Result<Value> {
    expect_args("length", &args, 0, 0)?;
    match receiver.capabilities().length {
        Some(length) => Ok(Value::number(length(receiver) as f64)),
        None => bail!(RuntimeError::Type(format!(
            "type {} has no length",
            receiver.kind()
        ))),
    }
}

/// Appends copies of the arguments and returns the list itself.
fn list_push(receiver: &Value, args: Vec<Value>) -> Result<Value> {
    expect_args("push", &args, 1, usize::MAX)?;
    list_of(receiver)?
        .borrow_mut()
        .extend(args.iter().map(Value::deep_copy));
    Ok(receiver.clone())
}

fn list_reverse(receiver: &Value, args: Vec<Value>) -> Result<Value> {
    expect_args("reverse", &args, 0, 0)?;
    list_of(receiver)?.borrow_mut().reverse();
    Ok(receiver.clone())
}

fn list_contains(receiver: &Value, args: Vec<Value>) -> Result<Value> {
    expect_args("contains", &args, 1, 1)?;
    let found = list_of(receiver)?
        .borrow()
        .iter()
        .any(|item| *item == args[0]);
    Ok(Value::Boolean(found))
}

fn list_join(receiver: &Value, args: Vec<Value>) -> Result<Value> {
    expect_args("join", &args, 0, 1)?;
    let separator = match args.first() {
        Some(separator) => text_of("join separator", separator)?,
        None => String::new(),
    };
    let parts: Vec<String> = list_of(receiver)?.borrow().iter().map(to_text).collect();
    Ok(Value::string(&parts.join(&separator)))
}

fn text_upper(receiver: &Value, args: Vec<Value>) -> Result<Value> {
    expect_args("upper", &args, 0, 0)?;
    Ok(Value::string(&text_of("upper", receiver)?.to_uppercase()))
}

fn text_lower(receiver: &Value, args: Vec<Value>) -> Result<Value> {
    expect_args("lower", &args, 0, 0)?;
    Ok(Value::string(&text_of("lower", receiver)?.to_lowercase()))
}

fn text_trim(receiver: &Value, args: Vec<Value>) -> Result<Value> {
    expect_args("trim", &args, 0, 0)?;
    Ok(Value::string(text_of("trim", receiver)?.trim()))
}

fn text_split(receiver: &Value, args: Vec<Value>) -> Result<Value> {
    expect_args("split", &args, 0, 1)?;
    let text = text_of("split", receiver)?;
    let separator = match args.first() {
        Some(separator) => text_of("split separator", separator)?,
        None => " ".to_string(),
    };
    let parts: Vec<Value> = if separator.is_empty() {
        text.chars().map(|c| Value::string(&c.to_string())).collect()
    } else {
        text.split(separator.as_str()).map(Value::string).collect()
    };
    Ok(Value::list(parts))
}

fn callable_to_print(value: &Value) -> String {
    match value {
        Value::Function(function) => {
            format!("({}) => {}", function.parameters.join(", "), function.body)
        }
        Value::NativeFunction(native) => format!("<native {}>", native.name),
        _ => String::new(),
    }
}

fn internal_to_print(value: &Value) -> String {
    match value {
        Value::Control(control) => {
            let keyword = match control.kind {
                ControlKind::Break => "break",
                ControlKind::Continue => "continue",
            };
            format!("{}{}", keyword, "#".repeat(control.carry))
        }
        _ => "none".to_string(),
    }
}
