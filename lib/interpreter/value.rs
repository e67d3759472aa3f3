use core::fmt;
use std::{
    cell::{Cell, RefCell},
    rc::Rc,
};

use anyhow::Result;

use super::{
    capability::{self, Capabilities},
    environment::Environment,
};
use crate::ast::{Block, ControlKind};

/// Longest List that repetition or a range may produce.
pub const MAX_LIST_LEN: usize = 1 << 20;

pub type NativeCall = fn(Vec<Value>, &Rc<RefCell<Environment>>) -> Result<Value>;

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum ValueKind {
    Null,
    Number,
    Boolean,
    Character,
    List,
    Function,
    NativeFunction,
    Control,
    None,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            ValueKind::Null => "Null",
            ValueKind::Number => "Number",
            ValueKind::Boolean => "Boolean",
            ValueKind::Character => "Character",
            ValueKind::List => "List",
            ValueKind::Function => "Function",
            ValueKind::NativeFunction => "NativeFunction",
            ValueKind::Control => "Control",
            ValueKind::None => "None",
        };
        write!(f, "{}", name)
    }
}

/// A runtime value. Number and List payloads are shared cells: cloning a
/// `Value` aliases the payload, `deep_copy` detaches it.
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Number(Rc<Cell<f64>>),
    Boolean(bool),
    Character(char),
    List(Rc<RefCell<Vec<Value>>>),
    Function(Rc<Function>),
    NativeFunction(NativeFunction),
    Control(Control),
    None,
}

#[derive(Debug)]
pub struct Function {
    pub parameters: Vec<String>,
    pub body: Rc<Block>,
}

#[derive(Clone, Copy)]
pub struct NativeFunction {
    pub name: &'static str,
    pub call: NativeCall,
}

impl fmt::Debug for NativeFunction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "NativeFunction({})", self.name)
    }
}

#[derive(Debug, PartialEq, Clone, Copy)]
pub struct Control {
    pub kind: ControlKind,
    pub carry: usize,
}

impl Value {
    pub fn number(value: f64) -> Self {
        Value::Number(Rc::new(Cell::new(value)))
    }

    pub fn list(items: Vec<Value>) -> Self {
        Value::List(Rc::new(RefCell::new(items)))
    }

    /// Text is a list of characters.
    pub fn string(text: &str) -> Self {
        Value::list(text.chars().map(Value::Character).collect())
    }

    pub fn native(name: &'static str, call: NativeCall) -> Self {
        Value::NativeFunction(NativeFunction { name, call })
    }

    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Null => ValueKind::Null,
            Value::Number(_) => ValueKind::Number,
            Value::Boolean(_) => ValueKind::Boolean,
            Value::Character(_) => ValueKind::Character,
            Value::List(_) => ValueKind::List,
            Value::Function(_) => ValueKind::Function,
            Value::NativeFunction(_) => ValueKind::NativeFunction,
            Value::Control(_) => ValueKind::Control,
            Value::None => ValueKind::None,
        }
    }

    pub fn capabilities(&self) -> &'static Capabilities {
        capability::of(self.kind())
    }

    /// A structurally independent copy: number cells and list storage are
    /// duplicated recursively, closures and natives are shared.
    pub fn deep_copy(&self) -> Value {
        match self {
            Value::Number(cell) => Value::number(cell.get()),
            Value::List(items) => {
                Value::list(items.borrow().iter().map(Value::deep_copy).collect())
            }
            other => other.clone(),
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(cell) => Some(cell.get()),
            _ => None,
        }
    }

    /// The characters of a list made only of characters. The empty list
    /// counts as empty text.
    pub fn as_text(&self) -> Option<String> {
        match self {
            Value::List(items) => items
                .borrow()
                .iter()
                .map(|item| match item {
                    Value::Character(c) => Some(*c),
                    _ => None,
                })
                .collect(),
            _ => None,
        }
    }

    pub fn is_text(&self) -> bool {
        self.as_text().is_some()
    }

    pub fn to_print(&self) -> String {
        match self.capabilities().to_print {
            Some(to_print) => to_print(self),
            None => self.kind().to_string(),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) | (Value::None, Value::None) => true,
            (Value::Number(left), Value::Number(right)) => left.get() == right.get(),
            (Value::Boolean(left), Value::Boolean(right)) => left == right,
            (Value::Character(left), Value::Character(right)) => left == right,
            (Value::List(left), Value::List(right)) => {
                Rc::ptr_eq(left, right) || *left.borrow() == *right.borrow()
            }
            (Value::Function(left), Value::Function(right)) => Rc::ptr_eq(left, right),
            (Value::NativeFunction(left), Value::NativeFunction(right)) => {
                left.name == right.name
            }
            (Value::Control(left), Value::Control(right)) => left == right,
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.to_print())
    }
}
