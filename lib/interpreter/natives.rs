use std::{cell::RefCell, f64::consts, rc::Rc};

use anyhow::{bail, Result};

use super::{
    capability::to_text,
    environment::Environment,
    error::RuntimeError,
    evaluator::Evaluator,
    value::{NativeCall, Value},
};
use crate::{lexer::Lexer, parser::Parser};

const GLOBALS: &[(&str, f64)] = &[
    ("omega", 0.0),
    ("pi", consts::PI),
    ("e", consts::E),
    ("NaN", f64::NAN),
    ("avogadro", 6.02214076e-23),
    ("zero", 0.0),
    ("one", 1.0),
    ("two", 2.0),
    ("three", 3.0),
    ("four", 4.0),
    ("five", 5.0),
    ("six", 6.0),
    ("seven", 7.0),
    ("eight", 8.0),
    ("nine", 9.0),
];

const FUNCTIONS: &[(&str, NativeCall)] = &[
    ("print", print as NativeCall),
    ("log", log as NativeCall),
    ("math", math as NativeCall),
    ("random", random as NativeCall),
    ("type", type_of as NativeCall),
    ("str", to_str as NativeCall),
    ("parse", parse as NativeCall),
    ("eval", eval as NativeCall),
    ("get", get as NativeCall),
    ("set", set as NativeCall),
    ("lifetime", lifetime as NativeCall),
];

const MATH: &[(&str, NativeCall)] = &[
    ("abs", abs as NativeCall),
    ("sqrt", sqrt as NativeCall),
    ("sin", sin as NativeCall),
    ("cos", cos as NativeCall),
    ("floor", floor as NativeCall),
    ("ceil", ceil as NativeCall),
    ("round", round as NativeCall),
    ("pow", pow as NativeCall),
];

const RANDOM: &[(&str, NativeCall)] = &[
    ("random", random_float as NativeCall),
    ("randint", random_int as NativeCall),
];

/// Binds the numeric globals and the native functions. Functions are
/// constant; the numeric globals may be rebound.
pub fn register(env: &mut Environment) {
    for &(name, value) in GLOBALS {
        bind(env, name, Value::number(value), false);
    }
    for &(name, call) in FUNCTIONS {
        bind(env, name, Value::native(name, call), true);
    }
}

fn bind(env: &mut Environment, name: &str, value: Value, is_const: bool) {
    if let Err(err) = env.assign(name, value, is_const, true, None) {
        tracing::warn!(name, %err, "skipping native binding");
    }
}

pub fn expect_args(name: &str, args: &[Value], min: usize, max: usize) -> Result<()> {
    if (min..=max).contains(&args.len()) {
        return Ok(());
    }
    let want = if min == max {
        min.to_string()
    } else if max == usize::MAX {
        format!("{}..", min)
    } else {
        format!("{}..{}", min, max)
    };
    bail!(RuntimeError::Type(format!(
        "wrong number of arguments for {}: want={}, got={}",
        name,
        want,
        args.len()
    )))
}

fn text_arg(name: &str, arg: &Value) -> Result<String> {
    match arg.as_text() {
        Some(text) => Ok(text),
        None => bail!(RuntimeError::Type(format!(
            "argument to `{}` must be text, got {}",
            name,
            arg.kind()
        ))),
    }
}

fn number_arg(name: &str, arg: &Value) -> Result<f64> {
    match arg {
        Value::Number(cell) => Ok(cell.get()),
        other => bail!(RuntimeError::Type(format!(
            "argument to `{}` must be a Number, got {}",
            name,
            other.kind()
        ))),
    }
}

fn print(args: Vec<Value>, _env: &Rc<RefCell<Environment>>) -> Result<Value> {
    let line: Vec<String> = args.iter().map(to_text).collect();
    println!("{}", line.join(" "));
    Ok(Value::list(args))
}

fn log(args: Vec<Value>, _env: &Rc<RefCell<Environment>>) -> Result<Value> {
    let line: Vec<String> = args.iter().map(Value::to_print).collect();
    println!("{}", line.join(" "));
    Ok(Value::list(args))
}

/// `namespace(name)` yields the member itself, `namespace(name, args...)`
/// calls it.
fn namespace(
    namespace: &str,
    members: &'static [(&'static str, NativeCall)],
    mut args: Vec<Value>,
    env: &Rc<RefCell<Environment>>,
) -> Result<Value> {
    expect_args(namespace, &args, 1, usize::MAX)?;
    let name = text_arg(namespace, &args.remove(0))?;
    let Some(&(member, call)) = members.iter().find(|(member, _)| *member == name) else {
        bail!(RuntimeError::Reference(format!(
            "{} has no member \"{}\"",
            namespace, name
        )));
    };

    if args.is_empty() {
        return Ok(Value::native(member, call));
    }
    call(args, env)
}

fn math(args: Vec<Value>, env: &Rc<RefCell<Environment>>) -> Result<Value> {
    namespace("math", MATH, args, env)
}

fn random(args: Vec<Value>, env: &Rc<RefCell<Environment>>) -> Result<Value> {
    namespace("random", RANDOM, args, env)
}

fn unary(name: &str, args: Vec<Value>, op: fn(f64) -> f64) -> Result<Value> {
    expect_args(name, &args, 1, 1)?;
    Ok(Value::number(op(number_arg(name, &args[0])?)))
}

fn abs(args: Vec<Value>, _env: &Rc<RefCell<Environment>>) -> Result<Value> {
    unary("abs", args, f64::abs)
}

fn sqrt(args: Vec<Value>, _env: &Rc<RefCell<Environment>>) -> Result<Value> {
    unary("sqrt", args, f64::sqrt)
}

fn sin(args: Vec<Value>, _env: &Rc<RefCell<Environment>>) -> Result<Value> {
    unary("sin", args, |degrees| degrees.to_radians().sin())
}

fn cos(args: Vec<Value>, _env: &Rc<RefCell<Environment>>) -> Result<Value> {
    unary("cos", args, |degrees| degrees.to_radians().cos())
}

fn floor(args: Vec<Value>, _env: &Rc<RefCell<Environment>>) -> Result<Value> {
    unary("floor", args, f64::floor)
}

fn ceil(args: Vec<Value>, _env: &Rc<RefCell<Environment>>) -> Result<Value> {
    unary("ceil", args, f64::ceil)
}

fn round(args: Vec<Value>, _env: &Rc<RefCell<Environment>>) -> Result<Value> {
    unary("round", args, f64::round)
}

fn pow(args: Vec<Value>, _env: &Rc<RefCell<Environment>>) -> Result<Value> {
    expect_args("pow", &args, 2, 2)?;
    let base = number_arg("pow", &args[0])?;
    let exponent = number_arg("pow", &args[1])?;
    Ok(Value::number(base.powf(exponent)))
}

fn random_float(args: Vec<Value>, _env: &Rc<RefCell<Environment>>) -> Result<Value> {
    expect_args("random", &args, 0, 0)?;
    Ok(Value::number(rand::random::<f64>()))
}

/// A whole number in `min..=max`.
fn random_int(args: Vec<Value>, _env: &Rc<RefCell<Environment>>) -> Result<Value> {
    expect_args("randint", &args, 2, 2)?;
    let min = number_arg("randint", &args[0])?.ceil();
    let max = number_arg("randint", &args[1])?.floor();
    if !(min.is_finite() && max.is_finite()) || max < min {
        bail!(RuntimeError::Range(format!(
            "randint needs finite bounds with min <= max, got {} and {}",
            min, max
        )));
    }
    let offset = (rand::random::<f64>() * (max - min + 1.0)).floor();
    Ok(Value::number(min + offset))
}

fn type_of(args: Vec<Value>, _env: &Rc<RefCell<Environment>>) -> Result<Value> {
    expect_args("type", &args, 1, 1)?;
    Ok(Value::string(&args[0].kind().to_string()))
}

fn to_str(args: Vec<Value>, _env: &Rc<RefCell<Environment>>) -> Result<Value> {
    expect_args("str", &args, 1, 1)?;
    Ok(Value::string(&to_text(&args[0])))
}

fn parse(args: Vec<Value>, _env: &Rc<RefCell<Environment>>) -> Result<Value> {
    expect_args("parse", &args, 1, 1)?;
    let number = match args[0].capabilities().to_number {
        Some(to_number) => to_number(&args[0]),
        None => f64::NAN,
    };
    Ok(Value::number(number))
}

fn eval(args: Vec<Value>, env: &Rc<RefCell<Environment>>) -> Result<Value> {
    expect_args("eval", &args, 1, 1)?;
    let source = text_arg("eval", &args[0])?;

    let lexer = Lexer::new(&source);
    let mut parser = Parser::new(lexer);
    let program = parser
        .parse_program()
        .map_err(|err| RuntimeError::Syntax(err.to_string()))?;

    Evaluator::with_environment(env.clone()).eval_block(&program.into_block())
}

fn get(args: Vec<Value>, env: &Rc<RefCell<Environment>>) -> Result<Value> {
    expect_args("get", &args, 1, 1)?;
    let name = text_arg("get", &args[0])?;
    env.borrow_mut().read(&name)
}

fn set(mut args: Vec<Value>, env: &Rc<RefCell<Environment>>) -> Result<Value> {
    expect_args("set", &args, 2, 3)?;
    let is_const = match args.get(2) {
        None => false,
        Some(Value::Boolean(is_const)) => *is_const,
        Some(other) => bail!(RuntimeError::Type(format!(
            "argument to `set` must be a Boolean, got {}",
            other.kind()
        ))),
    };
    let name = text_arg("set", &args[0])?;
    let value = args.swap_remove(1);
    env.borrow_mut().assign(&name, value, is_const, false, None)
}

fn lifetime(args: Vec<Value>, env: &Rc<RefCell<Environment>>) -> Result<Value> {
    expect_args("lifetime", &args, 1, 1)?;
    let name = text_arg("lifetime", &args[0])?;
    let remaining = env.borrow().lifetime(&name)?;
    Ok(Value::number(remaining))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_natives() {
        let tests = vec![
            ("print(1, \"a\")", "[1, \"a\"]"),
            ("log('a', 1)", "['a', 1]"),
            ("type(1)", "\"Number\""),
            ("type(\"hey\")", "\"List\""),
            ("type(print)", "\"NativeFunction\""),
            ("str(12.5)", "\"12.5\""),
            ("str([1, 2])", "\"[1, 2]\""),
            ("parse(\"42\")", "42"),
            ("parse(true)", "1"),
            ("parse(\"nope\")", "NaN"),
            ("math(\"abs\", -3)", "3"),
            ("math(\"sqrt\", 16)", "4"),
            ("math(\"sin\", 90)", "1"),
            ("math(\"cos\", 0)", "1"),
            ("math(\"floor\", 1.7)", "1"),
            ("math(\"ceil\", 1.2)", "2"),
            ("math(\"round\", 1.5)", "2"),
            ("math(\"pow\", 2, 10)", "1024"),
            ("sqrt = math(\"sqrt\"); sqrt(9)", "3"),
            ("math(\"sqrt\")", "<native sqrt>"),
            ("random(\"randint\", 4, 4)", "4"),
            ("eval(\"x = 2; x * 21\")", "42"),
            ("eval(\"y = 3\"); y", "3"),
            ("x = 7; get(\"x\")", "7"),
            ("set(\"x\", 8); x", "8"),
            ("set(\"k\", 1, true); k", "1"),
            ("x = 1; lifetime(\"x\")", "Infinity"),
            ("pi == math(\"round\", pi * 1000) / 1000", "false"),
            ("nine + one", "10"),
            ("omega", "0"),
        ];
        for (input, expected) in tests {
            assert_eq!(test_eval(input).unwrap().to_print(), expected, "{input}");
        }
    }

    #[test]
    fn test_random() {
        for _ in 0..100 {
            let value = test_eval("random(\"random\")()").unwrap().as_number().unwrap();
            assert!((0.0..1.0).contains(&value));
            let value = test_eval("random(\"randint\", 1, 6)").unwrap().as_number().unwrap();
            assert!((1.0..=6.0).contains(&value) && value.fract() == 0.0);
        }
    }

    #[test]
    fn test_native_errors() {
        let tests = vec![
            (
                "type()",
                RuntimeError::Type("wrong number of arguments for type: want=1, got=0".to_string()),
            ),
            (
                "set(\"x\")",
                RuntimeError::Type(
                    "wrong number of arguments for set: want=2..3, got=1".to_string(),
                ),
            ),
            (
                "math(\"tan\", 1)",
                RuntimeError::Reference("math has no member \"tan\"".to_string()),
            ),
            (
                "math(1)",
                RuntimeError::Type("argument to `math` must be text, got Number".to_string()),
            ),
            (
                "math(\"abs\", true)",
                RuntimeError::Type("argument to `abs` must be a Number, got Boolean".to_string()),
            ),
            (
                "set(\"k\", 1, true); set(\"k\", 2)",
                RuntimeError::Type("cannot assign to constant \"k\"".to_string()),
            ),
            (
                "print = 1",
                RuntimeError::Type("cannot assign to constant \"print\"".to_string()),
            ),
            (
                "get(\"missing\")",
                RuntimeError::Reference("\"missing\" is not bound".to_string()),
            ),
        ];
        for (input, expected) in tests {
            let err = test_eval(input).unwrap_err();
            assert_eq!(err.downcast_ref::<RuntimeError>(), Some(&expected), "{input}");
        }

        let err = test_eval("eval(\"(\")").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<RuntimeError>(),
            Some(RuntimeError::Syntax(_))
        ));
    }

    #[test]
    fn test_globals_can_be_rebound() {
        assert_eq!(test_eval("pi = 3; pi").unwrap(), Value::number(3.0));
    }

    fn test_eval(input: &str) -> Result<Value> {
        let lexer = Lexer::new(input);
        let mut parser = Parser::new(lexer);
        let program = parser.parse_program().unwrap();
        Evaluator::new().eval(&program)
    }
}
