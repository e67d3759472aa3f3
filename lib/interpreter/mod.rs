mod capability;
mod environment;
mod error;
mod evaluator;
mod natives;
mod operators;
mod value;

use anyhow::Result;
pub use environment::{produce_environment, Environment, Limits};
pub use error::RuntimeError;
pub use evaluator::Evaluator;
pub use value::{Value, ValueKind};

use crate::{Engine, Lexer, Parser};

pub fn new_interpreter() -> Box<dyn Engine> {
    new_interpreter_with(Limits::default())
}

pub fn new_interpreter_with(limits: Limits) -> Box<dyn Engine> {
    Box::new(EngineImpl {
        evaluator: Evaluator::with_limits(limits),
    })
}

struct EngineImpl {
    evaluator: Evaluator,
}

impl Engine for EngineImpl {
    /// A failed run leaves the environment as it was before the run.
    fn run(&mut self, input: &str) -> Result<String> {
        let lexer = Lexer::new(input);
        let mut parser = Parser::new(lexer);

        let program = parser.parse_program()?;

        let env = self.evaluator.environment();
        let snapshot = env.borrow().clone();
        match self.evaluator.eval(&program) {
            Ok(result) => Ok(result.to_print()),
            Err(err) => {
                tracing::debug!(%err, "run failed, restoring environment");
                *env.borrow_mut() = snapshot;
                Err(err)
            }
        }
    }

    fn trace(&self) -> Vec<String> {
        self.evaluator
            .trace()
            .iter()
            .map(Value::to_print)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_keeps_state_between_runs() {
        let mut engine = new_interpreter();
        assert_eq!(engine.run("x = [1, 2]").unwrap(), "[1, 2]");
        assert_eq!(engine.run("x + 1").unwrap(), "[2, 3]");
        assert_eq!(engine.run("f = (n) => n * 2; f(21)").unwrap(), "42");
        assert_eq!(engine.run("f(x)").unwrap(), "[2, 4]");
        assert_eq!(engine.trace()[0], "[2, 4]");
    }

    #[test]
    fn test_failed_run_is_rolled_back() {
        let mut engine = new_interpreter();
        engine.run("x = 1; l = [1]").unwrap();

        let err = engine.run("x = 2; l.push(2); missing").unwrap_err();
        assert_eq!(
            err.downcast_ref::<RuntimeError>(),
            Some(&RuntimeError::Reference("\"missing\" is not bound".to_string()))
        );

        assert_eq!(engine.run("x").unwrap(), "1");
        assert_eq!(engine.run("l").unwrap(), "[1]");
        assert_eq!(engine.run("*x; x").unwrap_err().to_string(), "ReferenceError: \"x\" is not bound");
    }

    #[test]
    fn test_closures_survive_rollback() {
        let mut engine = new_interpreter();
        engine.run("n = 10; f = () => n").unwrap();
        assert!(engine.run("n = 11; 1 + true").is_err());
        assert_eq!(engine.run("f()").unwrap(), "10");
    }

    #[test]
    fn test_configured_limits() {
        let mut engine = new_interpreter_with(Limits {
            max_iterations: 10,
            ..Limits::default()
        });
        let err = engine.run("i = 0; while (true) { i++ }").unwrap_err();
        assert_eq!(err.to_string(), "ResourceError: loop exceeded 10 iterations");
        assert_eq!(engine.run("i").unwrap_err().to_string(), "ReferenceError: \"i\" is not bound");
    }

    #[test]
    fn test_runaway_recursion_is_reported() {
        let mut engine = new_interpreter_with(Limits {
            max_call_depth: 16,
            ..Limits::default()
        });
        engine.run("x = 1").unwrap();
        let err = engine.run("f = (n) => f(n + 1); f(0)").unwrap_err();
        assert_eq!(err.to_string(), "ResourceError: call depth exceeded 16 nested calls");
        assert_eq!(engine.run("x").unwrap(), "1");
        assert_eq!(engine.run("g = (n) => n + x; g(1)").unwrap(), "2");
    }

    #[test]
    fn test_parse_errors_are_reported() {
        let mut engine = new_interpreter();
        assert_eq!(
            engine.run("(a, 1) => a").unwrap_err().to_string(),
            "expected parameter name, found 1"
        );
    }
}
