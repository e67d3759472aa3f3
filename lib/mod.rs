pub mod ast;
mod engine;
pub mod interpreter;
mod lexer;
mod parser;
mod token;

pub use engine::Engine;
pub use interpreter::{new_interpreter, new_interpreter_with, Limits, RuntimeError, Value};
pub use lexer::Lexer;
pub use parser::Parser;
pub use token::Token;
