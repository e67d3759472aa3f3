use std::io::{self, BufRead, Write};

use anyhow::Result;
use xper::{Engine, Lexer, Parser};

use crate::Options;

const PROMPT: &str = ">> ";
const TRACE_LINES: usize = 10;

pub fn start(options: Options) -> Result<()> {
    let mut engine = options.engine();
    let stdin = io::stdin();

    println!("Xper REPL, press ctrl-d to leave.");
    loop {
        print!("{}", PROMPT);
        io::stdout().flush()?;

        let mut input = String::new();
        if stdin.lock().read_line(&mut input)? == 0 {
            println!();
            return Ok(());
        }
        if input.trim().is_empty() {
            continue;
        }

        if options.debug {
            if let Err(err) = describe(&input) {
                println!("parse error: {}", err);
                continue;
            }
        }

        match engine.run(&input) {
            Ok(result) => println!("{}", result),
            Err(err) => println!("{}", err),
        }

        if options.stack {
            print_trace(engine.as_ref());
        }
    }
}

/// Prints the tokens and the parsed expressions of `input`.
pub fn describe(input: &str) -> Result<()> {
    let tokens: Vec<String> = Lexer::new(input).map(|token| token.to_string()).collect();
    println!("tokens: {}", tokens.join(" "));

    let lexer = Lexer::new(input);
    let mut parser = Parser::new(lexer);
    let program = parser.parse_program()?;
    for expression in &program.expressions {
        println!("ast: {}", expression);
    }
    Ok(())
}

pub fn print_trace(engine: &dyn Engine) {
    for (depth, value) in engine.trace().iter().take(TRACE_LINES).enumerate() {
        println!("  #{} {}", depth, value);
    }
}
