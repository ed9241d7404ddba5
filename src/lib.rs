use std::{
    cell::RefCell,
    io::{BufRead, Write},
    rc::Rc,
};

pub mod ast;
pub mod compiler;
pub mod interpreter;
pub mod parser;
pub mod span;
pub mod tokenizer;
pub mod tree;
pub mod value;

#[derive(Debug, thiserror::Error)]
pub enum InterpretError {
    #[error(transparent)]
    Tokenize(#[from] tokenizer::TokenizeError),
    #[error(transparent)]
    Parse(#[from] parser::ParseErrorWithContext),
    #[error(transparent)]
    Compile(#[from] compiler::CompileError),
    #[error(transparent)]
    Execution(#[from] interpreter::ExecutionError),
}

/// Tokenizes, parses and compiles the whole source, then executes it with
/// the given output sink and input source.
pub fn run(
    source: &str,
    stdout: Rc<RefCell<dyn Write>>,
    stdin: Rc<RefCell<dyn BufRead>>,
) -> Result<(), InterpretError> {
    let tokens = tokenizer::tokens(source)?;
    let ast = parser::program(&tokens)?;
    let program = compiler::compile(&ast)?;
    interpreter::Interpreter::new(stdout, stdin).interpret(&program)?;
    Ok(())
}

/// Like [`run`], reporting only whether the program completed. The
/// diagnostic of a failed run is logged.
pub fn interpret(
    source: &str,
    stdout: Rc<RefCell<dyn Write>>,
    stdin: Rc<RefCell<dyn BufRead>>,
) -> bool {
    match run(source, stdout, stdin) {
        Ok(()) => true,
        Err(e) => {
            log::error!("{e}");
            false
        }
    }
}
