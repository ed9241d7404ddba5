use std::{cell::RefCell, io::Write, rc::Rc};

use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(about = "ITMOScript interpreter")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Execute a program, reading input from stdin
    Run(FileArgs),
    /// Print the parse tree of a program
    Ast(FileArgs),
    /// Print the token stream of a program
    Tokens(FileArgs),
}

#[derive(Debug, Args)]
struct FileArgs {
    file: String,
}

fn main() {
    env_logger::init();
    let args = Cli::parse();

    let result = match &args.command {
        Command::Run(args) => run_command(args),
        Command::Ast(args) => ast_command(args),
        Command::Tokens(args) => tokens_command(args),
    };

    if let Err(e) = result {
        eprintln!("{e}");
        std::process::exit(1);
    }
}

#[derive(Debug, thiserror::Error)]
enum CommandError {
    #[error("Failed to read {file}: {source}")]
    Read {
        file: String,
        source: std::io::Error,
    },
    #[error(transparent)]
    Interpret(#[from] itmoscript::InterpretError),
}

fn read_source(args: &FileArgs) -> Result<String, CommandError> {
    std::fs::read_to_string(&args.file).map_err(|source| CommandError::Read {
        file: args.file.clone(),
        source,
    })
}

fn run_command(args: &FileArgs) -> Result<(), CommandError> {
    let source = read_source(args)?;
    let stdout = Rc::new(RefCell::new(std::io::stdout()));
    let stdin = Rc::new(RefCell::new(std::io::stdin().lock()));
    let result = itmoscript::run(&source, stdout.clone(), stdin);
    stdout.borrow_mut().flush().ok();
    Ok(result?)
}

fn ast_command(args: &FileArgs) -> Result<(), CommandError> {
    let source = read_source(args)?;
    let tokens = itmoscript::tokenizer::tokens(&source).map_err(itmoscript::InterpretError::from)?;
    let ast = itmoscript::parser::program(&tokens).map_err(itmoscript::InterpretError::from)?;
    print!("{ast}");
    Ok(())
}

fn tokens_command(args: &FileArgs) -> Result<(), CommandError> {
    let source = read_source(args)?;
    let tokens = itmoscript::tokenizer::tokens(&source).map_err(itmoscript::InterpretError::from)?;

    let mut line = 0;
    for token in tokens {
        if token.line() != line {
            print!("{:4} ", token.line());
            line = token.line();
        } else {
            print!("   | ");
        }
        println!("{:<12} {}", format!("{:?}", token.token_type()), token);
    }
    Ok(())
}
