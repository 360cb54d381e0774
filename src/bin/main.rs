use std::{
    fs::File,
    io::{self, BufWriter, Write},
    path::{Path, PathBuf},
    process::ExitCode,
};

use clap::Parser;
use log::{debug, LevelFilter};
use quill::{
    codegen,
    ir::interp::{Machine, Trap},
    lexer::{Lexer, LexerOptions},
    parser,
    util::{
        fmt::{tree, Diagnostic},
        intern::Interner,
    },
};

#[derive(Copy, Clone, Debug, PartialEq, Eq, clap::ValueEnum)]
#[clap(rename_all = "snake_case")]
enum Emit {
    /// One token per line.
    Tokens,
    /// The syntax tree.
    Ast,
    /// The lowered module.
    Ir,
    /// Run `main` over the standard streams.
    Run,
}

/// Compiler for the Quill language.
#[derive(Debug, clap::Parser)]
#[command(name = "quillc", version)]
struct Args {
    /// Source files, processed in order.
    #[arg(required = true)]
    files: Vec<PathBuf>,

    #[arg(long, value_enum, default_value = "run")]
    emit: Emit,

    /// Log every token the lexer produces.
    #[arg(long)]
    trace_lexer: bool,
}

#[derive(Debug, thiserror::Error)]
enum Failure {
    #[error("{0}")]
    Compile(String),
    #[error("{}: {error}", path.display())]
    Io { path: PathBuf, error: io::Error },
    #[error("{}: {trap}", path.display())]
    Trap { path: PathBuf, trap: Trap },
}

fn main() -> ExitCode {
    let args = Args::parse();

    let mut logger = env_logger::Builder::from_default_env();
    if args.trace_lexer {
        logger.filter_module("quill::lexer", LevelFilter::Trace);
    }
    logger.init();

    let mut status = 0;
    for path in &args.files {
        match process(path, &args) {
            Ok(code) => status = code,
            Err(failure) => {
                eprintln!("{failure}");
                return ExitCode::FAILURE;
            }
        }
    }
    ExitCode::from(status)
}

/// Returns the exit status of the processed file, which is only ever nonzero
/// for `--emit run`.
fn process(path: &Path, args: &Args) -> Result<u8, Failure> {
    let io_failure = |error| Failure::Io {
        path: path.to_owned(),
        error,
    };
    let options = LexerOptions {
        trace: args.trace_lexer,
        ..LexerOptions::default()
    };
    let file = File::open(path).map_err(io_failure)?;
    let filename = path.display().to_string();
    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());

    if args.emit == Emit::Tokens {
        let mut lexer = Lexer::with_options(file, options);
        for token in lexer.by_ref() {
            writeln!(out, "{token:?}").map_err(io_failure)?;
        }
        if let Some(error) = lexer.take_io_error() {
            return Err(io_failure(error));
        }
        out.flush().map_err(io_failure)?;
        return Ok(0);
    }

    let compile_failure = |diagnostic: Diagnostic| Failure::Compile(diagnostic.render_file(path));
    let mut idents = Interner::default();
    let module = parser::parse_module_with(file, &filename, &mut idents, options)
        .map_err(|error| compile_failure(error.into()))?;

    if args.emit == Emit::Ast {
        tree::print_module(&mut out, &idents, &module).map_err(io_failure)?;
        out.flush().map_err(io_failure)?;
        return Ok(0);
    }

    let ir = codegen::generate(&module, &idents).map_err(|error| compile_failure(error.into()))?;
    debug!("lowered {filename} into {} function(s)", ir.functions().count());

    if args.emit == Emit::Ir {
        write!(out, "{ir}").map_err(io_failure)?;
        out.flush().map_err(io_failure)?;
        return Ok(0);
    }

    let stdin = io::stdin();
    let mut machine = Machine::new(&ir, stdin.lock(), out);
    let code = machine.run_main().map_err(|trap| Failure::Trap {
        path: path.to_owned(),
        trap,
    })?;
    // The low byte, like a process exit status.
    Ok(code as u8)
}
