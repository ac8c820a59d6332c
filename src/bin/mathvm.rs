// mathvm CLI - Command Line Interface
// Usage: mathvm FILE [OPTIONS]

use clap::Parser;
use colored::*;
use regex::Regex;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use mathvm_core::ast::Program;
use mathvm_core::binary;
use mathvm_core::compiler::Code;
use mathvm_core::vm::Interpreter;
use mathvm_core::{compile_source, load_program};

/// mathvm - translate and run mathvm programs on a stack machine
#[derive(Parser)]
#[command(name = "mathvm")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Bytecode translator and interpreter for the mathvm language", long_about = None)]
struct Cli {
    /// Program to run (.json AST or .mvmc bytecode)
    file: PathBuf,

    /// Debug options: ast, asm (comma-separated)
    #[arg(short = 'd', long = "debug", value_delimiter = ',')]
    debug: Option<Vec<String>>,

    /// Only disassemble functions whose name matches this regex (requires -d asm)
    #[arg(short = 'f', long = "filter")]
    filter: Option<String>,

    /// Compile to .mvmc instead of running
    #[arg(short = 'c', long = "compile")]
    compile: bool,

    /// Check for errors without running
    #[arg(long = "check")]
    check: bool,

    /// Output path for compiled file (requires -c)
    #[arg(short = 'o', long = "output")]
    output: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let debug = DebugFlags::from_options(&cli.debug);

    let result = if cli.check {
        handle_check(&cli.file)
    } else if cli.compile {
        handle_compile(&cli.file, cli.output)
    } else {
        handle_run(&cli.file, &debug, cli.filter.as_deref())
    };

    if let Err(e) = result {
        eprintln!("{}", e);
        std::process::exit(1);
    }
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "mathvm=warn,mathvm_core=warn",
        1 => "mathvm=debug,mathvm_core=debug",
        _ => "mathvm=trace,mathvm_core=trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)))
        .with_writer(io::stderr)
        .init();
}

#[derive(Default, Clone)]
struct DebugFlags {
    ast: bool,
    asm: bool,
}

impl DebugFlags {
    fn from_options(opts: &Option<Vec<String>>) -> Self {
        let mut flags = Self::default();
        if let Some(opts) = opts {
            for opt in opts {
                match opt.as_str() {
                    "ast" => flags.ast = true,
                    "asm" => flags.asm = true,
                    _ => eprintln!("{} Unknown debug option: {}", "!".yellow(), opt),
                }
            }
        }
        flags
    }
}

fn is_compiled(path: &Path) -> bool {
    path.extension().and_then(|s| s.to_str()) == Some("mvmc")
}

fn read_source(path: &Path) -> Result<String, String> {
    fs::read_to_string(path).map_err(|e| format!("Error reading file '{}': {}", path.display(), e))
}

fn read_program(path: &Path) -> Result<Program, String> {
    let source = read_source(path)?;
    load_program(&source, &path.to_string_lossy()).map_err(|e| e.to_string())
}

fn translate_file(path: &Path) -> Result<Code, String> {
    let source = read_source(path)?;
    compile_source(&source, &path.to_string_lossy()).map_err(|e| e.to_string())
}

fn read_code(path: &Path) -> Result<Code, String> {
    if is_compiled(path) {
        let data = fs::read(path)
            .map_err(|e| format!("Error reading file '{}': {}", path.display(), e))?;
        return binary::deserialize(&data);
    }
    translate_file(path)
}

/// Check file for errors without running
fn handle_check(path: &Path) -> Result<(), String> {
    let code = read_code(path)?;
    println!(
        "{} No errors found in {} ({} functions, {} constants)",
        "✓".green(),
        path.display(),
        code.functions.len(),
        code.constants.len()
    );
    Ok(())
}

/// Compile a JSON AST to a .mvmc file
fn handle_compile(path: &Path, output: Option<PathBuf>) -> Result<(), String> {
    if is_compiled(path) {
        return Err(format!("'{}' is already compiled", path.display()));
    }
    let code = translate_file(path)?;

    let output_path = output.unwrap_or_else(|| path.with_extension("mvmc"));
    let data = binary::serialize(&code);
    fs::write(&output_path, &data)
        .map_err(|e| format!("Error writing file '{}': {}", output_path.display(), e))?;

    println!("{} Compiled to {}", "✓".green(), output_path.display());
    Ok(())
}

fn handle_run(path: &Path, debug: &DebugFlags, filter: Option<&str>) -> Result<(), String> {
    let filter = filter
        .map(Regex::new)
        .transpose()
        .map_err(|e| format!("Invalid filter: {}", e))?;

    if debug.ast {
        if is_compiled(path) {
            return Err(format!("'{}' has no AST to show", path.display()));
        }
        let program = read_program(path)?;
        let json = program.to_json().map_err(|e| e.to_string())?;
        println!("{}", json);
        return Ok(());
    }

    let code = read_code(path)?;
    debug!(functions = code.functions.len(), constants = code.constants.len(), "loaded");

    if debug.asm {
        let stdout = io::stdout();
        let mut lock = stdout.lock();
        code.disassemble(&mut lock, filter.as_ref())
            .map_err(|e| e.to_string())?;
        lock.flush().map_err(|e| e.to_string())?;
    }

    let stdout = io::stdout();
    let mut vm = Interpreter::new(&code, stdout.lock());
    vm.run().map_err(|e| e.to_string())?;
    vm.into_output().flush().map_err(|e| e.to_string())?;
    Ok(())
}
