use std::{
    env, fmt, fs,
    io::{self, Read, Write},
    process,
};

use anyhow::Context;
use clap::Parser;
use ncc_parser::lexer::Loc;
use simplelog::{ColorChoice, Config, LevelFilter, TermLogger, TerminalMode};

use crate::CompileError;

/// Environment variable naming the log level, e.g. `NCC_LOG=debug`.
pub const LOG_ENV: &str = "NCC_LOG";

/// Name used in diagnostics for standard input.
pub const STDIN_NAME: &str = "-";

#[derive(Debug, clap::Parser)]
#[clap(author, version, about)]
struct Args {
    /// Source file to compile, `-` reads standard input
    input: String,
}

/// A compile error pointed at its source line.
#[derive(Debug)]
pub struct Diagnostic<'a> {
    pub file: &'a str,
    pub source: &'a str,
    pub loc: Loc,
    pub message: String,
}

impl<'a> Diagnostic<'a> {
    pub fn new(file: &'a str, source: &'a str, err: &CompileError) -> Self {
        Self {
            file,
            source,
            loc: err.loc(),
            message: err.to_string(),
        }
    }
}

impl fmt::Display for Diagnostic<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let line = self
            .source
            .lines()
            .nth(self.loc.line.saturating_sub(1))
            .unwrap_or("");
        let prefix = format!("{}:{}: ", self.file, self.loc.line);
        let column = self.loc.column.saturating_sub(1);

        // Tabs before the column are kept so the caret lines up with the text.
        let mut padding = " ".repeat(prefix.len());
        padding.extend(
            line.bytes()
                .chain(std::iter::repeat(b' '))
                .take(column)
                .map(|b| if b == b'\t' { '\t' } else { ' ' }),
        );

        writeln!(f, "{}{}", prefix, line)?;
        write!(f, "{}^ {}", padding, self.message)
    }
}

fn get_log_level() -> Option<LevelFilter> {
    env::var(LOG_ENV).ok()?.parse().ok()
}

fn configure_logging(level: LevelFilter) -> anyhow::Result<()> {
    TermLogger::init(
        level,
        Config::default(),
        TerminalMode::Stderr,
        ColorChoice::Auto,
    )
    .context("failed to configure the logger")
}

fn read_input(input: &str) -> anyhow::Result<String> {
    if input == STDIN_NAME {
        let mut source = String::new();
        io::stdin()
            .read_to_string(&mut source)
            .context("could not read standard input")?;
        Ok(source)
    } else {
        fs::read_to_string(input).with_context(|| format!("could not read {}", input))
    }
}

pub fn run() -> anyhow::Result<()> {
    let args = Args::parse();

    if let Some(level) = get_log_level() {
        configure_logging(level)?;
    }

    let source = read_input(&args.input)?;
    log::info!("compiling {} ({} bytes)", args.input, source.len());

    match crate::compile(&source) {
        Ok(asm) => {
            io::stdout()
                .lock()
                .write_all(asm.as_bytes())
                .context("could not write the assembly")?;
            Ok(())
        }
        Err(err) => {
            log::debug!("{:?} error: {:?}", err.category(), err);
            eprintln!("{}", Diagnostic::new(&args.input, &source, &err));
            process::exit(1);
        }
    }
}
