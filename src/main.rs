use std::fs;
use std::path::{Path, PathBuf};
use std::thread::sleep;
use std::time::Duration;

use clap::{Args as ClapArgs, Parser, Subcommand};
use colored::Colorize;
use hotwatch::notify::Event;
use hotwatch::{
    blocking::{Flow, Hotwatch},
    EventKind,
};
use miette::{bail, IntoDiagnostic, Result};

use marie::error::{asm_report, exec_report, image_report};
use marie::output::{format_memory, Output};
use marie::term::{parse_input, InputError, InputMode, TermDisplay, TermGate};
use marie::{AddressBook, Assembler, Collaborators, Memory, RunState, StepGate};

/// Marie assembles and runs programs for the MARIE educational machine.
#[derive(Parser)]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Quickly provide a `.mas` file to run
    path: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Run text `.mas` or image `.mre` file directly and output to terminal
    Run(RunArgs),
    /// Run a program one instruction at a time, showing registers and memory after each
    Step(RunArgs),
    /// Create `.mre` image file to run later
    Compile {
        /// `.mas` file to compile
        name: PathBuf,
        /// Destination to output `.mre` file
        dest: Option<PathBuf>,
    },
    /// Check a `.mas` file without running or outputting an image
    Check {
        /// File to check
        name: PathBuf,
    },
    /// Print the memory grid of an assembled program without running it
    Dump {
        /// `.mas` or `.mre` file to dump
        name: PathBuf,
        /// Produce minimal output, suited for blackbox tests
        #[arg(short, long)]
        minimal: bool,
    },
    /// Place a watch on a `.mas` file to receive constant assembler updates
    Watch {
        /// `.mas` file to watch
        name: PathBuf,
    },
}

#[derive(ClapArgs)]
struct RunArgs {
    /// `.mas` or `.mre` file to run
    name: PathBuf,
    /// Produce minimal output, suited for blackbox tests
    #[arg(short, long)]
    minimal: bool,
    /// Print output values in hexadecimal
    #[arg(short = 'x', long)]
    hex: bool,
    /// Comma-separated values for `INPUT`, instead of reading stdin
    #[arg(short, long, value_delimiter = ',', allow_hyphen_values = true, value_parser = input_value)]
    input: Option<Vec<u16>>,
}

fn main() -> miette::Result<()> {
    use MsgColor::*;
    let args = Args::parse();
    marie::env::init();

    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new() //
                .context_lines(marie::DIAGNOSTIC_CONTEXT_LINES)
                .build(),
        )
    }))?;

    let Some(command) = args.command else {
        if let Some(path) = args.path {
            return run(
                RunArgs {
                    name: path,
                    minimal: false,
                    hex: false,
                    input: None,
                },
                false,
            );
        }
        println!("\n~ marie v{VERSION} - Copyright (c) 2024 Artemis Rosman ~");
        println!("{SHORT_INFO}");
        std::process::exit(0);
    };

    match command {
        Command::Run(run_args) => run(run_args, false),
        Command::Step(run_args) => run(run_args, true),
        Command::Compile { name, dest } => {
            file_message(Green, "Assembling", &name);
            let (mem, _) = load(&name)?;

            let out_file_name = dest.unwrap_or_else(|| name.with_extension("mre"));
            fs::write(&out_file_name, mem.to_image()).into_diagnostic()?;

            message(Green, "Finished", &format!("emit {} words", mem.used().len()));
            file_message(Green, "Saved", &out_file_name);
            Ok(())
        }
        Command::Check { name } => {
            file_message(Green, "Checking", &name);
            let (_, book) = load(&name)?;
            let labels = book.map_or(0, |book| book.len());
            message(
                Green,
                "Success",
                &format!("no errors found! ({} labels)", labels),
            );
            Ok(())
        }
        Command::Dump { name, minimal } => {
            Output::set_minimal(minimal || marie::env::is_minimal());
            file_message(Green, "Assembling", &name);
            let (mem, book) = load(&name)?;
            Output::Normal.print_str(&format_memory(&mem, Output::is_minimal()));
            if let Some(book) = book.filter(|book| !book.is_empty()) {
                Output::Normal.print_str("\n");
                for (label, addr) in book.iter() {
                    Output::Normal.print_str(&format!("{:<12} 0x{:03X}\n", label, addr));
                }
            }
            Ok(())
        }
        Command::Watch { name } => {
            if !name.exists() {
                bail!("File does not exist. Exiting...")
            }
            // Vim breaks if watching a single file
            let folder_path = match name.parent() {
                Some(pth) if pth.is_dir() => pth.to_path_buf(),
                _ => Path::new(".").to_path_buf(),
            };

            // Clear screen and move cursor to top left
            print!("\x1B[2J\x1B[2;1H");
            file_message(Green, "Watching", &name);
            message(Cyan, "Help", "press CTRL+C to exit");

            let mut watcher = Hotwatch::new_with_custom_delay(Duration::from_millis(500))
                .into_diagnostic()?;

            watcher
                .watch(folder_path, move |event: Event| match event.kind {
                    // Watch remove for vim changes
                    EventKind::Modify(_) | EventKind::Remove(_) => {
                        print!("\x1B[2J\x1B[2;1H");
                        file_message(Green, "Watching", &name);
                        message(Green, "Re-checking", "file change detected");
                        message(Cyan, "Help", "press CTRL+C to exit");

                        sleep(Duration::from_millis(50));

                        match load(&name) {
                            Ok(_) => message(Green, "Success", "no errors found!"),
                            Err(e) => println!("\n{:?}", e),
                        }
                        Flow::Continue
                    }
                    _ => Flow::Continue,
                })
                .into_diagnostic()?;
            watcher.run();
            Ok(())
        }
    }
}

#[allow(unused)]
enum MsgColor {
    Green,
    Cyan,
    Red,
}

fn file_message(color: MsgColor, left: &str, right: &Path) {
    let right = format!("target {}", right.display());
    message(color, left, &right);
}

/// Status line, silenced in minimal mode so stdout carries only program output.
fn message<S>(color: MsgColor, left: S, right: S)
where
    S: Colorize + std::fmt::Display,
{
    if Output::is_minimal() {
        return;
    }
    let left = match color {
        MsgColor::Green => left.green(),
        MsgColor::Cyan => left.cyan(),
        MsgColor::Red => left.red(),
    };
    println!("{left:>12} {right}");
}

fn input_value(text: &str) -> std::result::Result<u16, InputError> {
    parse_input(text, None)
}

fn run(args: RunArgs, step: bool) -> Result<()> {
    Output::set_minimal(args.minimal || marie::env::is_minimal());
    let hex = args.hex || marie::env::is_hex_output();

    file_message(MsgColor::Green, "Assembling", &args.name);
    let (mut mem, _) = load(&args.name)?;

    message(MsgColor::Green, "Running", "loaded program");
    let mut input = InputMode::from(args.input);
    let mut gate = TermGate::new();
    let mut display = TermDisplay;
    let mut state = RunState::new(&mut mem);
    state
        .execute(Collaborators {
            input: &mut input,
            gate: step.then_some(&mut gate as &mut dyn StepGate),
            display: &mut display,
            hex,
        })
        .map_err(|err| exec_report(&err))?;

    file_message(MsgColor::Green, "Completed", &args.name);
    Ok(())
}

/// Memory image of a source or image file, with its labels when assembled from source.
fn load(name: &Path) -> Result<(Memory, Option<AddressBook>)> {
    let Some(ext) = name.extension() else {
        bail!("File has no extension. Exiting...");
    };
    let contents = fs::read_to_string(name).into_diagnostic()?;
    match ext.to_str() {
        Some("mas" | "asm") => {
            let mut mem = Memory::new();
            let book = Assembler::new(&mut mem)
                .assemble(&contents)
                .map_err(|err| asm_report(&err, contents))?;
            Ok((mem, Some(book)))
        }
        Some("mre") => {
            let mem = Memory::from_image(&contents).map_err(|err| image_report(&err))?;
            Ok((mem, None))
        }
        _ => bail!("File has unknown extension. Exiting..."),
    }
}

const SHORT_INFO: &str = r"
Welcome to marie, an assembler and interpreter for the MARIE
educational machine: 4096 words of memory and a single accumulator.
Please use `-h` or `--help` to access the usage instructions and documentation.
";

const VERSION: &str = env!("CARGO_PKG_VERSION");
