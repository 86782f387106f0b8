//! regmach - CLI Entry Point
//!
//! Commands:
//! - `regmach run <program>` - Run an assembly or object file
//! - `regmach asm <source>` - Assemble to an object file
//! - `regmach disasm <object>` - Disassemble an object file

use clap::{Parser, Subcommand};
use std::io::Write;

#[derive(Parser)]
#[command(name = "regmach")]
#[command(version = "0.1.0")]
#[command(about = "A register-machine CPU simulator with conditionally executed instructions")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a program until it halts
    Run {
        /// Path to the assembly or object file to execute
        program: String,
        /// Address to start execution from
        #[arg(short, long, default_value_t = 0)]
        start: i32,
        /// Pause for confirmation before every cycle
        #[arg(long)]
        step: bool,
        /// Show a trace line per cycle
        #[arg(short, long)]
        trace: bool,
    },
    /// Assemble source to an object file
    Asm {
        /// Path to the source file
        source: String,
        /// Output object file
        #[arg(short, long)]
        output: Option<String>,
    },
    /// Disassemble an object file to readable text
    Disasm {
        /// Path to the object file
        object: String,
    },
}

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Run {
            program,
            start,
            step,
            trace,
        }) => {
            run_program(&program, start, step, trace);
        }
        Some(Commands::Asm { source, output }) => {
            assemble_file(&source, output);
        }
        Some(Commands::Disasm { object }) => {
            disassemble_file(&object);
        }
        None => {
            println!("regmach v0.1.0");
            println!("A register-machine CPU simulator");
            println!();
            println!("Use --help for available commands");
        }
    }
}

/// Load a program image from an assembly or object file.
fn load_program_file(path: &str) -> Vec<i32> {
    use regmach::{assemble, load_object};

    if path.ends_with(".asm") {
        let source = match std::fs::read_to_string(path) {
            Ok(s) => s,
            Err(e) => {
                eprintln!("❌ Failed to read file: {}", e);
                std::process::exit(1);
            }
        };

        match assemble(&source) {
            Ok(words) => {
                println!("📝 Assembled {} words", words.len());
                words
            }
            Err(e) => {
                eprintln!("❌ Assembly error: {}", e);
                std::process::exit(1);
            }
        }
    } else {
        match load_object(path) {
            Ok(object) => {
                println!("📂 Loaded {} words", object.len());
                object.words
            }
            Err(e) => {
                eprintln!("❌ Failed to load object file: {}", e);
                std::process::exit(1);
            }
        }
    }
}

fn run_program(path: &str, start: i32, step: bool, trace: bool) {
    use regmach::{Cpu, Memory, TraceObserver};

    println!("🔧 Running: {}", path);

    let words = load_program_file(path);
    if words.is_empty() {
        eprintln!("❌ No instructions to execute");
        std::process::exit(1);
    }

    let mut mem = Memory::new();
    if let Err(e) = mem.load_program(0, &words) {
        eprintln!("❌ Failed to load program: {}", e);
        std::process::exit(1);
    }

    let mut cpu = Cpu::new(mem);

    if trace {
        cpu.add_observer(Box::new(TraceObserver::new(std::io::stdout())));
    }

    if step {
        cpu.set_step_gate(Box::new(|steps| {
            print!("Step {}; press enter ", steps);
            let _ = std::io::stdout().flush();
            let mut line = String::new();
            let _ = std::io::stdin().read_line(&mut line);
        }));
    }

    println!();
    println!("━━━ Execution ━━━");

    if let Err(e) = cpu.run(start, step) {
        eprintln!("❌ CPU error at PC={}: {}", cpu.regs.pc(), e);
        std::process::exit(1);
    }

    println!();
    println!("━━━ Result ━━━");
    println!("Cycles:    {}", cpu.cycles);
    println!("Halted:    {}", cpu.is_halted());
    println!("Condition: {}", cpu.condition);
    println!("PC (r15):  {}", cpu.regs.pc());
    for index in 1..15 {
        let value = cpu.regs.get(index);
        if value != 0 {
            println!("r{}: {}", index, value);
        }
    }
}

fn assemble_file(source_path: &str, output: Option<String>) {
    use regmach::{assemble, save_object, ObjectFile};

    let out_path = output.unwrap_or_else(|| source_path.replace(".asm", ".obj.json"));

    println!("📝 Assembling: {} → {}", source_path, out_path);

    let source = match std::fs::read_to_string(source_path) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("❌ Failed to read file: {}", e);
            std::process::exit(1);
        }
    };

    let words = match assemble(&source) {
        Ok(words) => words,
        Err(e) => {
            eprintln!("❌ Assembly error: {}", e);
            std::process::exit(1);
        }
    };

    println!("✓ Assembled {} words", words.len());

    let object = ObjectFile {
        words,
        source: source.lines().map(str::to_string).collect(),
    };

    if let Err(e) = save_object(&out_path, &object) {
        eprintln!("❌ Failed to save object file: {}", e);
        std::process::exit(1);
    }

    println!("✓ Saved to {}", out_path);
}

fn disassemble_file(object_path: &str) {
    use regmach::disassemble;
    use regmach::load_object;

    println!("📖 Disassembling: {}", object_path);
    println!();

    let object = match load_object(object_path) {
        Ok(o) => o,
        Err(e) => {
            eprintln!("❌ Failed to load object file: {}", e);
            std::process::exit(1);
        }
    };

    print!("{}", disassemble(&object.words));
}
