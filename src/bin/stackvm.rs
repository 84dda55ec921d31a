use std::error::Error;
use std::fs;

use clap::{arg, Arg, ArgMatches, Command};
use log::LevelFilter;

use stackvm::asm;
use stackvm::disasm;
use stackvm::util::{FromHexString, ToHexString};
use stackvm::vm::Vm;

fn main() -> Result<(), Box<dyn Error>> {
    let matches = Command::new("stackvm")
        .about("eVM assembler, disassembler and interpreter")
        .version("0.1.0")
        .subcommand_required(true)
        .arg(arg!(--verbose "Show verbose output"))
        .subcommand(
            Command::new("assemble")
                .about("Assemble an eVM source file into a raw hex string")
                .arg(Arg::new("file").required(true))
                .visible_alias("a"),
        )
        .subcommand(
            Command::new("disassemble")
                .about("Disassemble a hex string or file into eVM source")
                .arg(Arg::new("code").short('c').long("code").action(clap::ArgAction::SetTrue))
                .arg(Arg::new("target").required(true))
                .visible_alias("d"),
        )
        .subcommand(
            Command::new("run")
                .about("Assemble and execute an eVM source file")
                .arg(Arg::new("file").required(true))
                .arg(arg!(--"max-ops" <N> "Maximum number of instructions to execute").default_value("1000000"))
                .arg(arg!(--"max-stack" <N> "Stack capacity in cells").default_value("256"))
                .visible_alias("r"),
        )
        .get_matches();

    let verbose = matches.get_flag("verbose");
    if verbose {
        stackvm::logging::init(LevelFilter::Info);
    } else {
        stackvm::logging::init(LevelFilter::Warn);
    }

    let ok = match matches.subcommand() {
        Some(("assemble", args)) => assemble(args),
        Some(("disassemble", args)) => disassemble(args),
        Some(("run", args)) => run(args),
        _ => unreachable!(),
    }?;

    std::process::exit(if ok { 0 } else { 1 });
}

/// Assemble a source file and print the resulting bytecode as hex.
fn assemble(args: &ArgMatches) -> Result<bool, Box<dyn Error>> {
    let filename = args.get_one::<String>("file").unwrap();
    let source = fs::read_to_string(filename)?;
    match asm::assemble(&source) {
        Ok(bytes) => {
            println!("{}", bytes.to_hex_string());
            Ok(true)
        }
        Err(e) => {
            eprintln!("error: {e}");
            Ok(false)
        }
    }
}

/// Disassemble a hex string (or a file holding one) into eVM source.
fn disassemble(args: &ArgMatches) -> Result<bool, Box<dyn Error>> {
    let target = args.get_one::<String>("target").unwrap();
    let hex = if args.contains_id("code") {
        target.clone()
    } else {
        fs::read_to_string(target)?.lines().collect()
    };
    let bytes = hex.from_hex_string()?;
    match disasm::disassemble(&bytes) {
        Ok(instrs) => {
            print!("{}", disasm::to_text(&instrs));
            Ok(true)
        }
        Err(e) => {
            eprintln!("error: {e}");
            Ok(false)
        }
    }
}

/// Assemble a source file and run it to completion (or until the op
/// budget is exhausted), printing the final stack.
fn run(args: &ArgMatches) -> Result<bool, Box<dyn Error>> {
    let filename = args.get_one::<String>("file").unwrap();
    let max_ops: u32 = args.get_one::<String>("max-ops").unwrap().parse()?;
    let max_stack: u16 = args.get_one::<String>("max-stack").unwrap().parse()?;
    let source = fs::read_to_string(filename)?;

    let bytes = match asm::assemble(&source) {
        Ok(bytes) => bytes,
        Err(e) => {
            eprintln!("error: {e}");
            return Ok(false);
        }
    };

    let mut vm = Vm::new(max_stack, 1, ())?;
    vm.set_program(&bytes);
    let halted = vm.run(max_ops);

    for depth in (0..vm.sp()).rev() {
        println!("[{depth:04}] {:#010x}", vm.peek_i32(depth).unwrap());
    }
    if !halted {
        eprintln!("stopped after {max_ops} operations without halting");
    }
    Ok(halted)
}
