//! CLI driver: the interactive/batch front-end described in §6 of the
//! design. Not part of the library crate — the core emulator never depends
//! on stdin/stdout or the filesystem directly.

use std::io::{self, BufRead, Write as _};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;

use nesette::bus::Bus;
use nesette::cartridge::Cartridge;
use nesette::cpu::Cpu;
use nesette::golden;

/// Cycle-accurate NES CPU/PPU emulator and golden-state test driver.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Raw byte-listing program or iNES ROM to load. Omit to run the
    /// built-in golden-state test suite instead.
    program: Option<PathBuf>,

    /// Suppress the per-occurrence log for unimplemented illegal opcodes.
    #[arg(long)]
    mute_illegal: bool,
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();

    let result = match &args.program {
        None => run_test_suites(),
        Some(path) => run_program(path, args.mute_illegal),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

/// No positional argument: run the `test/` byte-listing suite and, if
/// present, `nestest.nes` against `nestest.log`.
fn run_test_suites() -> Result<()> {
    let mut ran_any = false;
    let mut any_failed = false;

    let test_dir = Path::new("test");
    if test_dir.join("filenames").is_file() {
        ran_any = true;
        let summary = golden::run_state_suite(test_dir)
            .with_context(|| format!("running test suite in {}", test_dir.display()))?;
        any_failed |= !summary.failed.is_empty();
        println!("test/filenames: {summary}");
    }

    let nestest_nes = Path::new("nestest.nes");
    let nestest_log = Path::new("nestest.log");
    if nestest_nes.is_file() && nestest_log.is_file() {
        ran_any = true;
        let summary = golden::run_nestest(nestest_nes, nestest_log)
            .context("running nestest.nes against nestest.log")?;
        any_failed |= !summary.failed.is_empty();
        println!("nestest: {summary}");
    }

    if !ran_any {
        println!(
            "no golden fixtures found (looked for test/filenames and nestest.nes/nestest.log in the current directory)"
        );
        return Ok(());
    }

    if any_failed {
        anyhow::bail!("one or more golden-state tests failed");
    }
    Ok(())
}

/// One positional argument: sniff iNES magic vs. a raw byte-listing and
/// either boot the ROM or drop into the interactive step/continue REPL.
fn run_program(path: &Path, mute_illegal: bool) -> Result<()> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("failed to read {}", path.display()))?;

    let cart = if bytes.len() >= 4 && &bytes[0..4] == b"NES\x1A" {
        Cartridge::from_ines_bytes(&bytes).context("parsing iNES ROM")?
    } else {
        let program = golden::parse_byte_listing(&String::from_utf8_lossy(&bytes))
            .context("parsing byte-listing program")?;
        golden::load_byte_listing(&program).context("loading byte-listing program")?
    };

    let mut bus = Bus::new();
    bus.attach_cartridge(cart);
    let mut cpu = Cpu::new();
    cpu.set_mute_illegal(mute_illegal);
    cpu.set_halt_on_brk(true);
    cpu.reset();
    for _ in 0..7 {
        cpu.step(&mut bus);
    }

    run_repl(&mut cpu, &mut bus)
}

/// Interactive `s`/`step` or `c`/`continue` REPL over stdin, printing
/// register/op state around each cycle and exiting on BRK.
fn run_repl(cpu: &mut Cpu, bus: &mut Bus) -> Result<()> {
    print_state(cpu);

    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();
    loop {
        if cpu.halted() {
            println!("halted (BRK)");
            return Ok(());
        }
        print!("> ");
        io::stdout().flush().ok();
        let Some(line) = lines.next() else {
            return Ok(());
        };
        let line = line.context("reading stdin")?;
        match line.trim() {
            "s" | "step" => {
                cpu.step_instruction(bus);
                print_state(cpu);
            }
            "c" | "continue" => {
                while !cpu.halted() {
                    cpu.step_instruction(bus);
                }
                print_state(cpu);
            }
            "q" | "quit" => return Ok(()),
            "" => {}
            other => println!("unrecognized command: {other:?} (use s/step, c/continue, q/quit)"),
        }
    }
}

fn print_state(cpu: &Cpu) {
    println!(
        "PC:{:04X} A:{:02X} X:{:02X} Y:{:02X} P:{:08b} SP:{:02X} CYC:{}",
        cpu.pc(),
        cpu.a(),
        cpu.x(),
        cpu.y(),
        cpu.status(),
        cpu.sp(),
        cpu.cycles()
    );
}
