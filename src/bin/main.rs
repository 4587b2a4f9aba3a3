#[macro_use]
extern crate slog;

use chip8vm::error::Result;
use chip8vm::graphics::{Framebuffer, Renderer};
use chip8vm::op::disassemble;
use chip8vm::session::Session;
use chip8vm::{logger, rom, Config};
use clap::Parser;
use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

/// Run a CHIP-8 program for a number of frames and print the final display
#[derive(Parser, Debug)]
#[command(name = "chip8vm", version, about)]
struct Args {
    /// Raw program file. Runs the built-in boot program when omitted.
    rom: Option<PathBuf>,

    /// JSON config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Frames to run before printing the display
    #[arg(short, long, default_value_t = 60)]
    frames: u32,

    /// Seed for the random number instruction, overrides the config
    #[arg(long)]
    seed: Option<u64>,

    /// Terminal cells per pixel
    #[arg(long, default_value_t = 1)]
    scale: usize,

    /// Print the register snapshot as JSON after running
    #[arg(long)]
    inspect: bool,

    /// Print a listing of the program and exit without running it
    #[arg(long)]
    disassemble: bool,
}

/// Draws the framebuffer with block characters
struct TextRenderer<W: Write> {
    out: W,
}

impl<W: Write> Renderer for TextRenderer<W> {
    type Error = io::Error;

    fn render(&mut self, frame: &Framebuffer, scale: usize) -> io::Result<()> {
        let scale = scale.max(1);
        for row in frame.rows() {
            let mut line = String::with_capacity(row.len() * scale);
            for pixel in row {
                let c = if pixel { '█' } else { ' ' };
                for _ in 0..scale {
                    line.push(c);
                }
            }
            for _ in 0..scale {
                writeln!(self.out, "{}", line.trim_end())?;
            }
        }
        self.out.flush()
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };
    if args.seed.is_some() {
        config.seed = args.seed;
    }
    config.validate()?;

    if args.disassemble {
        let program = match &args.rom {
            Some(path) => fs::read(path)?,
            None => rom::BOOT.to_vec(),
        };
        return print_listing(&program, config.base);
    }

    let log = logger::terminal_logger(config.log_level)?;
    let mut session = Session::new(config.clone(), Some(log.clone()));
    if let Some(path) = &args.rom {
        session.load_file(path)?;
    }

    let period = Duration::from_secs(1) / config.timer_hz;
    let deadline = Instant::now() + period * args.frames;
    let mut received = 0u32;

    session.start();
    while session.is_running() && Instant::now() < deadline {
        if session.poll().is_some() {
            received += 1;
        }
        thread::sleep(period / 2);
    }
    session.stop();
    session.poll();
    debug!(log, "finished"; "frames_received" => received);

    let frame = session
        .stepper()
        .with_machine(|vm| vm.framebuffer().clone());
    let stdout = io::stdout();
    let mut renderer = TextRenderer { out: stdout.lock() };
    renderer.render(&frame, args.scale)?;

    if args.inspect {
        let snapshot = session.inspect();
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
    }

    Ok(())
}

fn print_listing(program: &[u8], base: u16) -> Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    for (address, word, op) in disassemble(program, base) {
        match op {
            Ok(op) => writeln!(out, "{:03X}  {:04X}  {}", address, word, op)?,
            Err(_) => writeln!(out, "{:03X}  {:04X}  ???", address, word)?,
        }
    }
    Ok(())
}
