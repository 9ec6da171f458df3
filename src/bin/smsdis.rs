use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use smslift::decode_block;
use std::fs;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "smsdis")]
#[command(about = "Decode a Z80 code block from a ROM image and show the lifted IR", long_about = None)]
struct Args {
    /// Path to the ROM image
    rom: PathBuf,

    /// Address to start decoding at (hex accepted with an 0x prefix)
    #[arg(long, default_value = "0")]
    pc: String,

    /// Dump the decoded block as JSON instead of a listing
    #[arg(long, action = ArgAction::SetTrue)]
    json: bool,
}

fn parse_addr(raw: &str) -> Result<u16> {
    let trimmed = raw.trim();
    let parsed = if let Some(hex) = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
    {
        u16::from_str_radix(hex, 16)
    } else {
        trimmed.parse::<u16>()
    };
    parsed.with_context(|| format!("invalid address {raw:?}"))
}

fn main() -> Result<()> {
    let args = Args::parse();
    let start_pc = parse_addr(&args.pc)?;
    let rom = fs::read(&args.rom)
        .with_context(|| format!("reading ROM {}", args.rom.display()))?;
    let window = rom
        .get(usize::from(start_pc)..)
        .with_context(|| format!("start address {start_pc:#06X} past ROM end"))?;

    let block = decode_block(window, start_pc);

    if args.json {
        println!("{}", serde_json::to_string_pretty(&block)?);
        return Ok(());
    }

    for instr in &block.instructions {
        println!("{:#06X}  {}", instr.pc, instr.name);
    }
    println!(
        "-- {} at {:#06X} ({} instruction(s))",
        block.terminator.as_str(),
        block.end_pc,
        block.instructions.len()
    );
    if let Some(fault) = block.fault() {
        println!("-- {fault}");
    }
    Ok(())
}
