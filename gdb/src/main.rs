use std::net::TcpListener;
use std::path::PathBuf;

use clap::Parser;
use mips_emulator::memory::FLASH_START;
use mips_emulator::MipsCpu;
use mips_gdb_stub::{packets::hex::parse_hex, GDBStub, StubConfig};

#[derive(Parser)]
#[command(name = "mips_gdb_stub")]
#[command(about = "GDB remote stub for an emulated MIPS32 board")]
#[command(version)]
struct Cli {
    /// Address to accept GDB connections on
    #[arg(short, long, default_value = "127.0.0.1:1234")]
    listen: String,

    /// Raw image copied to the start of flash
    #[arg(short, long, value_name = "IMAGE")]
    firmware: Option<PathBuf>,

    /// Reset pc, in hex
    #[arg(short, long, value_parser = parse_addr, default_value = "9fc00000")]
    entry: u32,

    #[arg(long, default_value = "info")]
    log_level: log::LevelFilter,

    /// Reply to unsupported commands with an empty packet instead of `-`
    #[arg(long)]
    ack_unsupported_empty: bool,

    /// Instructions executed between checks for a Ctrl-C from GDB
    #[arg(long, default_value_t = 1024)]
    poll_interval: u32,
}

fn parse_addr(arg: &str) -> Result<u32, String> {
    let arg = arg.trim_start_matches("0x");
    parse_hex(arg).map_err(|err| err.to_string())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    simple_logger::SimpleLogger::new()
        .with_level(cli.log_level)
        .init()?;

    let mut cpu = MipsCpu::new();
    if let Some(path) = &cli.firmware {
        let image = std::fs::read(path)?;
        cpu.load_flash(&image)?;
        log::info!("loaded {} bytes from {} at {:#010x}", image.len(), path.display(), FLASH_START);
    }
    cpu.reset(cli.entry);

    let cfg = StubConfig {
        nack_unsupported: !cli.ack_unsupported_empty,
        interrupt_poll_interval: cli.poll_interval,
        ..StubConfig::default()
    };

    let listener = TcpListener::bind(&cli.listen)?;
    log::info!("waiting for gdb on {}", listener.local_addr()?);

    for stream in listener.incoming() {
        let stream = match stream {
            Ok(stream) => stream,
            Err(err) => {
                log::warn!("accept failed: {}", err);
                continue;
            }
        };
        let mut stub = GDBStub::new(stream, &mut cpu, cfg.clone());
        match stub.run_blocking() {
            Ok(reason) => log::info!("client gone: {:?}", reason),
            Err(err) => log::error!("session aborted: {}", err),
        }
    }
    Ok(())
}
