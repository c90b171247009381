use std::env;
use std::io::{self, BufRead, Write};
use std::process;

use anyhow::{Context, Result};
use stepscope_host::acquire::NeverCancel;
use stepscope_host::config::{CliArgs, HostConfig, USAGE};
use stepscope_host::keys::EscapeKey;
use stepscope_host::link::DeviceSource;
use stepscope_host::session::Session;
use stepscope_host::sim::{SimSettings, Waveform};

fn main() -> Result<()> {
    env_logger::init();

    let args = CliArgs::parse(env::args().skip(1)).unwrap_or_else(|err| {
        eprintln!("{err}");
        eprintln!("{USAGE}");
        process::exit(2);
    });

    let mut config = HostConfig::load(args.config.as_deref()).context("loading configuration")?;
    args.apply(&mut config);

    let source = if args.simulate {
        DeviceSource::Simulated(SimSettings::new(
            config.acquisition.measurement(),
            Waveform::RcCharge(config.model),
        ))
    } else {
        DeviceSource::Serial(config.link.clone())
    };

    let stdin = io::stdin();
    let mut reader = stdin.lock();
    let stdout = io::stdout();
    let mut writer = stdout.lock();
    let mut session = Session::new(&config, source, args.transcript.clone());
    let mut line = String::new();

    writeln!(
        writer,
        "Step response bench ready. Type `help` for commands or `exit` to quit."
    )?;

    loop {
        line.clear();
        write!(writer, "> ")?;
        writer.flush()?;

        let bytes_read = reader.read_line(&mut line)?;
        if bytes_read == 0 {
            writeln!(writer)?;
            break;
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        if should_terminate(trimmed) {
            writeln!(writer, "Session closed.")?;
            break;
        }

        let responses = if trimmed.eq_ignore_ascii_case("run") {
            writeln!(writer, "Acquiring... press Esc to cancel.")?;
            writer.flush()?;
            let mut keys = EscapeKey::watch();
            session.handle_command(trimmed, &mut keys)?
        } else {
            session.handle_command(trimmed, &mut NeverCancel)?
        };
        for response in responses {
            writeln!(writer, "{response}")?;
        }
    }

    Ok(())
}

fn should_terminate(input: &str) -> bool {
    input.eq_ignore_ascii_case("exit") || input.eq_ignore_ascii_case("quit")
}
