//! Entrypoint for CLI
mod config;
mod error;

use std::{env, error::Error, fs, path::Path, thread, time::Duration, time::Instant};

use chip8::{prelude::*, IMPL_VERSION};
use log::{debug, error, info};

use self::{config::Config, error::AppError};

static USAGE: &str = r#"
usage: chip8 CMD FILE [OPTIONS]

commands:
    run     Run the target ROM file
    dis     Disassemble the target ROM into readable assembly

options:
    --config FILE   YAML configuration file
    --millis N      Milliseconds to run for (default 5000)

examples:
    chip8 run breakout.rom --millis 10000
    chip8 dis breakout.rom
"#;

const DEFAULT_RUN_MILLIS: u64 = 5000;

fn run_bytecode(filepath: &str, config: Option<&str>, millis: u64) -> Result<(), AppError> {
    let config = match config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };
    let conf = config.machine_conf(Path::new(filepath));

    let mut vm = Chip8Vm::new(conf);
    vm.load_file(filepath)?;
    info!("running {filepath} for {millis}ms");

    let start = Instant::now();
    let mut frames = 0_usize;

    loop {
        let now = start.elapsed().as_millis() as u64;
        if now >= millis {
            break;
        }

        match vm.tick(now) {
            Ok(Flow::KeyWait) => info!("waiting for key press, no keypad attached"),
            Ok(_) => {}
            Err(err) => {
                error!("{err}");
                println!("{}", vm.dump_display()?);
                return Err(err.into());
            }
        }

        if vm.take_dirty() {
            frames += 1;
            debug!("frame {frames}");
        }

        thread::sleep(Duration::from_millis(1));
    }

    info!("drew {frames} frames");
    println!("{}", vm.dump_display()?);

    Ok(())
}

fn run_disassembler(filepath: &str) -> Result<(), AppError> {
    let bytecode = fs::read(filepath)?;
    print!("{}", Disassembler::new(&bytecode).to_listing()?);

    Ok(())
}

fn main() -> Result<(), Box<dyn Error>> {
    simple_logger::SimpleLogger::new().env().init()?;

    match parse_args(env::args().skip(1)) {
        Some(Cmd::Run {
            filepath,
            config,
            millis,
        }) => run_bytecode(&filepath, config.as_deref(), millis)?,
        Some(Cmd::Dis { filepath }) => run_disassembler(&filepath)?,
        None => {
            print_usage();
            // FreeBSD EX_USAGE (64)
            std::process::exit(64)
        }
    }

    Ok(())
}

fn parse_args(mut args: impl Iterator<Item = String>) -> Option<Cmd> {
    match args.next()?.as_str() {
        "run" => {
            let filepath = args.next()?;
            let mut config = None;
            let mut millis = DEFAULT_RUN_MILLIS;

            while let Some(opt) = args.next() {
                match opt.as_str() {
                    "--config" => config = Some(args.next()?),
                    "--millis" => millis = args.next()?.parse().ok()?,
                    _ => return None,
                }
            }

            Some(Cmd::Run {
                filepath,
                config,
                millis,
            })
        }
        "dis" => Some(Cmd::Dis {
            filepath: args.next()?,
        }),
        _ => None,
    }
}

fn print_usage() {
    println!("Chip8 v{IMPL_VERSION}");
    println!("{USAGE}");
}

#[derive(Debug, PartialEq, Eq)]
enum Cmd {
    /// Run file
    Run {
        filepath: String,
        config: Option<String>,
        millis: u64,
    },
    /// Disassemble
    Dis { filepath: String },
}

#[cfg(test)]
mod test {
    use super::*;

    fn args(line: &str) -> impl Iterator<Item = String> + '_ {
        line.split_whitespace().map(String::from)
    }

    #[test]
    fn test_parse_args() {
        assert_eq!(
            parse_args(args("run pong.ch8 --millis 200 --config c.yaml")),
            Some(Cmd::Run {
                filepath: "pong.ch8".into(),
                config: Some("c.yaml".into()),
                millis: 200,
            })
        );
        assert_eq!(
            parse_args(args("dis pong.ch8")),
            Some(Cmd::Dis {
                filepath: "pong.ch8".into()
            })
        );
        assert_eq!(parse_args(args("run")), None);
        assert_eq!(parse_args(args("run pong.ch8 --millis soon")), None);
        assert_eq!(parse_args(args("asm pong.asm")), None);
        assert_eq!(parse_args(args("")), None);
    }
}
