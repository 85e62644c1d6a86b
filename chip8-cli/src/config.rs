//! Configuration file.
//!
//! ```yaml
//! machine:
//!   shift_quirk: modern
//!   instruction_interval_ms: 3
//!   rng_seed: 1234
//! roms:
//!   - name: BLINKY.ch8
//!     shift_quirk: legacy
//! ```
use std::path::Path;

use chip8::prelude::*;
use serde::Deserialize;

use crate::error::AppError;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Settings for every program.
    pub machine: Chip8Conf,
    /// Compatibility overrides for known programs.
    pub roms: Vec<RomQuirks>,
}

#[derive(Debug, Deserialize)]
pub struct RomQuirks {
    /// File name of the ROM, with or without extension.
    pub name: String,
    pub shift_quirk: ShiftQuirk,
}

impl RomQuirks {
    fn matches(&self, rom_path: &Path) -> bool {
        let name = self.name.as_str();
        let file_name = rom_path.file_name().and_then(|s| s.to_str());
        let file_stem = rom_path.file_stem().and_then(|s| s.to_str());

        file_name.map_or(false, |s| s.eq_ignore_ascii_case(name))
            || file_stem.map_or(false, |s| s.eq_ignore_ascii_case(name))
    }
}

impl Config {
    pub fn from_file(filepath: impl AsRef<Path>) -> Result<Self, AppError> {
        let file = std::fs::File::open(filepath.as_ref())?;

        let config: Config = serde_yaml::from_reader(file)?;
        log::debug!("loaded configuration: {:#?}", config);

        Ok(config)
    }

    pub fn parse(source: &str) -> Result<Self, AppError> {
        Ok(serde_yaml::from_str(source)?)
    }

    /// Machine settings for the given program, with any compatibility overrides applied.
    pub fn machine_conf(&self, rom_path: &Path) -> Chip8Conf {
        let mut conf = self.machine.clone();

        if let Some(quirks) = self.roms.iter().find(|quirks| quirks.matches(rom_path)) {
            log::info!("applying compatibility overrides for {}", quirks.name);
            conf.shift_quirk = quirks.shift_quirk;
        }

        conf
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::parse("{}").unwrap();
        assert_eq!(config.machine, Chip8Conf::default());
        assert_eq!(config.machine.shift_quirk, ShiftQuirk::Modern);
        assert_eq!(config.machine.instruction_interval_ms, 3);
        assert!(config.roms.is_empty());
    }

    #[test]
    fn test_rom_overrides() {
        let config = Config::parse(
            r#"
machine:
  rng_seed: 42
roms:
  - name: INVADERS
    shift_quirk: legacy
"#,
        )
        .unwrap();

        let conf = config.machine_conf(Path::new("roms/invaders.ch8"));
        assert_eq!(conf.shift_quirk, ShiftQuirk::Legacy);
        assert_eq!(conf.rng_seed, Some(42));

        let conf = config.machine_conf(Path::new("roms/pong.ch8"));
        assert_eq!(conf.shift_quirk, ShiftQuirk::Modern);
    }

    #[test]
    fn test_invalid_quirk() {
        assert!(Config::parse("machine:\n  shift_quirk: sideways\n").is_err());
    }
}
