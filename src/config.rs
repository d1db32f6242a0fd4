use clap::Parser;

use crate::consts::DEF_PATCH_SIZE;
use crate::error::TerrainError;
use crate::patch::SolveMode;

/// Command line interface of the terrain synthesizer.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// Width and height of every patch in vertices
    #[arg(default_value_t = DEF_PATCH_SIZE)]
    pub patch_size: usize,

    /// f = replay from file, s = sequential, p = parallel, g = reserved
    #[arg(default_value_t = 'p')]
    pub mode: char,

    /// Seed for the pseudo-random generator
    #[arg(default_value_t = 1, value_parser = clap::value_parser!(u64).range(1..))]
    pub seed: u64,

    /// Any value runs headless: one patch at the origin, exit when done
    pub auto: Option<String>,
}

impl Config {
    pub fn solve_mode(&self) -> Result<SolveMode, TerrainError> {
        match self.mode {
            'f' => Ok(SolveMode::FromFile),
            's' => Ok(SolveMode::Sequential),
            // The GPU mode is reserved and currently behaves like parallel.
            'p' | 'g' => Ok(SolveMode::Parallel),
            other => Err(TerrainError::InvalidInput(format!(
                "unknown mode '{other}', expected one of f, s, p, g"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_standard_run() {
        let config = Config::parse_from(["terrain_paths"]);
        assert_eq!(config.patch_size, DEF_PATCH_SIZE);
        assert_eq!(config.solve_mode().unwrap(), SolveMode::Parallel);
        assert_eq!(config.seed, 1);
        assert!(config.auto.is_none());
    }

    #[test]
    fn positional_arguments_parse_in_order() {
        let config = Config::parse_from(["terrain_paths", "17", "s", "99", "auto"]);
        assert_eq!(config.patch_size, 17);
        assert_eq!(config.solve_mode().unwrap(), SolveMode::Sequential);
        assert_eq!(config.seed, 99);
        assert!(config.auto.is_some());
    }

    #[test]
    fn gpu_mode_aliases_parallel() {
        let config = Config::parse_from(["terrain_paths", "17", "g"]);
        assert_eq!(config.solve_mode().unwrap(), SolveMode::Parallel);
    }

    #[test]
    fn unknown_modes_are_invalid_input() {
        let config = Config::parse_from(["terrain_paths", "17", "x"]);
        assert!(matches!(
            config.solve_mode(),
            Err(TerrainError::InvalidInput(_))
        ));
    }
}
