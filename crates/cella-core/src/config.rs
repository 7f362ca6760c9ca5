//! Simulation configuration and its JSON loader.

use crate::cell::MAX_COLOR;
use crate::engine::EvaluationMode;
use crate::grid::Grid;
use crate::rule::{InvalidRuleSyntax, RuleSet};
use rand::{SeedableRng, rngs::SmallRng};
use serde::{Deserialize, Serialize};
use std::{fs, io, path::Path, path::PathBuf};
use thiserror::Error;

/// Birth on three, survival on two or three.
pub const CONWAY_RULES: [&str; 3] = ["8PL<2V", "8PL>3V", "8VL=3P"];

/// Errors raised while loading or validating a [`CellaConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Indicates an invalid configuration value.
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
    #[error(transparent)]
    Rules(#[from] InvalidRuleSyntax),
    #[error("failed to read config {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse config")]
    Parse(#[from] serde_json::Error),
}

/// Static configuration for a Cella simulation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CellaConfig {
    /// Side length of the square torus.
    pub grid_size: usize,
    /// Highest color any cell may hold (1..=8).
    pub max_color: u8,
    /// Rule codes in priority order.
    pub rules: Vec<String>,
    /// Optional seed for reproducible grids and random actions.
    pub rng_seed: Option<u64>,
    /// Fraction of cells given a color by [`CellaConfig::seeded_grid`].
    pub seed_density: f32,
    pub evaluation: EvaluationMode,
}

impl Default for CellaConfig {
    fn default() -> Self {
        Self {
            grid_size: 512,
            max_color: 1,
            rules: CONWAY_RULES.iter().map(|code| (*code).to_owned()).collect(),
            rng_seed: None,
            seed_density: 0.2,
            evaluation: EvaluationMode::Tracked,
        }
    }
}

impl CellaConfig {
    /// Read and validate a JSON config file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&text)
    }

    /// Parse and validate a JSON config; missing fields take their defaults.
    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.grid_size == 0 {
            return Err(ConfigError::InvalidConfig("grid_size must be non-zero"));
        }
        if !(1..=MAX_COLOR).contains(&self.max_color) {
            return Err(ConfigError::InvalidConfig("max_color must be in 1..=8"));
        }
        if !(0.0..=1.0).contains(&self.seed_density) {
            return Err(ConfigError::InvalidConfig(
                "seed_density must be within [0, 1]",
            ));
        }
        self.compile_rules()?;
        Ok(())
    }

    pub fn compile_rules(&self) -> Result<RuleSet, InvalidRuleSyntax> {
        RuleSet::compile(&self.rules)
    }

    /// Returns the configured RNG seed, generating one from entropy if absent.
    #[must_use]
    pub fn seeded_rng(&self) -> SmallRng {
        match self.rng_seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => {
                let seed: u64 = rand::random();
                SmallRng::seed_from_u64(seed)
            }
        }
    }

    /// A grid of `grid_size` filled at `seed_density` with colors up to `max_color`.
    pub fn seeded_grid(&self) -> Result<Grid, ConfigError> {
        self.validate()?;
        let mut grid = Grid::new(self.grid_size)
            .map_err(|_| ConfigError::InvalidConfig("grid_size must be non-zero"))?;
        let mut rng = self.seeded_rng();
        grid.randomize(&mut rng, self.seed_density, self.max_color);
        Ok(grid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_describe_conway_on_a_512_torus() {
        let config = CellaConfig::default();
        assert_eq!(config.grid_size, 512);
        assert_eq!(config.max_color, 1);
        assert_eq!(config.rules, CONWAY_RULES);
        assert!(config.validate().is_ok());
        assert_eq!(config.compile_rules().expect("rules").len(), 3);
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let config = CellaConfig::from_json_str(
            r#"{ "grid_size": 64, "rng_seed": 9, "evaluation": "exhaustive" }"#,
        )
        .expect("config");
        assert_eq!(config.grid_size, 64);
        assert_eq!(config.rng_seed, Some(9));
        assert_eq!(config.evaluation, EvaluationMode::Exhaustive);
        assert_eq!(config.max_color, 1);
        assert_eq!(config.rules.len(), 3);
    }

    #[test]
    fn validation_rejects_bad_values() {
        let config = CellaConfig {
            max_color: 9,
            ..CellaConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidConfig(_))
        ));

        let config = CellaConfig {
            rules: vec!["8PL<2V".into(), "8PL?2V".into()],
            ..CellaConfig::default()
        };
        match config.validate() {
            Err(ConfigError::Rules(err)) => assert_eq!(err.index, 1),
            other => panic!("unexpected result: {other:?}"),
        }

        assert!(matches!(
            CellaConfig::from_json_str("{ \"grid_size\": 0 }"),
            Err(ConfigError::InvalidConfig(_))
        ));
        assert!(matches!(
            CellaConfig::from_json_str("not json"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn missing_file_reports_its_path() {
        let err = CellaConfig::from_json_file("/nonexistent/cella.json").expect_err("missing");
        assert!(err.to_string().contains("/nonexistent/cella.json"));
    }

    #[test]
    fn seeded_grid_is_reproducible() {
        let config = CellaConfig {
            grid_size: 32,
            max_color: 3,
            rng_seed: Some(42),
            ..CellaConfig::default()
        };
        let first = config.seeded_grid().expect("grid");
        let second = config.seeded_grid().expect("grid");
        assert_eq!(first, second);
        assert!(first.check_colors(3).is_ok());
        let live = first.live_count();
        assert!(live > 0 && live < 32 * 32, "density 0.2 left {live} live cells");
    }
}
