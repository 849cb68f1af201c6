//! Environment-driven configuration: helper image discovery and CLI logging
//! defaults. See §6/§4.9.

use std::env;
use std::path::PathBuf;

use crate::error::FxError;

pub const HELPER_IMAGE_ENV_VAR: &str = "FX3_FLASH_PROG";
pub const CLI_LOG_LEVEL_ENV_VAR: &str = "FX3PROG_LOG";

/// Ordered list of candidate helper-image locations, probed when
/// [`HELPER_IMAGE_ENV_VAR`] is not set.
const CANDIDATE_PATHS: &[&str] = &[
    "./FX3_Flash_Prog.img",
    "./fw/FX3_Flash_Prog.img",
    "/usr/share/domesday-duplicator/FX3_Flash_Prog.img",
];

/// Resolves the path to the flash-programmer helper image.
///
/// If `FX3_FLASH_PROG` is set, its value is returned as-is, even if the
/// path doesn't exist -- the caller finds that out when it tries to open
/// it, and reports `FileIOFailure` rather than this function inventing a
/// second way to say "missing file".
pub fn resolve_helper_image_path() -> Result<PathBuf, FxError> {
    if let Ok(path) = env::var(HELPER_IMAGE_ENV_VAR) {
        return Ok(PathBuf::from(path));
    }
    first_existing(CANDIDATE_PATHS.iter().map(PathBuf::from)).ok_or(FxError::HelperImageMissing)
}

fn first_existing(candidates: impl Iterator<Item = PathBuf>) -> Option<PathBuf> {
    candidates.filter(|p: &PathBuf| p.is_file()).next()
}

/// Resolves the effective CLI log level.
///
/// `explicit` is whatever the caller already resolved from a flag or the
/// `FX3PROG_LOG` environment variable -- structopt's own `env = "FX3PROG_LOG"`
/// attribute on `--log-level` already gives an explicit flag priority over
/// the environment, so this function does not re-read the variable itself;
/// doing so would let `FX3PROG_LOG` silently override a flag the user did
/// pass. This only supplies the final fallback when neither was given.
pub fn cli_log_level(explicit: Option<log::LevelFilter>, default: log::LevelFilter) -> log::LevelFilter {
    explicit.unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_existing_skips_missing_candidates() {
        let dir = tempfile::tempdir().unwrap();
        let present = dir.path().join("helper.img");
        std::fs::write(&present, b"fake").unwrap();

        let missing = dir.path().join("does-not-exist.img");
        let found = first_existing(vec![missing, present.clone()].into_iter());
        assert_eq!(found, Some(present));
    }

    #[test]
    fn first_existing_returns_none_when_nothing_matches() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.img");
        assert_eq!(first_existing(std::iter::once(missing)), None);
    }

    #[test]
    fn log_level_env_var_name_matches_the_cli_flags_env_attribute() {
        // src/bin/fx3prog.rs can't reference this constant directly inside a
        // structopt derive attribute (it needs a string literal), so this
        // guards the two from drifting apart.
        assert_eq!(CLI_LOG_LEVEL_ENV_VAR, "FX3PROG_LOG");
    }

    #[test]
    fn cli_log_level_prefers_the_explicit_value_over_the_default() {
        let level = cli_log_level(Some(log::LevelFilter::Error), log::LevelFilter::Info);
        assert_eq!(level, log::LevelFilter::Error);
    }

    #[test]
    fn cli_log_level_falls_back_to_the_default_when_nothing_was_resolved() {
        let level = cli_log_level(None, log::LevelFilter::Warn);
        assert_eq!(level, log::LevelFilter::Warn);
    }
}
