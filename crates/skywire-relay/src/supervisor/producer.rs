//! Producer executable resolution and command construction.

use std::path::{Path, PathBuf};

use skywire_core::config::{ProducerConfig, ProducerMode};

use super::types::{ProducerCommand, SupervisorConfig, SupervisorError};

impl ProducerCommand {
    /// Build the producer command for the configured mode.
    ///
    /// The simulator takes no arguments; the live bridge gets both serial
    /// links.
    pub fn from_config(config: &ProducerConfig) -> Self {
        match config.mode {
            ProducerMode::Simulator => Self::new(&config.simulator_bin),
            ProducerMode::Live => Self::new(&config.bridge_bin)
                .arg("--fc-device")
                .arg(&config.live.fc_device)
                .arg("--fc-baud")
                .arg(config.live.fc_baud.to_string())
                .arg("--radio-device")
                .arg(&config.live.radio_device)
                .arg("--radio-baud")
                .arg(config.live.radio_baud.to_string()),
        }
    }
}

impl From<&ProducerConfig> for SupervisorConfig {
    fn from(config: &ProducerConfig) -> Self {
        Self::new(ProducerCommand::from_config(config))
            .with_terminate_timeout(config.terminate_timeout())
            .with_startup_grace(config.startup_grace())
            .with_read_retry_delay(config.read_retry_delay())
    }
}

/// Directory holding the running relay binary.
pub fn install_dir() -> Option<PathBuf> {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
}

/// Resolve the producer executable.
///
/// Absolute paths must exist. Relative paths are looked up next to the relay
/// binary first; a bare program name that is not found there is left for
/// `PATH` lookup at spawn time.
pub fn resolve_program(
    program: &Path,
    install_dir: Option<&Path>,
) -> Result<PathBuf, SupervisorError> {
    if program.is_absolute() {
        return if program.exists() {
            Ok(program.to_path_buf())
        } else {
            Err(SupervisorError::ProducerNotFound {
                path: program.to_path_buf(),
            })
        };
    }

    if let Some(dir) = install_dir {
        let candidate = dir.join(program);
        if candidate.exists() {
            return Ok(candidate);
        }
    }

    if program.components().count() == 1 {
        return Ok(program.to_path_buf());
    }

    Err(SupervisorError::ProducerNotFound {
        path: program.to_path_buf(),
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn simulator_has_no_arguments() {
        let cmd = ProducerCommand::from_config(&ProducerConfig::default());
        assert_eq!(cmd.program, PathBuf::from("skywire-sim"));
        assert!(cmd.args.is_empty());
    }

    #[test]
    fn live_bridge_gets_both_links() {
        let config = ProducerConfig {
            mode: ProducerMode::Live,
            ..Default::default()
        };
        let cmd = ProducerCommand::from_config(&config);
        assert_eq!(cmd.program, PathBuf::from("skywire-bridge"));
        assert_eq!(
            cmd.args,
            [
                "--fc-device",
                "/dev/ttyACM0",
                "--fc-baud",
                "115200",
                "--radio-device",
                "/dev/ttyUSB0",
                "--radio-baud",
                "9600",
            ]
        );
    }

    #[test]
    fn relative_program_found_in_install_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("skywire-sim"), b"").unwrap();

        let resolved = resolve_program(Path::new("skywire-sim"), Some(dir.path())).unwrap();
        assert_eq!(resolved, dir.path().join("skywire-sim"));
    }

    #[test]
    fn bare_name_falls_back_to_path_lookup() {
        let dir = tempfile::tempdir().unwrap();
        let resolved = resolve_program(Path::new("skywire-sim"), Some(dir.path())).unwrap();
        assert_eq!(resolved, PathBuf::from("skywire-sim"));
    }

    #[test]
    fn missing_absolute_program_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("gone");
        let result = resolve_program(&missing, None);
        assert!(matches!(result, Err(SupervisorError::ProducerNotFound { .. })));
    }

    #[test]
    fn missing_nested_relative_program_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let result = resolve_program(Path::new("bin/producer"), Some(dir.path()));
        assert!(matches!(result, Err(SupervisorError::ProducerNotFound { .. })));
    }
}
