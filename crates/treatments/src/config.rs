//! Process wide runtime configuration.
//!
//! Applied once at startup: GDAL error routing and config options, the
//! debug retention switch for scratch artifacts, and the locations of the
//! external command line tools used by the legacy command path.

use std::path::PathBuf;
use std::sync::OnceLock;

use crate::{Error, Result};

/// Locations of the external GDAL command line tools
#[derive(Clone, Debug)]
pub struct CommandPaths {
    pub gdal_calc: PathBuf,
    pub gdal_merge: PathBuf,
    pub gdal_rasterize: PathBuf,
    pub gdal_warp: PathBuf,
    pub gdal_proximity: PathBuf,
}

impl Default for CommandPaths {
    fn default() -> Self {
        if cfg!(windows) {
            CommandPaths {
                gdal_calc: PathBuf::from("gdal_calc.bat"),
                gdal_merge: PathBuf::from("gdal_merge.bat"),
                gdal_rasterize: PathBuf::from("gdal_rasterize"),
                gdal_warp: PathBuf::from("gdalwarp"),
                gdal_proximity: PathBuf::from("gdal_proximity.bat"),
            }
        } else {
            CommandPaths {
                gdal_calc: PathBuf::from("gdal_calc.py"),
                gdal_merge: PathBuf::from("gdal_merge.py"),
                gdal_rasterize: PathBuf::from("gdal_rasterize"),
                gdal_warp: PathBuf::from("gdalwarp"),
                gdal_proximity: PathBuf::from("gdal_proximity.py"),
            }
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct RuntimeConfiguration {
    /// Forward the engine's debug output to the log
    pub debug_logging: bool,
    /// GDAL config options applied at startup
    pub config_options: Vec<(String, String)>,
    /// Keep scratch artifacts instead of removing them when an operation
    /// completes
    pub keep_artifacts: bool,
    pub commands: CommandPaths,
}

static CONFIG: OnceLock<RuntimeConfiguration> = OnceLock::new();

impl RuntimeConfiguration {
    /// Installs this configuration for the rest of the process lifetime
    /// and applies the GDAL side effects. May only be called once.
    pub fn apply(self) -> Result<()> {
        crate::gdalinterop::setup_logging(self.debug_logging);
        for (key, value) in &self.config_options {
            gdal::config::set_config_option(key, value)?;
        }

        CONFIG
            .set(self)
            .map_err(|_| Error::Internal("Runtime configuration was applied twice".to_string()))
    }
}

/// The installed configuration, or the defaults when none was applied
pub fn current() -> &'static RuntimeConfiguration {
    CONFIG.get_or_init(RuntimeConfiguration::default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_command_paths_match_the_platform() {
        let commands = CommandPaths::default();
        if cfg!(windows) {
            assert_eq!(commands.gdal_calc, PathBuf::from("gdal_calc.bat"));
        } else {
            assert_eq!(commands.gdal_calc, PathBuf::from("gdal_calc.py"));
        }
        assert_eq!(commands.gdal_warp, PathBuf::from("gdalwarp"));
    }

    #[test]
    fn current_falls_back_to_defaults() {
        assert!(!current().keep_artifacts);
    }
}
