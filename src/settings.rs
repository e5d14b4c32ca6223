//! Install-script and startup-file strategies.
//!
//! Each setting is a closed enum: adding a strategy means adding a variant,
//! and the compiler then points at every `match` that has to handle it.
//! Strategy names that are not variants are rejected while the job file is
//! deserialized, before anything else runs.

use camino::{Utf8Path, Utf8PathBuf};
use serde::Deserialize;

use crate::environment::EnvironmentBuilder;
use crate::error::SnapshotError;

/// Silent-install arguments used when the job file does not specify any.
pub const DEFAULT_SILENT_INSTALL_ARGS: &str = "/S";

fn default_silent_install_args() -> String {
    DEFAULT_SILENT_INSTALL_ARGS.to_string()
}

fn require_path(path: &Utf8Path, field: &str) -> Result<(), SnapshotError> {
    if path.as_str().trim().is_empty() {
        return Err(SnapshotError::Config(format!("{} must not be empty", field)));
    }
    Ok(())
}

fn resolve_relative(path: &mut Utf8PathBuf, base_dir: &Utf8Path) {
    if !path.as_str().is_empty() && path.is_relative() {
        *path = base_dir.join(&*path);
    }
}

/// How the script that runs the installer inside the VM is obtained.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "strategy", rename_all = "lowercase")]
pub enum InstallScriptSettings {
    /// Use a script supplied by the user.
    Fixed {
        #[serde(default)]
        path: Utf8PathBuf,
    },
    /// Generate a script that runs the installer with silent arguments.
    Template {
        #[serde(default = "default_silent_install_args")]
        silent_install_args: String,
        #[serde(default)]
        ignore_exit_code: bool,
    },
}

impl Default for InstallScriptSettings {
    fn default() -> Self {
        Self::Template {
            silent_install_args: default_silent_install_args(),
            ignore_exit_code: false,
        }
    }
}

impl InstallScriptSettings {
    pub fn validate(&self) -> Result<(), SnapshotError> {
        match self {
            Self::Fixed { path } => require_path(path, "installScriptPath"),
            Self::Template { .. } => Ok(()),
        }
    }

    pub fn configure(&self, builder: EnvironmentBuilder) -> EnvironmentBuilder {
        match self {
            Self::Fixed { path } => builder.install_script_path(path.clone()),
            Self::Template {
                silent_install_args,
                ignore_exit_code,
            } => builder.generate_install_script(silent_install_args.clone(), *ignore_exit_code),
        }
    }

    /// Resolves a relative fixed script path against the job file directory.
    pub fn resolve_paths(&mut self, base_dir: &Utf8Path) {
        if let Self::Fixed { path } = self {
            resolve_relative(path, base_dir);
        }
    }
}

/// Which executable the captured image launches on start.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(tag = "strategy", rename_all = "lowercase")]
pub enum StartupFileSettings {
    /// Use the given path inside the image.
    Fixed {
        #[serde(default)]
        path: Utf8PathBuf,
    },
    /// Let the studio tool choose the startup file.
    #[default]
    Studio,
}

impl StartupFileSettings {
    pub fn validate(&self) -> Result<(), SnapshotError> {
        match self {
            Self::Fixed { path } => require_path(path, "startupFilePath"),
            Self::Studio => Ok(()),
        }
    }

    pub fn configure(&self, builder: EnvironmentBuilder) -> EnvironmentBuilder {
        match self {
            Self::Fixed { path } => builder.startup_file_path(path.clone()),
            Self::Studio => builder,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_install_script_requires_path() {
        let settings = InstallScriptSettings::Fixed {
            path: Utf8PathBuf::new(),
        };
        let err = settings.validate().unwrap_err();
        assert_eq!(err.to_string(), "configuration error: installScriptPath must not be empty");
    }

    #[test]
    fn test_fixed_install_script_whitespace_path_is_empty() {
        let settings = InstallScriptSettings::Fixed {
            path: Utf8PathBuf::from("  "),
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_template_install_script_always_valid() {
        let settings = InstallScriptSettings::Template {
            silent_install_args: String::new(),
            ignore_exit_code: true,
        };
        assert!(settings.validate().is_ok());
        assert!(InstallScriptSettings::default().validate().is_ok());
    }

    #[test]
    fn test_fixed_startup_file_requires_path() {
        let settings = StartupFileSettings::Fixed {
            path: Utf8PathBuf::new(),
        };
        let err = settings.validate().unwrap_err();
        assert!(err.to_string().contains("startupFilePath"));
        assert!(StartupFileSettings::Studio.validate().is_ok());
    }

    #[test]
    fn test_deserialize_template_defaults() {
        let settings: InstallScriptSettings = serde_yaml::from_str("strategy: template\n").unwrap();
        assert_eq!(settings, InstallScriptSettings::default());
    }

    #[test]
    fn test_deserialize_fixed_with_path() {
        let settings: InstallScriptSettings =
            serde_yaml::from_str("strategy: fixed\npath: scripts/install.bat\n").unwrap();
        assert_eq!(
            settings,
            InstallScriptSettings::Fixed {
                path: Utf8PathBuf::from("scripts/install.bat")
            }
        );
    }

    #[test]
    fn test_deserialize_unknown_strategy_fails() {
        let result: Result<StartupFileSettings, _> = serde_yaml::from_str("strategy: magic\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_resolve_paths_only_touches_relative_fixed_paths() {
        let mut fixed = InstallScriptSettings::Fixed {
            path: Utf8PathBuf::from("install.bat"),
        };
        fixed.resolve_paths(Utf8Path::new("/jobs"));
        assert_eq!(
            fixed,
            InstallScriptSettings::Fixed {
                path: Utf8PathBuf::from("/jobs/install.bat")
            }
        );

        let mut empty = InstallScriptSettings::Fixed {
            path: Utf8PathBuf::new(),
        };
        empty.resolve_paths(Utf8Path::new("/jobs"));
        assert!(empty.validate().is_err());
    }
}
