//! YAML job file.
//!
//! A job file describes one snapshot project: where its workspace lives, how
//! the install script and startup file are obtained, the host-wide defaults
//! (box, studio and turbo paths) and how the task scheduler is polled.

use std::fs::File;
use std::io::BufReader;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Deserialize;

use crate::error::SnapshotError;
use crate::scheduled_task::SchedulerOptions;
use crate::settings::{InstallScriptSettings, StartupFileSettings};
use crate::snapshot::{BuildContext, BuildResult, SnapshotJob};

/// Box used when neither the job nor the defaults name one.
pub const DEFAULT_VAGRANT_BOX: &str = "opentable/win-2012r2-standard-amd64-nocm";
/// Turbo client looked up on `PATH` when no explicit path is given.
pub const DEFAULT_TURBO_PATH: &str = "turbo";

fn default_vagrant_box() -> String {
    DEFAULT_VAGRANT_BOX.to_string()
}

fn default_turbo_path() -> String {
    DEFAULT_TURBO_PATH.to_string()
}

fn default_poll_interval_secs() -> u64 {
    10
}

fn default_timeout_secs() -> u64 {
    4 * 60 * 60
}

fn resolve(path: &mut Utf8PathBuf, base_dir: &Utf8Path) {
    if !path.as_str().is_empty() && path.is_relative() {
        *path = base_dir.join(&*path);
    }
}

fn is_blank(value: &str) -> bool {
    value.trim().is_empty()
}

/// Host-wide settings shared by every job on a build agent.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Defaults {
    #[serde(default = "default_vagrant_box")]
    pub vagrant_box: String,
    #[serde(default)]
    pub studio_path: Option<Utf8PathBuf>,
    #[serde(default)]
    pub studio_license_path: Option<Utf8PathBuf>,
    #[serde(default = "default_turbo_path")]
    pub turbo_path: String,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            vagrant_box: default_vagrant_box(),
            studio_path: None,
            studio_license_path: None,
            turbo_path: default_turbo_path(),
        }
    }
}

/// Task scheduler polling and placement.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SchedulerConfig {
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// Zero disables the timeout.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Where VM working directories are created; the system temp directory
    /// when unset.
    #[serde(default)]
    pub work_root: Option<Utf8PathBuf>,
    #[serde(default)]
    pub run_as_user: Option<String>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
            timeout_secs: default_timeout_secs(),
            work_root: None,
            run_as_user: None,
        }
    }
}

impl SchedulerConfig {
    pub fn options(&self) -> SchedulerOptions {
        SchedulerOptions {
            poll_interval: Duration::from_secs(self.poll_interval_secs),
            timeout: (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs)),
            run_as_user: self.run_as_user.clone(),
        }
    }
}

/// One snapshot job as read from YAML.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Profile {
    pub project: String,
    pub workspace: Utf8PathBuf,
    #[serde(default)]
    pub overwrite: bool,
    /// Overrides `defaults.vagrant_box` for this job.
    #[serde(default)]
    pub vagrant_box: Option<String>,
    #[serde(default)]
    pub defaults: Defaults,
    #[serde(default)]
    pub install_script: InstallScriptSettings,
    #[serde(default)]
    pub startup_file: StartupFileSettings,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

impl Profile {
    /// Resolves every relative host path against `base_dir`.
    pub fn resolve_paths(&mut self, base_dir: &Utf8Path) {
        resolve(&mut self.workspace, base_dir);
        if let Some(path) = &mut self.defaults.studio_path {
            resolve(path, base_dir);
        }
        if let Some(path) = &mut self.defaults.studio_license_path {
            resolve(path, base_dir);
        }
        if let Some(path) = &mut self.scheduler.work_root {
            resolve(path, base_dir);
        }
        self.install_script.resolve_paths(base_dir);
    }

    /// Box for this job, falling back to the host default.
    pub fn vagrant_box(&self) -> &str {
        self.vagrant_box
            .as_deref()
            .unwrap_or(&self.defaults.vagrant_box)
    }

    /// Runs every check that can fail before a VM is created.
    pub fn validate(&self) -> Result<(), SnapshotError> {
        if is_blank(&self.project) {
            return Err(SnapshotError::Config("project must not be empty".to_string()));
        }
        if is_blank(self.workspace.as_str()) {
            return Err(SnapshotError::Config("workspace must not be empty".to_string()));
        }
        if is_blank(self.vagrant_box()) {
            return Err(SnapshotError::Config("vagrantBox must not be empty".to_string()));
        }
        match &self.defaults.studio_path {
            Some(path) if !is_blank(path.as_str()) => {}
            _ => {
                return Err(SnapshotError::Config(
                    "xStudioPath must not be empty".to_string(),
                ));
            }
        }
        if is_blank(&self.defaults.turbo_path) {
            return Err(SnapshotError::Config("turboPath must not be empty".to_string()));
        }
        if self.scheduler.poll_interval_secs == 0 {
            return Err(SnapshotError::Config(
                "scheduler.poll_interval_secs must be greater than zero".to_string(),
            ));
        }

        self.install_script.validate()?;
        self.startup_file.validate()?;
        Ok(())
    }

    /// Settings the snapshot workflow runs with.
    pub fn job(&self) -> SnapshotJob {
        SnapshotJob {
            vagrant_box: self.vagrant_box().to_string(),
            studio_path: self.defaults.studio_path.clone().unwrap_or_default(),
            studio_license_path: self.defaults.studio_license_path.clone(),
            turbo_path: self.defaults.turbo_path.clone(),
            overwrite: self.overwrite,
            install_script: self.install_script.clone(),
            startup_file: self.startup_file.clone(),
            work_root: self.scheduler.work_root.clone(),
        }
    }

    pub fn build_context(&self, current_result: Option<BuildResult>, dry_run: bool) -> BuildContext {
        BuildContext {
            project_name: self.project.clone(),
            workspace: self.workspace.clone(),
            current_result,
            keep_workspace: dry_run,
        }
    }
}

/// Loads a job file, resolving relative paths against its directory.
pub fn load_profile(path: &Utf8Path) -> Result<Profile, SnapshotError> {
    let file =
        File::open(path).map_err(|e| SnapshotError::io(format!("failed to load file: {}", path), e))?;
    let reader = BufReader::new(file);
    let mut profile: Profile = serde_yaml::from_reader(reader)
        .map_err(|e| SnapshotError::Config(format!("failed to parse yaml: {}: {}", path, e)))?;

    let base_dir = match path.parent() {
        Some(parent) if !parent.as_str().is_empty() => parent.to_owned(),
        _ => Utf8PathBuf::from("."),
    };
    profile.resolve_paths(&base_dir);
    tracing::debug!("loaded profile for project '{}' from {}", profile.project, path);
    Ok(profile)
}
