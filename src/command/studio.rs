//! Studio tool invocations run inside the guest VM.

use super::{Command, CommandArgsBuilder, FlagValueStyle, require};
use crate::error::SnapshotError;

/// Builder for `<studio> <xappl> /o <image> [/startupfile <file>] [/l <license>]`.
#[derive(Debug, Clone)]
pub struct StudioBuildCommand {
    studio_path: String,
    license_path: Option<String>,
    xappl_path: Option<String>,
    image_path: Option<String>,
    startup_file_path: Option<String>,
}

impl StudioBuildCommand {
    pub fn builder(studio_path: impl Into<String>) -> Self {
        Self {
            studio_path: studio_path.into(),
            license_path: None,
            xappl_path: None,
            image_path: None,
            startup_file_path: None,
        }
    }

    pub fn license_path(mut self, path: impl Into<String>) -> Self {
        self.license_path = Some(path.into());
        self
    }

    pub fn xappl_path(mut self, path: impl Into<String>) -> Self {
        self.xappl_path = Some(path.into());
        self
    }

    pub fn image_path(mut self, path: impl Into<String>) -> Self {
        self.image_path = Some(path.into());
        self
    }

    pub fn startup_file_path(mut self, path: impl Into<String>) -> Self {
        self.startup_file_path = Some(path.into());
        self
    }

    pub fn build(self) -> Result<Command, SnapshotError> {
        let xappl_path = require(self.xappl_path, "xapplPath")?;
        let image_path = require(self.image_path, "imagePath")?;

        let mut args = CommandArgsBuilder::new();
        args.push_arg(xappl_path)
            .push_flag_value("/o", &image_path, FlagValueStyle::Separate)
            .push_optional("/startupfile", self.startup_file_path.as_deref(), FlagValueStyle::Separate)
            .push_optional("/l", self.license_path.as_deref(), FlagValueStyle::Separate);

        Ok(Command::new(self.studio_path, args.into_args()))
    }
}

/// The two halves of a studio snapshot: capture the clean machine state
/// before the installer runs and diff against it afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StudioSnapshotCommand {
    Before,
    After,
}

impl StudioSnapshotCommand {
    /// Renders the snapshot step.
    ///
    /// `snapshot_dir` holds the "before" state; the "after" step writes the
    /// resulting configuration into `output_dir`, which is required for it.
    pub fn build(
        self,
        studio_path: &str,
        snapshot_dir: &str,
        output_dir: Option<&str>,
        license_path: Option<&str>,
    ) -> Result<Command, SnapshotError> {
        let mut args = CommandArgsBuilder::new();
        match self {
            Self::Before => {
                args.push_arg("/before")
                    .push_flag_value("/beforepath", snapshot_dir, FlagValueStyle::Separate);
            }
            Self::After => {
                let output_dir = require(output_dir, "outputDir")?;
                args.push_arg("/after")
                    .push_flag_value("/beforepath", snapshot_dir, FlagValueStyle::Separate)
                    .push_flag_value("/o", output_dir, FlagValueStyle::Separate);
            }
        }
        args.push_optional("/l", license_path, FlagValueStyle::Separate);

        Ok(Command::new(studio_path, args.into_args()))
    }
}
