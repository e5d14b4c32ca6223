//! Turbo command-line client invocations.

use super::{Command, CommandArgsBuilder, FlagValueStyle, require};
use crate::error::SnapshotError;

/// Builder for `turbo import <type> <path> [--name=<image>] [--overwrite]`.
#[derive(Debug, Clone)]
pub struct ImportCommand {
    program: String,
    image_type: Option<String>,
    path: Option<String>,
    name: Option<String>,
    overwrite: bool,
}

impl ImportCommand {
    pub fn builder(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            image_type: None,
            path: None,
            name: None,
            overwrite: false,
        }
    }

    /// Source format of the imported file, e.g. `svm`.
    pub fn image_type(mut self, image_type: impl Into<String>) -> Self {
        self.image_type = Some(image_type.into());
        self
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Name to register the image under. Without it turbo picks a name.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    pub fn build(self) -> Result<Command, SnapshotError> {
        let image_type = require(self.image_type, "type")?;
        let path = require(self.path, "path")?;

        let mut args = CommandArgsBuilder::new();
        args.push_arg("import")
            .push_arg(image_type)
            .push_arg(path)
            .push_optional("--name", self.name.as_deref(), FlagValueStyle::Equals)
            .push_flag_if("--overwrite", self.overwrite);

        Ok(Command::new(self.program, args.into_args()))
    }
}

/// Builder for the remote availability query `turbo hub inspect <image>`.
#[derive(Debug, Clone)]
pub struct InspectCommand {
    program: String,
    image: Option<String>,
}

impl InspectCommand {
    pub fn builder(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            image: None,
        }
    }

    pub fn image(mut self, image: impl Into<String>) -> Self {
        self.image = Some(image.into());
        self
    }

    pub fn build(self) -> Result<Command, SnapshotError> {
        let image = require(self.image, "image")?;
        Ok(Command::new(
            self.program,
            vec!["hub".to_string(), "inspect".to_string(), image],
        ))
    }
}
