//! Remote image availability.

use std::sync::Arc;

use anyhow::Context;

use crate::command::InspectCommand;
use crate::executor::CommandExecutor;
use crate::image::ImageId;

/// Answers whether an image is already published.
pub trait ImageRegistry {
    fn is_available_remotely(&self, image: &ImageId) -> anyhow::Result<bool>;
}

/// [`ImageRegistry`] that asks the hub through `turbo hub inspect`.
///
/// A successful inspect means the image exists. A non-zero exit means it
/// does not; failing to launch turbo at all is an error.
pub struct TurboHub {
    executor: Arc<dyn CommandExecutor>,
    program: String,
}

impl TurboHub {
    pub fn new(executor: Arc<dyn CommandExecutor>, program: impl Into<String>) -> Self {
        Self {
            executor,
            program: program.into(),
        }
    }
}

impl ImageRegistry for TurboHub {
    fn is_available_remotely(&self, image: &ImageId) -> anyhow::Result<bool> {
        let command = InspectCommand::builder(&self.program)
            .image(image.to_string())
            .build()?;
        let result = self
            .executor
            .execute(&command.to_spec())
            .with_context(|| format!("failed to query hub for {}", image))?;

        if result.is_dry_run() {
            tracing::debug!("dry run: treating {} as not published", image);
            return Ok(false);
        }
        tracing::debug!("hub inspect {} exited with {:?}", image, result.code());
        Ok(result.success())
    }
}
