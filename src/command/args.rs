//! Shared argument-list builder for the commands issued by a snapshot run.

/// Defines how a flag and its value are rendered in command arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlagValueStyle {
    /// Render flag and value as separate arguments: `/o value`.
    Separate,
    /// Render flag and value as a single argument with equals: `--name=value`.
    Equals,
}

/// Builder for assembling command arguments consistently across commands.
#[derive(Debug, Default)]
pub struct CommandArgsBuilder {
    args: Vec<String>,
}

impl CommandArgsBuilder {
    /// Create a new, empty builder.
    pub fn new() -> Self {
        Self { args: Vec::new() }
    }

    /// Append a raw argument to the builder.
    pub fn push_arg(&mut self, arg: impl Into<String>) -> &mut Self {
        self.args.push(arg.into());
        self
    }

    /// Append a flag with no value when `enabled` is true.
    pub fn push_flag_if(&mut self, flag: &str, enabled: bool) -> &mut Self {
        if enabled {
            self.args.push(flag.to_string());
        }
        self
    }

    /// Append a flag with value if the value is not empty.
    pub fn push_flag_value(&mut self, flag: &str, value: &str, style: FlagValueStyle) -> &mut Self {
        if value.is_empty() {
            return self;
        }

        match style {
            FlagValueStyle::Separate => {
                self.args.push(flag.to_string());
                self.args.push(value.to_string());
            }
            FlagValueStyle::Equals => {
                self.args.push(format!("{}={}", flag, value));
            }
        }
        self
    }

    /// Append a flag with value when `value` is present and not empty.
    pub fn push_optional(
        &mut self,
        flag: &str,
        value: Option<&str>,
        style: FlagValueStyle,
    ) -> &mut Self {
        if let Some(value) = value {
            self.push_flag_value(flag, value, style);
        }
        self
    }

    /// Return the collected arguments.
    pub fn into_args(self) -> Vec<String> {
        self.args
    }
}
