//! Vagrant lifecycle commands.

use super::{Command, CommandArgsBuilder};

/// The two Vagrant operations a snapshot run needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VagrantCommand {
    /// `vagrant up`: boots the box and runs the provisioning script.
    Up,
    /// `vagrant destroy --force`: removes the VM without prompting.
    Destroy,
}

impl VagrantCommand {
    /// Short label used when naming scheduled tasks.
    pub fn label(self) -> &'static str {
        match self {
            Self::Up => "vagrant up",
            Self::Destroy => "vagrant destroy",
        }
    }

    pub fn build(self) -> Command {
        let mut args = CommandArgsBuilder::new();
        match self {
            Self::Up => {
                args.push_arg("up");
            }
            Self::Destroy => {
                args.push_arg("destroy").push_flag_if("--force", true);
            }
        }
        Command::new("vagrant", args.into_args())
    }
}
