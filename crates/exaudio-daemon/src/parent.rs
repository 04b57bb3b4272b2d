//! Controlling-parent liveness
//!
//! When the parent VM dies the port process is reparented, so a change of
//! parent pid means nobody is listening anymore.

#[derive(Debug, Clone, Copy)]
pub struct ParentWatch {
    initial: Option<u32>,
}

impl ParentWatch {
    /// Watch the parent this process has right now
    pub fn current() -> Self {
        Self {
            initial: parent_pid(),
        }
    }

    /// A watch that always reports the parent alive
    pub fn disabled() -> Self {
        Self { initial: None }
    }

    /// False for a watch made by [`ParentWatch::disabled`]
    pub fn is_enabled(&self) -> bool {
        self.initial.is_some()
    }

    pub fn is_alive(&self) -> bool {
        match self.initial {
            Some(pid) => parent_pid() == Some(pid),
            None => true,
        }
    }
}

#[cfg(unix)]
fn parent_pid() -> Option<u32> {
    Some(std::os::unix::process::parent_id())
}

#[cfg(not(unix))]
fn parent_pid() -> Option<u32> {
    None
}
