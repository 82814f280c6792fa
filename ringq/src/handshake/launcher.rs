use std::io;
use std::path::PathBuf;
use std::process::{Child, Command};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, info, warn};

/// Starts sender `index` for the queue named `queue`.
///
/// The queue name and index are the only things a sender is told; it derives
/// every other resource name itself.
pub trait SenderLauncher {
    fn launch(&mut self, queue: &str, index: u32) -> io::Result<()>;
}

/// Launched sender processes, shared so a termination handler can stop them.
#[derive(Clone, Default)]
pub struct Children {
    inner: Arc<Mutex<Vec<(u32, Child)>>>,
}

impl Children {
    fn list(&self) -> MutexGuard<'_, Vec<(u32, Child)>> {
        // a panic elsewhere must not keep children alive
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn push(&self, index: u32, child: Child) {
        self.list().push((index, child));
    }

    /// Number of launched senders that have not exited yet.
    pub fn running(&self) -> usize {
        self.list()
            .iter_mut()
            .filter_map(|(_, child)| child.try_wait().ok())
            .filter(Option::is_none)
            .count()
    }

    /// Kills and reaps every sender still running. Returns how many were
    /// killed.
    pub fn terminate_all(&self) -> usize {
        let mut killed = 0;
        for (index, child) in self.list().iter_mut() {
            if let Ok(None) = child.try_wait() {
                debug!(index = *index, "terminating sender");
                let _ = child.kill();
                let _ = child.wait();
                killed += 1;
            }
        }
        killed
    }
}

/// Launches senders as child processes, terminating any still running when
/// dropped.
pub struct ProcessLauncher {
    program: PathBuf,
    prefix: Vec<String>,
    args: Vec<String>,
    children: Children,
}

impl ProcessLauncher {
    pub fn new<P: Into<PathBuf>>(program: P) -> ProcessLauncher {
        ProcessLauncher {
            program: program.into(),
            prefix: Vec::new(),
            args: Vec::new(),
            children: Children::default(),
        }
    }

    /// Runs every sender through `prefix`, e.g. `["xterm", "-e"]`.
    pub fn with_prefix(mut self, prefix: Vec<String>) -> ProcessLauncher {
        self.prefix = prefix;
        self
    }

    /// Extra arguments appended after `--name` and `--index`.
    pub fn with_args(mut self, args: Vec<String>) -> ProcessLauncher {
        self.args = args;
        self
    }

    pub fn command(&self, queue: &str, index: u32) -> Command {
        let mut command = match self.prefix.split_first() {
            Some((wrapper, rest)) => {
                let mut command = Command::new(wrapper);
                command.args(rest).arg(&self.program);
                command
            }
            None => Command::new(&self.program),
        };
        command
            .arg("--name")
            .arg(queue)
            .arg("--index")
            .arg(index.to_string())
            .args(&self.args);
        command
    }

    /// Handle on the launched senders that outlives this launcher's borrow.
    pub fn children(&self) -> Children {
        self.children.clone()
    }

    pub fn running(&self) -> usize {
        self.children.running()
    }

    /// Waits for every launched sender to exit and returns the ones that
    /// exited unsuccessfully.
    pub fn wait_all(&mut self) -> io::Result<Vec<u32>> {
        let children: Vec<_> = self.children.list().drain(..).collect();
        let mut failed = Vec::new();
        for (index, mut child) in children {
            let status = child.wait()?;
            if !status.success() {
                warn!(index, %status, "sender exited unsuccessfully");
                failed.push(index);
            }
        }
        Ok(failed)
    }
}

impl SenderLauncher for ProcessLauncher {
    fn launch(&mut self, queue: &str, index: u32) -> io::Result<()> {
        let child = self.command(queue, index).spawn()?;
        info!(index, pid = child.id(), "launched sender");
        self.children.push(index, child);
        Ok(())
    }
}

impl Drop for ProcessLauncher {
    fn drop(&mut self) {
        self.children.terminate_all();
    }
}
