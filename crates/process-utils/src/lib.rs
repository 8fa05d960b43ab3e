//! Child process helpers: windowless spawning and bounded termination.

use std::ffi::OsStr;

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

/// Apply the Windows `CREATE_NO_WINDOW` flag to child processes.
/// No-op elsewhere.
pub trait NoWindowExt {
    fn no_window(&mut self);
}

#[cfg(feature = "tokio")]
impl NoWindowExt for tokio::process::Command {
    fn no_window(&mut self) {
        #[cfg(windows)]
        {
            use std::os::windows::process::CommandExt;
            self.as_std_mut().creation_flags(CREATE_NO_WINDOW);
        }
    }
}

/// Create a `tokio::process::Command` with `CREATE_NO_WINDOW` applied on Windows.
#[cfg(feature = "tokio")]
pub fn tokio_command(program: impl AsRef<OsStr>) -> tokio::process::Command {
    let mut cmd = tokio::process::Command::new(program);
    cmd.no_window();
    cmd
}

/// How a child process ended after [`terminate`] was called.
#[cfg(feature = "tokio")]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// The child had already exited before the stop request.
    AlreadyExited(Option<i32>),
    /// The child honoured the quit request within the grace period.
    Graceful(Option<i32>),
    /// The grace period expired and the child was killed.
    Killed,
}

/// Stop a child process, first politely and then forcefully.
///
/// If the child's stdin is piped, `quit_input` is written to it (ffmpeg
/// finalises its outputs when it reads `q`). The child then gets `grace` to
/// exit on its own before it is killed. The function never waits longer
/// than `grace` plus the time the OS needs to reap a killed process.
#[cfg(feature = "tokio")]
pub async fn terminate(
    child: &mut tokio::process::Child,
    quit_input: &[u8],
    grace: std::time::Duration,
) -> std::io::Result<Termination> {
    use tokio::io::AsyncWriteExt;

    if let Some(status) = child.try_wait()? {
        return Ok(Termination::AlreadyExited(status.code()));
    }

    if let Some(mut stdin) = child.stdin.take() {
        // A closed pipe just means the child is already going away.
        let _ = stdin.write_all(quit_input).await;
        let _ = stdin.flush().await;
        drop(stdin);
    }

    match tokio::time::timeout(grace, child.wait()).await {
        Ok(status) => Ok(Termination::Graceful(status?.code())),
        Err(_) => {
            child.kill().await?;
            Ok(Termination::Killed)
        }
    }
}
