use std::process::{Child, ChildStderr, ChildStdin, Command, Stdio};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::{Error, Result};

/// Grace between SIGTERM and SIGKILL at shutdown.
pub const KILL_GRACE: Duration = Duration::from_millis(100);

/// The spawned encoder with its pipes split out: the writer thread owns
/// stdin, the health monitor owns stderr, and the child handle itself is
/// shared for liveness probes and termination.
pub struct EncoderProcess {
    pub child: Arc<Mutex<Child>>,
    pub stdin: ChildStdin,
    pub stderr: ChildStderr,
}

/// Substitute `{width}`/`{height}` into the configured command line and
/// spawn the encoder.
pub fn spawn_encoder(command: &[String], width: u32, height: u32) -> Result<EncoderProcess> {
    let args: Vec<String> = command
        .iter()
        .map(|a| {
            a.replace("{width}", &width.to_string())
                .replace("{height}", &height.to_string())
        })
        .collect();
    let (program, rest) = args.split_first().ok_or(Error::EmptyCommand)?;

    info!(program = %program, "spawning encoder");
    debug!(?rest, "encoder arguments");

    let mut child = Command::new(program)
        .args(rest)
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()?;

    let stdin = child.stdin.take().expect("stdin was piped");
    let stderr = child.stderr.take().expect("stderr was piped");

    Ok(EncoderProcess {
        child: Arc::new(Mutex::new(child)),
        stdin,
        stderr,
    })
}

/// SIGTERM, wait out the grace period, then SIGKILL whatever is left.
pub fn terminate(child: &Arc<Mutex<Child>>) {
    #[cfg(unix)]
    {
        let pid = {
            let guard = child.lock().expect("child lock");
            guard.id() as libc::pid_t
        };
        unsafe {
            libc::kill(pid, libc::SIGTERM);
        }
        std::thread::sleep(KILL_GRACE);
    }

    let mut guard = child.lock().expect("child lock");
    match guard.try_wait() {
        Ok(Some(status)) => {
            info!(%status, "encoder exited");
        }
        Ok(None) => {
            warn!("encoder ignored SIGTERM, killing");
            let _ = guard.kill();
            let _ = guard.wait();
        }
        Err(e) => {
            warn!("could not reap encoder: {e}");
        }
    }
}
