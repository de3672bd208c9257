// NetGather - app/ssh.rs
//
// Session provider backed by the system OpenSSH client.
//
// Each command runs as `ssh [options] host command` on an exec channel, so
// there is no pager to disable and paging priming is a no-op. When a password is supplied the client is
// wrapped in `sshpass -e`, which reads it from the SSHPASS environment
// variable; the password never appears on a command line.
//
// The child is polled until it exits or the per-command deadline passes;
// on the deadline it is killed and the target classified as a timeout.

use crate::app::session::{Session, SessionProvider, SessionRequest};
use crate::core::model::{FailureKind, SessionFailure};
use crate::util::constants;
use std::io::{self, Read};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// How to invoke the ssh client.
#[derive(Debug, Clone)]
pub struct SshConfig {
    pub program: String,
    pub sshpass_program: String,
    pub port: u16,
    /// Passed to ssh before the host argument.
    pub extra_args: Vec<String>,
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            program: constants::DEFAULT_SSH_PROGRAM.to_string(),
            sshpass_program: constants::DEFAULT_SSHPASS_PROGRAM.to_string(),
            port: constants::DEFAULT_SSH_PORT,
            extra_args: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SshSessionProvider {
    config: SshConfig,
}

impl SshSessionProvider {
    pub fn new(config: SshConfig) -> Self {
        Self { config }
    }
}

impl SessionProvider for SshSessionProvider {
    fn name(&self) -> &str {
        "openssh"
    }

    fn open(&self, request: &SessionRequest) -> Result<Box<dyn Session>, SessionFailure> {
        Ok(Box::new(SshSession {
            config: self.config.clone(),
            request: request.clone(),
        }))
    }
}

struct SshSession {
    config: SshConfig,
    request: SessionRequest,
}

impl SshSession {
    fn build_command(&self, command: &str, timeout: Duration) -> Command {
        let password = self.request.credentials.password();
        let mut cmd = match password {
            Some(pw) => {
                let mut cmd = Command::new(&self.config.sshpass_program);
                cmd.arg("-e").arg(&self.config.program).env("SSHPASS", pw);
                cmd
            }
            None => Command::new(&self.config.program),
        };

        let connect_secs = timeout.as_secs().max(1);
        cmd.arg("-T")
            .arg("-p")
            .arg(self.config.port.to_string())
            .arg("-o")
            .arg(format!("ConnectTimeout={connect_secs}"));
        if password.is_some() {
            cmd.arg("-o")
                .arg("BatchMode=no")
                .arg("-o")
                .arg("PreferredAuthentications=password,keyboard-interactive");
        } else {
            cmd.arg("-o").arg("BatchMode=yes");
        }
        if !self.request.credentials.username.is_empty() {
            cmd.arg("-l").arg(&self.request.credentials.username);
        }
        cmd.args(&self.config.extra_args)
            .arg(&self.request.target.host)
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        cmd
    }
}

impl Session for SshSession {
    // Each command gets its own exec channel, which has no pager.
    fn disable_paging(&mut self) -> Result<(), SessionFailure> {
        Ok(())
    }

    fn send_command(&mut self, command: &str, timeout: Duration) -> Result<String, SessionFailure> {
        let mut cmd = self.build_command(command, timeout);
        let program = cmd.get_program().to_string_lossy().into_owned();

        let mut child = cmd.spawn().map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                SessionFailure::unavailable(format!("'{program}' is not installed or not on PATH"))
            } else {
                SessionFailure::unknown(format!("failed to start '{program}': {e}"))
            }
        })?;

        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let status = wait_with_deadline(&mut child, timeout);
        let stdout = join_output(stdout);
        let stderr = join_output(stderr);

        match status {
            Ok(Some(status)) => classify(status, stdout, &stderr),
            Ok(None) => {
                tracing::debug!(target = %self.request.target, "ssh killed at deadline");
                Err(SessionFailure::timeout(timeout))
            }
            Err(e) => Err(SessionFailure::unknown(format!("waiting for '{program}': {e}"))),
        }
    }
}

/// Read a pipe to the end on a helper thread so a chatty child never
/// blocks on a full pipe while we poll it.
fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Option<JoinHandle<Vec<u8>>> {
    pipe.map(|mut pipe| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = pipe.read_to_end(&mut buf);
            buf
        })
    })
}

fn join_output(handle: Option<JoinHandle<Vec<u8>>>) -> String {
    handle
        .and_then(|h| h.join().ok())
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
        .unwrap_or_default()
}

/// `Ok(None)` means the deadline passed and the child was killed.
fn wait_with_deadline(child: &mut Child, timeout: Duration) -> io::Result<Option<ExitStatus>> {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if Instant::now() >= deadline {
            let _ = child.kill();
            let _ = child.wait();
            return Ok(None);
        }
        thread::sleep(Duration::from_millis(constants::CHILD_POLL_INTERVAL_MS));
    }
}

/// Map the client's exit status and stderr onto a failure kind.
fn classify(status: ExitStatus, stdout: String, stderr: &str) -> Result<String, SessionFailure> {
    if status.success() {
        return Ok(stdout);
    }
    let detail = stderr.trim();
    let lower = detail.to_lowercase();

    if status.code() == Some(constants::SSH_TRANSPORT_EXIT_CODE) {
        if lower.contains("permission denied") {
            return Err(SessionFailure::authentication());
        }
        if lower.contains("timed out") {
            return Err(SessionFailure::new(FailureKind::Timeout, detail));
        }
        return Err(SessionFailure::transport(detail));
    }
    // sshpass reports a rejected password with exit status 5.
    if lower.contains("permission denied") {
        return Err(SessionFailure::authentication());
    }
    // Devices often return non-zero for rejected commands but still print
    // their error text; keep it as output.
    if !stdout.trim().is_empty() {
        return Ok(stdout);
    }
    Err(SessionFailure::unknown(if detail.is_empty() {
        format!("exit status {status}")
    } else {
        detail.to_string()
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::session::Credentials;
    use crate::core::model::Target;

    fn request(password: Option<&str>) -> SessionRequest {
        SessionRequest {
            target: Target::new(0, "core-r1"),
            credentials: Credentials::new("admin", password.map(str::to_string)),
            device_type: "cisco_ios".into(),
            timeout: Duration::from_secs(10),
        }
    }

    fn args(cmd: &Command) -> Vec<String> {
        cmd.get_args().map(|a| a.to_string_lossy().into_owned()).collect()
    }

    #[test]
    fn test_key_auth_command_line() {
        let session = SshSession {
            config: SshConfig::default(),
            request: request(None),
        };
        let cmd = session.build_command("show version", Duration::from_secs(10));
        assert_eq!(cmd.get_program(), "ssh");
        let args = args(&cmd);
        assert!(args.contains(&"BatchMode=yes".to_string()));
        assert!(args.contains(&"ConnectTimeout=10".to_string()));
        assert_eq!(&args[args.len() - 2..], ["core-r1", "show version"]);
    }

    #[test]
    fn test_password_goes_through_environment() {
        let session = SshSession {
            config: SshConfig::default(),
            request: request(Some("s3cret")),
        };
        let cmd = session.build_command("show version", Duration::from_secs(10));
        assert_eq!(cmd.get_program(), "sshpass");
        assert!(!args(&cmd).iter().any(|a| a.contains("s3cret")));
        let env: Vec<_> = cmd.get_envs().collect();
        assert!(env
            .iter()
            .any(|(k, v)| *k == "SSHPASS" && v.map(|v| v == "s3cret").unwrap_or(false)));
    }

    #[test]
    fn test_missing_program_is_transport_unavailable() {
        let mut session = SshSession {
            config: SshConfig {
                program: "netgather-no-such-ssh-binary".into(),
                ..Default::default()
            },
            request: request(None),
        };
        let failure = session
            .send_command("show version", Duration::from_secs(5))
            .unwrap_err();
        assert_eq!(failure.kind, FailureKind::TransportUnavailable);
    }

    #[cfg(unix)]
    #[test]
    fn test_classify_exit_codes() {
        use std::os::unix::process::ExitStatusExt;

        let exit = |code: i32| ExitStatus::from_raw(code << 8);

        assert_eq!(classify(exit(0), "out".into(), "").unwrap(), "out");
        assert_eq!(
            classify(exit(255), String::new(), "admin@r1: Permission denied (password).")
                .unwrap_err()
                .kind,
            FailureKind::Authentication
        );
        assert_eq!(
            classify(exit(255), String::new(), "ssh: connect to host r1 port 22: Connection timed out")
                .unwrap_err()
                .kind,
            FailureKind::Timeout
        );
        assert_eq!(
            classify(exit(255), String::new(), "ssh: connect to host r1 port 22: Connection refused")
                .unwrap_err()
                .kind,
            FailureKind::Transport
        );
        assert_eq!(
            classify(exit(1), String::new(), "something odd").unwrap_err(),
            SessionFailure::unknown("something odd")
        );
        assert_eq!(
            classify(exit(1), "% Invalid input".into(), "").unwrap(),
            "% Invalid input"
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_hung_child_is_killed_at_deadline() {
        let mut child = Command::new("sleep")
            .arg("5")
            .stdout(Stdio::null())
            .spawn()
            .unwrap();
        let started = Instant::now();
        let status = wait_with_deadline(&mut child, Duration::from_millis(200)).unwrap();
        assert!(status.is_none());
        assert!(started.elapsed() < Duration::from_secs(3));
    }
}
