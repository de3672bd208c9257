// NetGather - app/session.rs
//
// The seam between the executor and whatever actually talks to devices.
//
// A `SessionProvider` opens one `Session` per target; the session is asked
// to disable paging and then to run the command. Every failure comes back
// as a classified `SessionFailure`, never as a panic or an error that
// aborts the run.

use crate::core::model::{SessionFailure, Target};
use crate::util::constants;
use std::fmt;
use std::time::Duration;

/// Login credentials shared by every target in a run.
#[derive(Clone, Default)]
pub struct Credentials {
    pub username: String,
    password: Option<String>,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: Option<String>) -> Self {
        Self {
            username: username.into(),
            password: password.filter(|p| !p.is_empty()),
        }
    }

    pub fn password(&self) -> Option<&str> {
        self.password.as_deref()
    }
}

// Passwords never reach logs, even at trace level.
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "********"))
            .finish()
    }
}

/// Everything a provider needs to open a session to one target.
#[derive(Debug, Clone)]
pub struct SessionRequest {
    pub target: Target,
    pub credentials: Credentials,
    /// Target type, e.g. `cisco_ios`.
    pub device_type: String,
    /// Per-target budget for connecting and running the command.
    pub timeout: Duration,
}

/// An open session to one device.
pub trait Session: Send {
    /// Turn off output paging. The default sends `terminal length 0` and
    /// discards the reply; sessions with no pager override it.
    fn disable_paging(&mut self) -> Result<(), SessionFailure> {
        self.send_command(
            constants::DISABLE_PAGING_COMMAND,
            Duration::from_secs(constants::PAGING_TIMEOUT_SECS),
        )
        .map(|_| ())
    }

    /// Run `command` and return its complete output.
    fn send_command(&mut self, command: &str, timeout: Duration) -> Result<String, SessionFailure>;
}

/// Opens sessions. Shared across worker threads for the whole run.
pub trait SessionProvider: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &str;

    fn open(&self, request: &SessionRequest) -> Result<Box<dyn Session>, SessionFailure>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credentials_debug_redacts_password() {
        let creds = Credentials::new("admin", Some("hunter2".into()));
        let debug = format!("{creds:?}");
        assert!(debug.contains("admin"));
        assert!(!debug.contains("hunter2"));
        assert_eq!(creds.password(), Some("hunter2"));
    }

    struct Recorder(Vec<String>);

    impl Session for Recorder {
        fn send_command(&mut self, command: &str, _timeout: Duration) -> Result<String, SessionFailure> {
            self.0.push(command.to_string());
            Ok(String::new())
        }
    }

    #[test]
    fn test_default_paging_sends_terminal_length() {
        let mut session = Recorder(Vec::new());
        session.disable_paging().unwrap();
        session.send_command("show clock", Duration::from_secs(1)).unwrap();
        assert_eq!(session.0, vec!["terminal length 0", "show clock"]);
    }

    #[test]
    fn test_empty_password_is_none() {
        assert_eq!(Credentials::new("admin", Some(String::new())).password(), None);
    }
}
