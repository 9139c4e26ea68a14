use crate::conf::TargetConf;
use std::convert::TryFrom;
use std::fmt;
use std::io;
use std::net::{AddrParseError, IpAddr, SocketAddr};
use std::time::Duration;
use thiserror::Error;

/// Which side of the comparison a probe endpoint sits on. The anomaly under
/// investigation only affects `Local` endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetClass {
    Local,
    Internet,
}

impl fmt::Display for TargetClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetClass::Local => write!(f, "local"),
            TargetClass::Internet => write!(f, "internet"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Target {
    pub class: TargetClass,
    pub ip: IpAddr,
    pub port: u16,
}

impl Target {
    pub fn addr(&self) -> SocketAddr {
        SocketAddr::new(self.ip, self.port)
    }

    /// Rendering used in report lines, e.g. `local 10.8.100.100:6379`.
    pub fn endpoint(&self) -> String {
        format!("{} {}:{}", self.class, self.ip, self.port)
    }
}

impl TryFrom<(TargetClass, &TargetConf)> for Target {
    type Error = AddrParseError;

    fn try_from((class, c): (TargetClass, &TargetConf)) -> Result<Self, Self::Error> {
        let ip = c.host.parse::<IpAddr>()?;
        Ok(Self {
            class,
            ip,
            port: c.port,
        })
    }
}

/// Failure taxonomy for a single probe attempt. Classified and printed,
/// never propagated as a process fault.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("socket failed: {0}")]
    Socket(io::Error),
    #[error("connect failed: {0}")]
    Connect(io::Error),
    #[error("connect timed out after {}s", .0.as_secs())]
    Timeout(Duration),
    /// Readiness arrived but SO_ERROR carries a deferred failure. The
    /// host-unreachable / no-route class shows up here.
    #[error("connect failed: {0}")]
    Rejected(io::Error),
    #[error("{program} failed: {detail}")]
    Helper { program: String, detail: String },
    #[error("{0}")]
    Protocol(String),
}

/// Outcome of one connectivity attempt. Built fresh per attempt and handed
/// straight to the reporter.
#[derive(Debug)]
pub struct ProbeResult {
    pub check: String,
    pub target: String,
    pub elapsed: Duration,
    pub error: Option<ProbeError>,
    /// Raw external-tool output, printed indented under the result line.
    pub output: Option<String>,
}

impl ProbeResult {
    pub fn ok(check: impl Into<String>, target: impl Into<String>, elapsed: Duration) -> Self {
        Self {
            check: check.into(),
            target: target.into(),
            elapsed,
            error: None,
            output: None,
        }
    }

    pub fn failed(
        check: impl Into<String>,
        target: impl Into<String>,
        elapsed: Duration,
        error: ProbeError,
    ) -> Self {
        Self {
            check: check.into(),
            target: target.into(),
            elapsed,
            error: Some(error),
            output: None,
        }
    }

    pub fn with_output(mut self, output: impl Into<String>) -> Self {
        self.output = Some(output.into());
        self
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Controlling-terminal observation relative to the previous cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TtyTransition {
    /// First cycle, nothing to compare against.
    Baseline(bool),
    Unchanged(bool),
    /// Attached last cycle, detached now. Flagged exactly once.
    Lost,
    Regained,
}

/// Process-wide sampler state: the cycle counter and the last observed
/// controlling-terminal flag. Owned by the sampler, lives for the process.
#[derive(Debug, Default)]
pub struct SamplerState {
    cycle: u64,
    tty_attached: Option<bool>,
}

impl SamplerState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_cycle(&mut self) -> u64 {
        self.cycle += 1;
        self.cycle
    }

    pub fn observe_tty(&mut self, attached: bool) -> TtyTransition {
        let transition = match self.tty_attached {
            None => TtyTransition::Baseline(attached),
            Some(true) if !attached => TtyTransition::Lost,
            Some(false) if attached => TtyTransition::Regained,
            Some(_) => TtyTransition::Unchanged(attached),
        };
        self.tty_attached = Some(attached);
        transition
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cycle_counter_is_monotonic() {
        let mut state = SamplerState::new();
        assert_eq!(state.next_cycle(), 1);
        assert_eq!(state.next_cycle(), 2);
        assert_eq!(state.next_cycle(), 3);
    }

    #[test]
    fn first_observation_is_baseline_never_flagged() {
        let mut state = SamplerState::new();
        assert_eq!(state.observe_tty(true), TtyTransition::Baseline(true));

        let mut state = SamplerState::new();
        assert_eq!(state.observe_tty(false), TtyTransition::Baseline(false));
    }

    #[test]
    fn detach_flags_once_then_unchanged() {
        let mut state = SamplerState::new();
        state.observe_tty(true);
        assert_eq!(state.observe_tty(false), TtyTransition::Lost);
        assert_eq!(state.observe_tty(false), TtyTransition::Unchanged(false));
        assert_eq!(state.observe_tty(false), TtyTransition::Unchanged(false));
    }

    #[test]
    fn reattach_reports_regained() {
        let mut state = SamplerState::new();
        state.observe_tty(true);
        state.observe_tty(false);
        assert_eq!(state.observe_tty(true), TtyTransition::Regained);
    }

    #[test]
    fn target_parses_from_conf() {
        let conf = TargetConf {
            host: "10.8.100.100".to_string(),
            port: 6379,
        };
        let target = Target::try_from((TargetClass::Local, &conf)).unwrap();
        assert_eq!(target.endpoint(), "local 10.8.100.100:6379");
        assert_eq!(target.addr().port(), 6379);
    }

    #[test]
    fn bad_host_is_rejected() {
        let conf = TargetConf {
            host: "not-an-ip".to_string(),
            port: 6379,
        };
        assert!(Target::try_from((TargetClass::Local, &conf)).is_err());
    }

    #[test]
    fn timeout_renders_distinct_from_rejection() {
        let timeout = ProbeError::Timeout(Duration::from_secs(5)).to_string();
        let rejected = ProbeError::Rejected(io::Error::from_raw_os_error(libc::ECONNREFUSED));
        assert_eq!(timeout, "connect timed out after 5s");
        assert!(rejected.to_string().contains("os error"));
        assert_ne!(timeout, rejected.to_string());
    }
}
