use crate::structures::{ProbeResult, Target, TtyTransition};
use chrono::{DateTime, SecondsFormat, Utc};
use std::io::{self, Write};
use std::time::Duration;

const RULE: &str = "===========================================";
const SEPARATOR: &str = "-------------------------------------------";

/// Line-oriented stdout report writer. Every line is flushed immediately so
/// a tailed log stays live after the launching session disconnects.
pub struct Reporter<W> {
    out: W,
}

impl Reporter<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> Reporter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    pub fn banner(
        &mut self,
        pid: u32,
        ppid: u32,
        local: &Target,
        internet: &Target,
        interval: Duration,
        connect_timeout: Duration,
    ) -> io::Result<()> {
        writeln!(self.out, "{RULE}")?;
        writeln!(self.out, "netrepro connectivity sampler")?;
        writeln!(self.out, "{RULE}")?;
        writeln!(self.out, "pid: {pid}  ppid: {ppid}")?;
        writeln!(
            self.out,
            "os: {}  arch: {}",
            std::env::consts::OS,
            std::env::consts::ARCH
        )?;
        writeln!(self.out, "local target:    {}:{}", local.ip, local.port)?;
        writeln!(self.out, "internet target: {}:{}", internet.ip, internet.port)?;
        writeln!(
            self.out,
            "interval: {}s  connect timeout: {}s",
            interval.as_secs(),
            connect_timeout.as_secs()
        )?;
        writeln!(self.out, "{RULE}")?;
        writeln!(self.out)?;
        self.out.flush()
    }

    pub fn cycle_header(&mut self, cycle: u64, at: DateTime<Utc>) -> io::Result<()> {
        writeln!(self.out, "{SEPARATOR}")?;
        writeln!(
            self.out,
            "cycle {cycle} at {}",
            at.to_rfc3339_opts(SecondsFormat::Secs, true)
        )?;
        writeln!(self.out, "{SEPARATOR}")?;
        self.out.flush()
    }

    pub fn tty_state(&mut self, transition: &TtyTransition) -> io::Result<()> {
        match transition {
            TtyTransition::Baseline(true) | TtyTransition::Unchanged(true) => {
                writeln!(self.out, "tty: attached")?;
            }
            TtyTransition::Baseline(false) | TtyTransition::Unchanged(false) => {
                writeln!(self.out, "tty: detached")?;
            }
            TtyTransition::Lost => {
                writeln!(self.out, "tty: detached *** controlling terminal lost ***")?;
            }
            TtyTransition::Regained => {
                writeln!(self.out, "tty: attached (regained)")?;
            }
        }
        self.out.flush()
    }

    pub fn result(&mut self, result: &ProbeResult) -> io::Result<()> {
        match &result.error {
            None => writeln!(
                self.out,
                "ok   {}: {} ({:.1?})",
                result.check, result.target, result.elapsed
            )?,
            Some(e) => writeln!(
                self.out,
                "FAIL {}: {} ({:.1?}) - {}",
                result.check, result.target, result.elapsed, e
            )?,
        }
        if let Some(output) = &result.output {
            for line in output.lines() {
                writeln!(self.out, "    {line}")?;
            }
        }
        self.out.flush()
    }

    pub fn separator(&mut self) -> io::Result<()> {
        writeln!(self.out, "{SEPARATOR}")?;
        writeln!(self.out)?;
        self.out.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structures::{ProbeError, TargetClass};
    use chrono::TimeZone;

    fn targets() -> (Target, Target) {
        (
            Target {
                class: TargetClass::Local,
                ip: "10.8.100.100".parse().unwrap(),
                port: 6379,
            },
            Target {
                class: TargetClass::Internet,
                ip: "8.8.8.8".parse().unwrap(),
                port: 53,
            },
        )
    }

    fn rendered(f: impl FnOnce(&mut Reporter<Vec<u8>>)) -> String {
        let mut reporter = Reporter::new(Vec::new());
        f(&mut reporter);
        String::from_utf8(reporter.into_inner()).unwrap()
    }

    #[test]
    fn banner_names_both_targets_and_process_ids() {
        let (local, internet) = targets();
        let text = rendered(|r| {
            r.banner(
                42,
                7,
                &local,
                &internet,
                Duration::from_secs(10),
                Duration::from_secs(5),
            )
            .unwrap();
        });
        assert!(text.contains("pid: 42  ppid: 7"));
        assert!(text.contains("local target:    10.8.100.100:6379"));
        assert!(text.contains("internet target: 8.8.8.8:53"));
        assert!(text.contains("interval: 10s  connect timeout: 5s"));
    }

    #[test]
    fn cycle_header_carries_number_and_timestamp() {
        let at = Utc.with_ymd_and_hms(2026, 8, 7, 12, 0, 0).unwrap();
        let text = rendered(|r| r.cycle_header(3, at).unwrap());
        assert!(text.contains("cycle 3 at 2026-08-07T12:00:00Z"));
    }

    #[test]
    fn success_and_failure_render_one_line_each() {
        let (local, _) = targets();
        let ok = ProbeResult::ok("tcp connect", local.endpoint(), Duration::from_millis(2));
        let failed = ProbeResult::failed(
            "tcp connect",
            local.endpoint(),
            Duration::from_secs(5),
            ProbeError::Timeout(Duration::from_secs(5)),
        );
        let text = rendered(|r| {
            r.result(&ok).unwrap();
            r.result(&failed).unwrap();
        });
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("ok   tcp connect: local 10.8.100.100:6379"));
        assert!(lines[1].starts_with("FAIL tcp connect: local 10.8.100.100:6379"));
        assert!(lines[1].contains("connect timed out after 5s"));
    }

    #[test]
    fn diagnostic_output_is_indented_under_the_result() {
        let (local, _) = targets();
        let result = ProbeResult::ok("route lookup", local.endpoint(), Duration::from_millis(1))
            .with_output("route to: 10.8.100.100\ninterface: en0");
        let text = rendered(|r| r.result(&result).unwrap());
        assert!(text.contains("\n    route to: 10.8.100.100\n"));
        assert!(text.contains("\n    interface: en0\n"));
    }

    #[test]
    fn only_the_lost_transition_is_flagged() {
        let flagged = rendered(|r| r.tty_state(&TtyTransition::Lost).unwrap());
        assert!(flagged.contains("*** controlling terminal lost ***"));

        for quiet in [
            TtyTransition::Baseline(true),
            TtyTransition::Baseline(false),
            TtyTransition::Unchanged(false),
            TtyTransition::Regained,
        ] {
            let text = rendered(|r| r.tty_state(&quiet).unwrap());
            assert!(!text.contains("***"), "unexpected flag in: {text}");
        }
    }
}
