use crate::conf::Conf;
use crate::probes::{redis, tcp, tools};
use crate::reporter::Reporter;
use crate::runner::{ProcessRunner, SystemRunner};
use crate::structures::{SamplerState, Target, TargetClass, TtyTransition};
use crate::terminal;
use anyhow::{Context, Result};
use chrono::Utc;
use std::convert::TryFrom;
use std::io;
use tokio::sync::broadcast;
use tokio::time::{self, MissedTickBehavior};
use tracing::{info, warn};

pub type TtyProbe = Box<dyn FnMut() -> bool + Send>;

/// The connectivity sampler: owns the configuration, targets, runner,
/// reporter and cycle state, and runs the check battery on a fixed period.
pub struct Sampler<R, W> {
    conf: Conf,
    local: Target,
    internet: Target,
    runner: R,
    reporter: Reporter<W>,
    state: SamplerState,
    tty: TtyProbe,
}

impl Sampler<SystemRunner, io::Stdout> {
    pub fn new(conf: Conf) -> Result<Self> {
        Self::with_parts(
            conf,
            SystemRunner,
            Reporter::stdout(),
            Box::new(terminal::has_controlling_terminal),
        )
    }
}

impl<R: ProcessRunner, W: io::Write> Sampler<R, W> {
    pub fn with_parts(conf: Conf, runner: R, reporter: Reporter<W>, tty: TtyProbe) -> Result<Self> {
        let local = Target::try_from((TargetClass::Local, &conf.local))
            .with_context(|| format!("bad local target {}", conf.local.host))?;
        let internet = Target::try_from((TargetClass::Internet, &conf.internet))
            .with_context(|| format!("bad internet target {}", conf.internet.host))?;
        Ok(Self {
            conf,
            local,
            internet,
            runner,
            reporter,
            state: SamplerState::new(),
            tty,
        })
    }

    /// Banner, then the first cycle immediately, then one cycle per interval
    /// until the exit signal fires. No jitter, no overrun skipping.
    pub async fn run(mut self, mut exit: broadcast::Receiver<()>) -> Result<()> {
        self.reporter.banner(
            std::process::id(),
            parent_pid(),
            &self.local,
            &self.internet,
            self.conf.interval(),
            self.conf.connect_timeout(),
        )?;

        let mut interval = time::interval(self.conf.interval());
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                biased;
                _ = exit.recv() => {
                    info!("exit signal received, stopping sampler");
                    return Ok(());
                }
                _ = interval.tick() => self.run_cycle().await?,
            }
        }
    }

    /// One full pass through the configured battery, in fixed order. Failed
    /// checks are reported and never abort the cycle.
    pub async fn run_cycle(&mut self) -> Result<()> {
        let cycle = self.state.next_cycle();
        self.reporter.cycle_header(cycle, Utc::now())?;

        let attached = (self.tty)();
        let transition = self.state.observe_tty(attached);
        if transition == TtyTransition::Lost {
            warn!("controlling terminal lost at cycle {cycle}");
        }
        self.reporter.tty_state(&transition)?;

        let timeout = self.conf.connect_timeout();

        let result = tcp::probe("tcp connect", &self.local, timeout, None).await;
        let local_failed = !result.is_ok();
        self.reporter.result(&result)?;
        if local_failed && self.conf.sampler.grace_enabled {
            // Heuristic, not verified root cause: keep the process alive so
            // the OS has a window to surface its permission prompt.
            info!(
                "local connect failed, waiting {}s before the next check",
                self.conf.grace().as_secs()
            );
            time::sleep(self.conf.grace()).await;
        }

        let result = tcp::probe("tcp connect", &self.internet, timeout, None).await;
        self.reporter.result(&result)?;

        let result = tools::ping(&self.runner, &self.local).await;
        self.reporter.result(&result)?;

        let result = tools::netcat(&self.runner, &self.local).await;
        self.reporter.result(&result)?;

        if self.conf.checks.redis {
            let result = redis::ping(&self.local, timeout).await;
            self.reporter.result(&result)?;

            let value = format!("netrepro-{}", Utc::now().timestamp());
            let result = redis::set_get(&self.local, timeout, &value).await;
            self.reporter.result(&result)?;
        }

        if let Some(iface) = self.conf.checks.bind_interface.as_deref() {
            let result = tcp::probe(
                format!("tcp connect (bound {iface})"),
                &self.local,
                timeout,
                Some(iface),
            )
            .await;
            self.reporter.result(&result)?;
        }

        if self.conf.checks.route_table {
            let result = tools::route(&self.runner, &self.local).await;
            self.reporter.result(&result)?;

            let result = tools::arp(&self.runner, &self.local).await;
            self.reporter.result(&result)?;
        }

        self.reporter.separator()?;
        Ok(())
    }
}

fn parent_pid() -> u32 {
    // SAFETY: getppid cannot fail.
    (unsafe { libc::getppid() }) as u32
}
