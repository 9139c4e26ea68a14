use anyhow::Result;
use clap::Parser;
use serde::Deserialize;
use std::io::ErrorKind;
use std::time::Duration;
use tracing::info;

/// Connectivity sampler reproducing detached-process no-route-to-host failures.
#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// Path to the sampler config. Built-in targets are used when absent.
    #[clap(short, long, default_value = "./config.toml")]
    pub conf: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Conf {
    pub local: TargetConf,
    pub internet: TargetConf,
    pub sampler: SamplerConf,
    pub checks: ChecksConf,
}

impl Default for Conf {
    fn default() -> Self {
        Self {
            local: TargetConf::default(),
            internet: TargetConf::internet(),
            sampler: SamplerConf::default(),
            checks: ChecksConf::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TargetConf {
    pub host: String,
    pub port: u16,
}

impl TargetConf {
    fn internet() -> Self {
        Self {
            host: "8.8.8.8".to_string(),
            port: 53,
        }
    }
}

impl Default for TargetConf {
    fn default() -> Self {
        Self {
            host: "10.8.100.100".to_string(),
            port: 6379,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SamplerConf {
    pub interval_secs: u64,
    pub connect_timeout_secs: u64,
    /// Post-failure wait after a failed raw connect to the local target.
    /// Heuristic: keeps the process alive long enough for the OS to surface
    /// its permission prompt. Never applied to internet failures.
    pub grace_secs: u64,
    pub grace_enabled: bool,
}

impl Default for SamplerConf {
    fn default() -> Self {
        Self {
            interval_secs: 10,
            connect_timeout_secs: 5,
            grace_secs: 30,
            grace_enabled: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ChecksConf {
    /// RESP PING and SET/GET against the local target.
    pub redis: bool,
    /// Interface to bind the extra raw-connect variant to. IP_BOUND_IF on
    /// macOS, SO_BINDTODEVICE on Linux.
    pub bind_interface: Option<String>,
    /// route/arp table dumps for diagnostic context.
    pub route_table: bool,
}

impl Default for ChecksConf {
    fn default() -> Self {
        Self {
            redis: true,
            bind_interface: if cfg!(target_os = "macos") {
                Some("en0".to_string())
            } else {
                None
            },
            route_table: true,
        }
    }
}

impl Conf {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.sampler.interval_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.sampler.connect_timeout_secs)
    }

    pub fn grace(&self) -> Duration {
        Duration::from_secs(self.sampler.grace_secs)
    }
}

pub async fn read_conf() -> Result<Conf> {
    use tokio::fs;

    let args = Args::parse();
    match fs::read_to_string(&args.conf).await {
        Ok(raw) => {
            info!("read conf from {}", &args.conf);
            Ok(toml::from_str::<Conf>(&raw)?)
        }
        Err(e) if e.kind() == ErrorKind::NotFound => {
            info!("no conf at {}, using built-in targets", &args.conf);
            Ok(Conf::default())
        }
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_repro_constants() {
        let conf = Conf::default();
        assert_eq!(conf.local.host, "10.8.100.100");
        assert_eq!(conf.local.port, 6379);
        assert_eq!(conf.internet.host, "8.8.8.8");
        assert_eq!(conf.internet.port, 53);
        assert_eq!(conf.interval(), Duration::from_secs(10));
        assert_eq!(conf.connect_timeout(), Duration::from_secs(5));
        assert_eq!(conf.grace(), Duration::from_secs(30));
        assert!(conf.sampler.grace_enabled);
        assert!(conf.checks.redis);
        assert!(conf.checks.route_table);
    }

    #[test]
    fn partial_toml_overlays_defaults() {
        let raw = r#"
            [local]
            host = "192.168.1.50"
            port = 8080

            [sampler]
            grace_enabled = false
        "#;
        let conf = toml::from_str::<Conf>(raw).unwrap();
        assert_eq!(conf.local.host, "192.168.1.50");
        assert_eq!(conf.local.port, 8080);
        assert_eq!(conf.internet.host, "8.8.8.8");
        assert!(!conf.sampler.grace_enabled);
        assert_eq!(conf.sampler.interval_secs, 10);
    }

    #[test]
    fn empty_toml_is_all_defaults() {
        let conf = toml::from_str::<Conf>("").unwrap();
        assert_eq!(conf.local.host, Conf::default().local.host);
    }
}
