use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

use crate::engine::EngineConfig;
use crate::reconciler::ReconcilerConfig;
use crate::view::SortKey;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const COMMIT: &str = env!("GIT_COMMIT");
pub const BUILD_DATE: &str = env!("BUILD_DATE");

const STATE_DIR_NAME: &str = "ec2-fleetctl";

/// Multi-region EC2 fleet inventory and lifecycle control.
#[derive(Parser, Debug, Clone)]
#[command(name = "ec2-fleetctl")]
#[command(about = "Multi-region EC2 fleet inventory and lifecycle control")]
#[command(version = concat!(
    env!("CARGO_PKG_VERSION"),
    " (commit: ",
    env!("GIT_COMMIT"),
    ", build date: ",
    env!("BUILD_DATE"),
    ")"
))]
pub struct Config {
    /// Named AWS profile
    #[arg(long, global = true, env = "AWS_PROFILE")]
    pub profile: Option<String>,

    /// Region used for account-level calls [default: from the AWS config chain]
    #[arg(long, global = true, env = "AWS_REGION")]
    pub home_region: Option<String>,

    /// Comma-separated regions to scan instead of discovering them
    #[arg(long, global = true, env = "FLEET_REGIONS", value_delimiter = ',')]
    pub regions: Vec<String>,

    /// Maximum number of regions scanned at once
    #[arg(long, global = true, env = "SCAN_CONCURRENCY", default_value = "10")]
    pub scan_concurrency: usize,

    /// Seconds between status checks while waiting for a reboot
    #[arg(long, global = true, env = "REBOOT_POLL_INTERVAL_SECONDS", default_value = "5")]
    pub reboot_poll_interval_seconds: u64,

    /// Status checks before a reboot is assumed complete
    #[arg(long, global = true, env = "REBOOT_POLL_MAX_ATTEMPTS", default_value = "60")]
    pub reboot_poll_max_attempts: u32,

    /// Directory for the snapshot cache and settings [default: <config dir>/ec2-fleetctl]
    #[arg(long, global = true, env = "FLEET_STATE_DIR")]
    pub state_dir: Option<PathBuf>,

    /// Log format: json or pretty
    #[arg(long, global = true, env = "LOG_FORMAT", default_value = "pretty")]
    pub log_format: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "LOG_LEVEL", default_value = "warn")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Scan every region and print the inventory
    List {
        /// Show only one region
        #[arg(long)]
        region: Option<String>,

        /// Sort column
        #[arg(long, value_enum)]
        sort: Option<SortKey>,

        /// Sort descending
        #[arg(long, default_value = "false")]
        desc: bool,

        /// Print the cached snapshot without scanning
        #[arg(long, default_value = "false")]
        cached: bool,
    },

    /// Start a stopped instance
    Start(InstanceArgs),

    /// Stop a running instance
    Stop(InstanceArgs),

    /// Reboot an instance and wait until its status checks pass
    Reboot {
        #[command(flatten)]
        target: InstanceArgs,

        /// Return as soon as the reboot is accepted
        #[arg(long, default_value = "false")]
        no_wait: bool,
    },

    /// Show the status checks of an instance
    Status(InstanceArgs),

    /// List the regions that would be scanned
    Regions,

    /// Pin an instance to the top of the inventory
    Pin {
        #[arg(value_name = "INSTANCE_ID")]
        instance_id: String,
    },

    /// Remove an instance from the pinned set
    Unpin {
        #[arg(value_name = "INSTANCE_ID")]
        instance_id: String,
    },

    /// Keep the inventory fresh and expose it over HTTP
    #[command(after_help = r#"Endpoints:
  GET /healthz     Liveness
  GET /readyz      Ready once cached or scanned data exists
  GET /instances   Current inventory as JSON"#)]
    Serve {
        /// Status server port
        #[arg(long, env = "STATUS_PORT", default_value = "8080")]
        port: u16,

        /// Seconds between background refreshes, 0 disables
        #[arg(long, env = "AUTO_REFRESH_INTERVAL_SECONDS", default_value = "300")]
        auto_refresh_interval_seconds: u64,
    },
}

#[derive(clap::Args, Debug, Clone)]
pub struct InstanceArgs {
    #[arg(value_name = "INSTANCE_ID")]
    pub instance_id: String,

    /// Region of the instance [default: looked up in the cached inventory]
    #[arg(long)]
    pub region: Option<String>,
}

impl Config {
    pub fn from_args() -> Self {
        Self::parse()
    }

    pub fn state_dir(&self) -> PathBuf {
        self.state_dir.clone().unwrap_or_else(|| {
            dirs::config_dir()
                .map(|dir| dir.join(STATE_DIR_NAME))
                .unwrap_or_else(|| PathBuf::from(format!(".{}", STATE_DIR_NAME)))
        })
    }

    pub fn engine_config(&self, home_region: &str) -> EngineConfig {
        EngineConfig {
            home_region: home_region.to_string(),
            regions: self
                .regions
                .iter()
                .map(|r| r.trim().to_string())
                .filter(|r| !r.is_empty())
                .collect(),
            concurrency: self.scan_concurrency,
            reconciler: ReconcilerConfig {
                poll_interval: Duration::from_secs(self.reboot_poll_interval_seconds),
                max_attempts: self.reboot_poll_max_attempts,
                ..ReconcilerConfig::default()
            },
            state_dir: self.state_dir(),
        }
    }

    pub fn display(&self, home_region: &str) {
        let region_info = if self.regions.is_empty() {
            "discover".to_string()
        } else {
            self.regions.join(",")
        };

        tracing::info!(
            profile = self.profile.as_deref().unwrap_or("default"),
            home_region = %home_region,
            regions = %region_info,
            scan_concurrency = self.scan_concurrency,
            reboot_poll_interval_seconds = self.reboot_poll_interval_seconds,
            reboot_poll_max_attempts = self.reboot_poll_max_attempts,
            state_dir = %self.state_dir().display(),
            "Configuration initialized"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Config {
        Config::try_parse_from(std::iter::once("ec2-fleetctl").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_engine_config_from_flags() {
        let config = parse(&[
            "--regions",
            "us-east-1, eu-west-1,",
            "--scan-concurrency",
            "4",
            "--reboot-poll-interval-seconds",
            "2",
            "--state-dir",
            "/tmp/fleet",
            "regions",
        ]);

        let engine = config.engine_config("us-east-1");

        assert_eq!(engine.home_region, "us-east-1");
        assert_eq!(engine.regions, vec!["us-east-1", "eu-west-1"]);
        assert_eq!(engine.concurrency, 4);
        assert_eq!(engine.reconciler.poll_interval, Duration::from_secs(2));
        assert_eq!(engine.reconciler.max_attempts, 60);
        assert_eq!(engine.state_dir, PathBuf::from("/tmp/fleet"));
    }

    #[test]
    fn test_reboot_subcommand() {
        let config = parse(&["reboot", "i-123", "--region", "ap-northeast-2", "--no-wait"]);

        match config.command {
            Command::Reboot { target, no_wait } => {
                assert_eq!(target.instance_id, "i-123");
                assert_eq!(target.region.as_deref(), Some("ap-northeast-2"));
                assert!(no_wait);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_list_sort_flags() {
        let config = parse(&["list", "--sort", "launch-time", "--desc"]);

        match config.command {
            Command::List {
                sort, desc, cached, ..
            } => {
                assert_eq!(sort, Some(SortKey::LaunchTime));
                assert!(desc);
                assert!(!cached);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_default_state_dir_is_named_after_tool() {
        let config = parse(&["regions"]);
        assert!(config.state_dir().ends_with(STATE_DIR_NAME));
    }
}
