use anyhow::bail;
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::{path::PathBuf, time::Duration};

/// Runtime configuration for the `factorbench-driver` binary.
///
/// Values are parsed from CLI arguments or environment variables.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "factorbench-driver",
    version,
    about = "Drives a factorize service with deterministic, concurrent workloads"
)]
pub struct CliArgs {
    #[command(flatten)]
    pub driver: DriverArgs,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Serve the control API (default).
    Serve,
    /// Execute a single run and print its summary.
    Run {
        /// Requests per worker. 0 runs the workload exactly once.
        #[arg(long, default_value_t = 0)]
        requests: usize,

        /// Stop the run after this many milliseconds.
        #[arg(long)]
        duration_ms: Option<u64>,
    },
    /// Write a synthetic workload file.
    Generate {
        /// How many numbers to generate.
        #[arg(long, default_value_t = 1000)]
        count: usize,

        /// Where to write them.
        #[arg(long, default_value = "test_numbers.txt")]
        output: PathBuf,

        /// Generator seed. Defaults to the driver seed.
        #[arg(long, allow_negative_numbers = true)]
        seed: Option<i64>,
    },
}

/// Where requests are sent.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetMode {
    /// Look the backend up in the discovery directory.
    Discovery,
    /// A service running on this host.
    Local,
    /// The load balancer inside the compose network.
    Docker,
}

impl TargetMode {
    /// Fixed address for the non-discovery modes.
    pub fn fixed_address(self) -> Option<&'static str> {
        match self {
            Self::Discovery => None,
            Self::Local => Some("localhost:8080"),
            Self::Docker => Some("nginx:80"),
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct DriverArgs {
    /// Address of the discovery directory.
    ///
    /// Environment variable: `CONSUL_ADDR`
    #[arg(long, env = "CONSUL_ADDR", default_value = "consul:8500")]
    pub consul_addr: String,

    /// Backend name looked up in the directory catalog.
    ///
    /// Environment variable: `DISCOVERY_SERVICE`
    #[arg(long, env = "DISCOVERY_SERVICE", default_value = "nginx")]
    pub service_name: String,

    /// Base permutation seed.
    ///
    /// Environment variable: `TEST_SEED`
    #[arg(long, env = "TEST_SEED", default_value_t = 42, allow_negative_numbers = true)]
    pub seed: i64,

    /// Number of concurrent workers.
    ///
    /// Environment variable: `TEST_GOROUTINES`
    #[arg(long, env = "TEST_GOROUTINES", default_value_t = 1)]
    pub workers: usize,

    /// How the backend endpoint is resolved.
    ///
    /// Environment variable: `TARGET_MODE`
    #[arg(long, env = "TARGET_MODE", value_enum, default_value_t = TargetMode::Discovery)]
    pub target: TargetMode,

    /// Workload file, one integer per line.
    ///
    /// Environment variable: `WORKLOAD_PATH`
    #[arg(long, env = "WORKLOAD_PATH", default_value = "test_numbers.txt")]
    pub workload: PathBuf,

    /// Endpoint refresh period in milliseconds.
    ///
    /// Environment variable: `REFRESH_INTERVAL_MS`
    #[arg(long, env = "REFRESH_INTERVAL_MS", default_value_t = 5_000)]
    pub refresh_interval_ms: u64,

    /// How long a run waits for its first endpoint, in milliseconds.
    ///
    /// Environment variable: `FIRST_RESOLUTION_TIMEOUT_MS`
    #[arg(long, env = "FIRST_RESOLUTION_TIMEOUT_MS", default_value_t = 10_000)]
    pub first_resolution_timeout_ms: u64,

    /// Per-request timeout in milliseconds.
    ///
    /// Environment variable: `REQUEST_TIMEOUT_MS`
    #[arg(long, env = "REQUEST_TIMEOUT_MS", default_value_t = 30_000)]
    pub request_timeout_ms: u64,

    /// Address the control API listens on.
    ///
    /// Environment variable: `LISTEN_ADDR`
    #[arg(long, env = "LISTEN_ADDR", default_value = "0.0.0.0:8090")]
    pub listen_addr: String,
}

/// How the endpoint is resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Discovery { consul_addr: String, service: String },
    Static(String),
}

#[derive(Debug, Clone)]
pub struct DriverConfig {
    pub target: Target,
    pub seed: i64,
    pub workers: usize,
    pub workload_path: PathBuf,
    pub refresh_interval: Duration,
    pub first_resolution_timeout: Duration,
    pub request_timeout: Duration,
    pub listen_addr: String,
}

impl TryFrom<DriverArgs> for DriverConfig {
    type Error = anyhow::Error;

    fn try_from(args: DriverArgs) -> Result<Self, Self::Error> {
        if args.workers == 0 {
            bail!("TEST_GOROUTINES must be greater than 0");
        }
        if args.refresh_interval_ms == 0 {
            bail!("REFRESH_INTERVAL_MS must be greater than 0");
        }
        if args.first_resolution_timeout_ms == 0 {
            bail!("FIRST_RESOLUTION_TIMEOUT_MS must be greater than 0");
        }

        let target = match args.target.fixed_address() {
            Some(address) => Target::Static(address.to_string()),
            None => {
                if args.consul_addr.trim().is_empty() {
                    bail!("CONSUL_ADDR must not be empty in discovery mode");
                }
                Target::Discovery {
                    consul_addr: args.consul_addr,
                    service: args.service_name,
                }
            }
        };

        Ok(Self {
            target,
            seed: args.seed,
            workers: args.workers,
            workload_path: args.workload,
            refresh_interval: Duration::from_millis(args.refresh_interval_ms),
            first_resolution_timeout: Duration::from_millis(args.first_resolution_timeout_ms),
            request_timeout: Duration::from_millis(args.request_timeout_ms),
            listen_addr: args.listen_addr,
        })
    }
}

/// Per-run overrides on top of [`DriverConfig`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunParams {
    /// Requests per worker; 0 runs the workload once.
    pub requests: usize,
    pub seed: Option<i64>,
    pub workers: Option<usize>,
    pub deadline: Option<Duration>,
}

impl RunParams {
    /// Maps raw values, where a seed or worker count of 0 means "use the
    /// configured default".
    pub fn from_raw(requests: usize, seed: i64, workers: usize) -> Self {
        Self {
            requests,
            seed: (seed != 0).then_some(seed),
            workers: (workers != 0).then_some(workers),
            deadline: None,
        }
    }

    pub fn with_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn seed_or(&self, config: &DriverConfig) -> i64 {
        self.seed.unwrap_or(config.seed)
    }

    pub fn workers_or(&self, config: &DriverConfig) -> usize {
        self.workers.unwrap_or(config.workers)
    }
}
