use crate::error::{MigrationError, Result};
use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Transport retry strategy handed to the SDK.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryMode {
    Standard,
    Adaptive,
}

impl FromStr for RetryMode {
    type Err = MigrationError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "standard" => Ok(RetryMode::Standard),
            "adaptive" => Ok(RetryMode::Adaptive),
            other => Err(MigrationError::Config(format!(
                "RETRY_MODE must be 'standard' or 'adaptive', got '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for RetryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetryMode::Standard => write!(f, "standard"),
            RetryMode::Adaptive => write!(f, "adaptive"),
        }
    }
}

/// SDK transport settings shared by every client in a process
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub region: String,

    /// Retry mode (default: standard)
    pub retry_mode: RetryMode,

    /// Total attempts per request, including the first (default: 10)
    pub max_attempts: u32,

    /// Connect timeout (default: 30s)
    pub connect_timeout: Duration,

    /// Read timeout; large part copies are slow to respond (default: 30 min)
    pub read_timeout: Duration,
}

impl TransportConfig {
    fn from_lookup(lookup: &impl Fn(&str) -> Option<String>) -> Result<Self> {
        Ok(Self {
            region: required(lookup, "REGION")?,
            retry_mode: match lookup("RETRY_MODE") {
                Some(v) => v.parse()?,
                None => RetryMode::Standard,
            },
            max_attempts: parsed_or(lookup, "RETRY_MAX_ATTEMPTS", 10),
            connect_timeout: Duration::from_secs(parsed_or(lookup, "CONNECT_TIMEOUT_SECS", 30)),
            read_timeout: Duration::from_secs(parsed_or(lookup, "READ_TIMEOUT_SECS", 1800)),
        })
    }
}

/// Copy engine tuning. The two historical deployments disagreed on the
/// threshold (500 MB vs 5 GB); both are reachable through the environment.
#[derive(Debug, Clone)]
pub struct CopyTuning {
    /// Objects at or above this size use the chunked path (default: 500 MiB)
    pub multipart_threshold: u64,

    /// Byte length of each part (default: 64 MiB)
    pub part_size: u64,

    /// Parts in flight per object (default: 16)
    pub part_concurrency: usize,

    /// Window after which a stalled chunked copy is reported (default: 60s)
    pub watchdog: Duration,
}

impl Default for CopyTuning {
    fn default() -> Self {
        Self {
            multipart_threshold: 500 * 1024 * 1024,
            part_size: 64 * 1024 * 1024,
            part_concurrency: 16,
            watchdog: Duration::from_secs(60),
        }
    }
}

impl CopyTuning {
    fn from_lookup(lookup: &impl Fn(&str) -> Option<String>) -> Result<Self> {
        let default = Self::default();
        let tuning = Self {
            multipart_threshold: parsed_or(
                lookup,
                "MULTIPART_THRESHOLD",
                default.multipart_threshold,
            ),
            part_size: parsed_or(lookup, "PART_SIZE", default.part_size),
            part_concurrency: parsed_or(lookup, "PART_CONCURRENCY", default.part_concurrency),
            watchdog: Duration::from_secs(parsed_or(
                lookup,
                "WATCHDOG_SECS",
                default.watchdog.as_secs(),
            )),
        };

        if tuning.part_size == 0 || tuning.part_concurrency == 0 {
            return Err(MigrationError::Config(
                "PART_SIZE and PART_CONCURRENCY must be positive".to_string(),
            ));
        }
        if tuning.watchdog.is_zero() {
            return Err(MigrationError::Config(
                "WATCHDOG_SECS must be positive".to_string(),
            ));
        }
        Ok(tuning)
    }
}

/// Worker (queue consumer) configuration
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub transport: TransportConfig,
    pub src_bucket: String,
    pub dst_bucket: String,
    pub queue_url: String,

    /// Only keys starting with this prefix are migrated (default: all)
    pub prefix_filter: Option<String>,

    /// Visibility granted on receive and on every extension (default: 2h)
    pub visibility_timeout: Duration,

    /// Long-poll wait per receive, capped at 20s by the queue (default: 20s)
    pub wait_time: Duration,

    /// Consecutive empty polls before the worker drains and exits (default: 3)
    pub empty_polls_before_exit: u32,

    /// Minimum spacing between visibility extensions (default: 5 min)
    pub visibility_extend_interval: Duration,

    pub copy: CopyTuning,
}

impl WorkerConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let config = Self {
            transport: TransportConfig::from_lookup(&lookup)?,
            src_bucket: required(&lookup, "SRC_BUCKET")?,
            dst_bucket: required(&lookup, "DST_BUCKET")?,
            queue_url: required(&lookup, "QUEUE_URL")?,
            prefix_filter: lookup("PREFIX_FILTER").filter(|p| !p.is_empty()),
            visibility_timeout: Duration::from_secs(parsed_or(&lookup, "VISIBILITY_TIMEOUT", 7200)),
            wait_time: Duration::from_secs(parsed_or::<u64>(&lookup, "WAIT_TIME_SECONDS", 20).min(20)),
            empty_polls_before_exit: parsed_or(&lookup, "EMPTY_POLLS_BEFORE_EXIT", 3),
            visibility_extend_interval: Duration::from_secs(parsed_or(
                &lookup,
                "VISIBILITY_EXTEND_INTERVAL",
                300,
            )),
            copy: CopyTuning::from_lookup(&lookup)?,
        };

        if config.visibility_extend_interval >= config.visibility_timeout {
            return Err(MigrationError::Config(format!(
                "VISIBILITY_EXTEND_INTERVAL ({}s) must be shorter than VISIBILITY_TIMEOUT ({}s)",
                config.visibility_extend_interval.as_secs(),
                config.visibility_timeout.as_secs()
            )));
        }
        // Extensions only happen on watchdog ticks.
        if config.copy.watchdog >= config.visibility_extend_interval {
            return Err(MigrationError::Config(format!(
                "WATCHDOG_SECS ({}s) must be shorter than VISIBILITY_EXTEND_INTERVAL ({}s)",
                config.copy.watchdog.as_secs(),
                config.visibility_extend_interval.as_secs()
            )));
        }
        Ok(config)
    }

    pub fn key_matches(&self, key: &str) -> bool {
        self.prefix_filter
            .as_deref()
            .is_none_or(|prefix| key.starts_with(prefix))
    }
}

/// Capacity tier weighting for launched workers
#[derive(Debug, Clone, Copy)]
pub struct CapacityWeights {
    pub spot: i32,
    pub on_demand: i32,
}

impl Default for CapacityWeights {
    fn default() -> Self {
        Self {
            spot: 4,
            on_demand: 1,
        }
    }
}

/// Fleet controller configuration
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    pub transport: TransportConfig,
    pub queue_url: String,
    pub cluster: String,
    pub task_definition: String,
    pub subnets: Vec<String>,
    pub security_groups: Vec<String>,

    /// Upper bound on running + pending workers (default: 2)
    pub max_workers: u32,

    /// Queue messages one worker is expected to absorb (default: 10)
    pub target_backlog_per_worker: u32,

    /// Launches allowed per tick (default: MAX_WORKERS)
    pub burst_limit: u32,

    pub weights: CapacityWeights,
}

impl ControllerConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let max_workers = parsed_or(&lookup, "MAX_WORKERS", 2);
        let default_weights = CapacityWeights::default();

        let config = Self {
            transport: TransportConfig::from_lookup(&lookup)?,
            queue_url: required(&lookup, "QUEUE_URL")?,
            cluster: required(&lookup, "CLUSTER")?,
            task_definition: required(&lookup, "TASK_DEFINITION")?,
            subnets: split_list(&required(&lookup, "SUBNETS")?),
            security_groups: lookup("SECURITY_GROUPS")
                .map(|v| split_list(&v))
                .unwrap_or_default(),
            max_workers,
            target_backlog_per_worker: parsed_or(&lookup, "TARGET_BACKLOG_PER_WORKER", 10),
            burst_limit: parsed_or(&lookup, "BURST_LIMIT", max_workers),
            weights: CapacityWeights {
                spot: parsed_or(&lookup, "SPOT_WEIGHT", default_weights.spot),
                on_demand: parsed_or(&lookup, "ON_DEMAND_WEIGHT", default_weights.on_demand),
            },
        };

        if config.subnets.is_empty() {
            return Err(MigrationError::Config(
                "SUBNETS must list at least one subnet".to_string(),
            ));
        }
        if config.target_backlog_per_worker == 0 {
            return Err(MigrationError::Config(
                "TARGET_BACKLOG_PER_WORKER must be positive".to_string(),
            ));
        }
        Ok(config)
    }
}

/// Notification forwarder configuration
#[derive(Debug, Clone)]
pub struct ForwarderConfig {
    pub transport: TransportConfig,
    pub dst_bucket: String,
    pub ingest_prefix: String,
}

impl ForwarderConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        Ok(Self {
            transport: TransportConfig::from_lookup(&lookup)?,
            dst_bucket: required(&lookup, "EXPRESS_BUCKET")?,
            ingest_prefix: required(&lookup, "INGEST_PREFIX")?,
        })
    }
}

fn required(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Result<String> {
    lookup(name)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| MigrationError::Config(format!("{} must be set", name)))
}

fn parsed_or<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, name: &str, default: T) -> T {
    match lookup(name) {
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!("⚠️  Ignoring unparsable {}='{}', using default", name, raw);
            default
        }),
        None => default,
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
