use std::path::PathBuf;
use std::time::Duration;

/// Worker configuration loaded from environment variables.
///
/// All fields have defaults suitable for local development.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Number of independent worker slots (default: `4`).
    pub concurrency: usize,
    /// Sleep between polls of an empty queue (default: 1 s).
    pub poll_interval: Duration,
    /// Bound on resolving and downloading one artifact (default: 600 s).
    pub fetch_timeout: Duration,
    /// Bound on one run of the comparison procedure (default: 300 s).
    pub compare_timeout: Duration,
    /// How long a popped message stays invisible to other consumers.
    pub queue_lease: Duration,
    /// Parent directory for per-attempt workspaces.
    pub work_dir: PathBuf,
    pub rpmdiff_program: String,
    pub dnf_program: String,
    /// Interval between redispatch sweeps (default: 60 s).
    pub redispatch_interval: Duration,
    /// Age a `new` job must reach before it is re-enqueued (default: 300 s).
    pub redispatch_min_age: Duration,
    /// Consecutive failed persistence attempts before each further failure
    /// is logged as an error (default: `5`).
    pub persist_alarm_after: u32,
}

/// Extra lease time on top of the worst-case attempt duration.
const LEASE_MARGIN: Duration = Duration::from_secs(60);

fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    match std::env::var(name) {
        Ok(raw) => raw
            .parse()
            .unwrap_or_else(|_| panic!("{name} must be a valid {}", std::any::type_name::<T>())),
        Err(_) => default,
    }
}

impl WorkerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                    | Default                          |
    /// |----------------------------|----------------------------------|
    /// | `WORKER_CONCURRENCY`       | `4`                              |
    /// | `WORKER_POLL_INTERVAL_MS`  | `1000`                           |
    /// | `FETCH_TIMEOUT_SECS`       | `600`                            |
    /// | `COMPARE_TIMEOUT_SECS`     | `300`                            |
    /// | `QUEUE_LEASE_SECS`         | 2 × fetch + compare + 60         |
    /// | `WORK_DIR`                 | system temp dir                  |
    /// | `RPMDIFF_PROGRAM`          | `rpmdiff`                        |
    /// | `DNF_PROGRAM`              | `dnf`                            |
    /// | `REDISPATCH_INTERVAL_SECS` | `60`                             |
    /// | `REDISPATCH_MIN_AGE_SECS`  | `300`                            |
    /// | `PERSIST_ALARM_AFTER`      | `5`                              |
    pub fn from_env() -> Self {
        let concurrency: usize = env_or("WORKER_CONCURRENCY", 4);
        assert!(concurrency > 0, "WORKER_CONCURRENCY must be at least 1");

        let fetch_timeout = Duration::from_secs(env_or("FETCH_TIMEOUT_SECS", 600));
        let compare_timeout = Duration::from_secs(env_or("COMPARE_TIMEOUT_SECS", 300));
        let minimum_lease = Self::minimum_lease(fetch_timeout, compare_timeout);

        let queue_lease = match std::env::var("QUEUE_LEASE_SECS") {
            Ok(_) => Duration::from_secs(env_or("QUEUE_LEASE_SECS", 0)),
            Err(_) => minimum_lease + LEASE_MARGIN,
        };
        assert!(
            queue_lease > minimum_lease,
            "QUEUE_LEASE_SECS must exceed two fetch timeouts plus the compare timeout ({}s)",
            minimum_lease.as_secs(),
        );

        Self {
            concurrency,
            poll_interval: Duration::from_millis(env_or("WORKER_POLL_INTERVAL_MS", 1000)),
            fetch_timeout,
            compare_timeout,
            queue_lease,
            work_dir: std::env::var("WORK_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| std::env::temp_dir()),
            rpmdiff_program: env_or("RPMDIFF_PROGRAM", "rpmdiff".to_string()),
            dnf_program: env_or("DNF_PROGRAM", "dnf".to_string()),
            redispatch_interval: Duration::from_secs(env_or("REDISPATCH_INTERVAL_SECS", 60)),
            redispatch_min_age: Duration::from_secs(env_or("REDISPATCH_MIN_AGE_SECS", 300)),
            persist_alarm_after: env_or("PERSIST_ALARM_AFTER", 5),
        }
    }

    /// Worst-case duration of one attempt: both fetches and the compare.
    pub fn minimum_lease(fetch_timeout: Duration, compare_timeout: Duration) -> Duration {
        fetch_timeout * 2 + compare_timeout
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        let fetch_timeout = Duration::from_secs(600);
        let compare_timeout = Duration::from_secs(300);
        Self {
            concurrency: 4,
            poll_interval: Duration::from_secs(1),
            fetch_timeout,
            compare_timeout,
            queue_lease: Self::minimum_lease(fetch_timeout, compare_timeout) + LEASE_MARGIN,
            work_dir: std::env::temp_dir(),
            rpmdiff_program: "rpmdiff".to_string(),
            dnf_program: "dnf".to_string(),
            redispatch_interval: Duration::from_secs(60),
            redispatch_min_age: Duration::from_secs(300),
            persist_alarm_after: 5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_lease_outlasts_a_full_attempt() {
        let config = WorkerConfig::default();
        assert!(
            config.queue_lease
                > WorkerConfig::minimum_lease(config.fetch_timeout, config.compare_timeout)
        );
        assert_eq!(config.queue_lease, Duration::from_secs(2 * 600 + 300 + 60));
    }

    #[test]
    fn env_or_falls_back_when_unset() {
        let value: u64 = env_or("ARCHDIFFER_TEST_SURELY_UNSET_VAR", 42);
        assert_eq!(value, 42);
    }
}
