use std::net::SocketAddr;
use std::time::Duration;

use clap::Parser;
use clap::ValueEnum;

use crate::error::ConfigError;

/// Where each window's membership set lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StoreKind {
    /// In process memory; each instance counts on its own.
    Local,
    /// A Redis set per wall-clock window, shared by every instance using the same
    /// prefix; one of them reports each window.
    Redis,
}

/// Where the per-window count is reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SinkKind {
    Log,
    Kafka,
}

/// How a caller supplied endpoint is told the current count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum NotifyMethod {
    /// `GET {endpoint}?count=N`
    Get,
    /// `POST {endpoint}` with a `{"count": N}` JSON body
    Post,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Json,
    Text,
}

/// Counts distinct request ids per window and reports each window's count.
#[derive(Debug, Clone, Parser)]
#[command(name = "dedup-server", version, about)]
pub struct Config {
    /// Address the HTTP listener binds to.
    #[arg(long, env = "DEDUP_LISTEN", default_value = "0.0.0.0:8080")]
    pub listen: SocketAddr,

    /// Length of a counting window.
    #[arg(long, env = "DEDUP_WINDOW", default_value = "60s", value_parser = humantime::parse_duration)]
    pub window: Duration,

    /// How long a rollover waits for in-flight observations of the outgoing window.
    #[arg(long, env = "DEDUP_DRAIN_GRACE", default_value = "50ms", value_parser = humantime::parse_duration)]
    pub drain_grace: Duration,

    #[arg(long, env = "DEDUP_STORE", value_enum, default_value_t = StoreKind::Local)]
    pub store: StoreKind,

    #[arg(long, env = "DEDUP_REDIS_URL", default_value = "redis://127.0.0.1:6379")]
    pub redis_url: String,

    /// Prefix of the per-window Redis keys.
    #[arg(long, env = "DEDUP_REDIS_PREFIX", default_value = "unique-requests")]
    pub redis_prefix: String,

    #[arg(long, env = "DEDUP_SINK", value_enum, default_value_t = SinkKind::Log)]
    pub sink: SinkKind,

    /// Comma-separated Kafka bootstrap servers.
    #[arg(long, env = "DEDUP_KAFKA_BROKERS", default_value = "localhost:9092")]
    pub kafka_brokers: String,

    #[arg(long, env = "DEDUP_KAFKA_TOPIC", default_value = "unique-requests-count")]
    pub kafka_topic: String,

    /// Upper bound on delivering one window's report.
    #[arg(long, env = "DEDUP_REPORT_TIMEOUT", default_value = "5s", value_parser = humantime::parse_duration)]
    pub report_timeout: Duration,

    #[arg(long, env = "DEDUP_NOTIFY_METHOD", value_enum, default_value_t = NotifyMethod::Get)]
    pub notify_method: NotifyMethod,

    /// Upper bound on one outbound notification.
    #[arg(long, env = "DEDUP_NOTIFY_TIMEOUT", default_value = "5s", value_parser = humantime::parse_duration)]
    pub notify_timeout: Duration,

    /// File that receives the logs. Empty logs to stderr.
    #[arg(long, env = "DEDUP_LOG_FILE", default_value = "logs.txt")]
    pub log_file: String,

    #[arg(long, env = "DEDUP_LOG_FORMAT", value_enum, default_value_t = LogFormat::Json)]
    pub log_format: LogFormat,

    /// Do not report the partial window on shutdown.
    #[arg(long, env = "DEDUP_NO_FINAL_FLUSH")]
    pub no_final_flush: bool,
}

impl Config {
    /// Checks option combinations clap cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window.is_zero() {
            return Err(ConfigError::ZeroWindow);
        }
        if self.drain_grace >= self.window {
            return Err(ConfigError::DrainGraceTooLong {
                grace: self.drain_grace,
                window: self.window,
            });
        }
        if self.store == StoreKind::Redis && !cfg!(feature = "redis") {
            return Err(ConfigError::Unsupported {
                option: "--store redis",
                feature: "redis",
            });
        }
        if self.sink == SinkKind::Kafka && !cfg!(feature = "kafka") {
            return Err(ConfigError::Unsupported {
                option: "--sink kafka",
                feature: "kafka",
            });
        }
        Ok(())
    }
}
