//! # syslogng-ctl
//!
//! Client for the syslog-ng / AxoSyslog control socket.
//!
//! The daemon speaks a line-oriented protocol: one command per connection,
//! answered by a body ending with a line holding a single `.`. On top of the
//! raw exchange this crate exposes the daemon's commands and turns its
//! statistics into Prometheus metric families.
//!
//! ## Architecture
//!
//! - **Protocol**: terminator scanning across reads, `OK ` / `FAIL ` envelope
//! - **Transport**: where the stream to the daemon comes from (Unix socket, TCP, in-memory)
//! - **Channel**: one command/response exchange with cancellation and timeout
//! - **Stats / Metrics**: legacy stats parsing and translation to metric families
//! - **Controller**: the daemon's commands and the poll state of a session
//!
//! ## Example
//!
//! ```ignore
//! use syslogng_ctl::Controller;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut controller = Controller::unix("/var/run/syslog-ng/syslog-ng.ctl");
//!
//!     controller.ping().await?;
//!     let metrics = controller.stats_prometheus().await?;
//!     print!("{}", metrics.render_text()?);
//!     Ok(())
//! }
//! ```

pub mod channel;
pub mod controller;
pub mod error;
pub mod metrics;
pub mod protocol;
pub mod stats;
pub mod transport;

pub use channel::{ChannelConfig, ControlChannel, ControlChannelBuilder};
pub use controller::{Controller, LogMode};
pub use error::{ControlError, MetricError, StatsError};
pub use metrics::{to_metric_families, MetricFamily, MetricKind, MetricSet, TranslatorConfig};
pub use stats::{parse_stats, OrphanPolicy, Stat};
