//! Controller - the daemon's control commands on top of a channel.
//!
//! A [`Controller`] is a long-lived session. Besides the channel it keeps the
//! time of the previous `STATS PROMETHEUS` poll, which delay reconstruction
//! needs. That state is only touched through `&mut self`, so polls on one
//! session cannot overlap.
//!
//! # Example
//!
//! ```ignore
//! use syslogng_ctl::Controller;
//!
//! let mut controller = Controller::unix("/var/run/syslog-ng/syslog-ng.ctl");
//! controller.ping().await?;
//!
//! let metrics = controller.stats_prometheus().await?;
//! print!("{}", metrics.render_text()?);
//! ```

use std::fmt;
use std::time::SystemTime;

use tokio_util::sync::CancellationToken;

use crate::channel::ControlChannel;
use crate::error::{ControlError, Result};
use crate::metrics::{MetricSet, TranslatorConfig};
use crate::stats::{parse_stats, ParsedStats};
use crate::transport::Connector;

const CMD_STATS: &str = "STATS";
const CMD_STATS_PROMETHEUS: &str = "STATS PROMETHEUS";
const CMD_RELOAD: &str = "RELOAD";
const CMD_LICENSE: &str = "LICENSE";
const CMD_CONFIG_ORIGINAL: &str = "CONFIG GET ORIGINAL";
const CMD_CONFIG_PREPROCESSED: &str = "CONFIG GET PREPROCESSED";
const CMD_CONFIG_ID: &str = "CONFIG ID";
/// Any command the daemon does not know works as a ping.
const CMD_PING: &str = "invalid";

/// Internal log verbosity switches of the daemon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogMode {
    Debug,
    Verbose,
    Trace,
}

impl LogMode {
    pub fn as_str(self) -> &'static str {
        match self {
            LogMode::Debug => "DEBUG",
            LogMode::Verbose => "VERBOSE",
            LogMode::Trace => "TRACE",
        }
    }
}

impl fmt::Display for LogMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Session with one daemon.
pub struct Controller<C> {
    channel: ControlChannel<C>,
    translator: TranslatorConfig,
    last_poll: Option<SystemTime>,
}

#[cfg(unix)]
impl Controller<crate::transport::UnixConnector> {
    /// Controller for the control socket at `path`, with default settings.
    pub fn unix(path: impl Into<std::path::PathBuf>) -> Self {
        Self::new(ControlChannel::new(crate::transport::UnixConnector::new(path)))
    }
}

impl<C: Connector> Controller<C> {
    /// Create a controller with the default translation settings.
    pub fn new(channel: ControlChannel<C>) -> Self {
        Self {
            channel,
            translator: TranslatorConfig::default(),
            last_poll: None,
        }
    }

    /// Replace the translation settings.
    pub fn with_translator(mut self, translator: TranslatorConfig) -> Self {
        self.translator = translator;
        self
    }

    pub fn channel(&self) -> &ControlChannel<C> {
        &self.channel
    }

    pub fn translator(&self) -> &TranslatorConfig {
        &self.translator
    }

    /// When `STATS PROMETHEUS` was last polled, if ever.
    pub fn last_poll(&self) -> Option<SystemTime> {
        self.last_poll
    }

    /// Fetch the legacy stats table. Orphaned rows follow the translator's
    /// orphan policy.
    pub async fn stats(&self) -> Result<ParsedStats> {
        self.stats_with(&CancellationToken::new()).await
    }

    /// [`stats`](Self::stats), cancelled by `cancel`.
    pub async fn stats_with(&self, cancel: &CancellationToken) -> Result<ParsedStats> {
        let rsp = self.channel.send_command_with(CMD_STATS, cancel).await?;
        let mut parsed = parse_stats(&rsp);
        self.translator.orphans.apply(&mut parsed.stats);
        Ok(parsed)
    }

    /// Fetch the stats as metric families.
    ///
    /// The poll time is recorded whether or not the command succeeds.
    pub async fn stats_prometheus(&mut self) -> Result<MetricSet> {
        self.stats_prometheus_with(&CancellationToken::new()).await
    }

    /// [`stats_prometheus`](Self::stats_prometheus), cancelled by `cancel`.
    pub async fn stats_prometheus_with(&mut self, cancel: &CancellationToken) -> Result<MetricSet> {
        let previous = self.last_poll;
        let result = self
            .channel
            .send_command_with(CMD_STATS_PROMETHEUS, cancel)
            .await;
        let now = SystemTime::now();
        self.last_poll = Some(now);

        let rsp = result?;
        let set = self.translator.translate(&rsp, previous, now);
        if !set.is_clean() {
            tracing::warn!(
                "Stats translation produced {} families and {} errors",
                set.families.len(),
                set.errors.len()
            );
        }
        Ok(set)
    }

    /// Check that the daemon is listening.
    ///
    /// An `OK` answer counts, and so does a daemon closing the stream without
    /// answering. A `FAIL` answer is returned as [`ControlError::CommandFailed`].
    pub async fn ping(&self) -> Result<()> {
        self.ping_with(&CancellationToken::new()).await
    }

    /// [`ping`](Self::ping), cancelled by `cancel`.
    pub async fn ping_with(&self, cancel: &CancellationToken) -> Result<()> {
        match self.channel.send_command_with(CMD_PING, cancel).await {
            Ok(_) => Ok(()),
            Err(e) if e.is_eof() && e.partial_response().map_or(false, |r| r.trim().is_empty()) => {
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Ask the daemon to reload its configuration.
    pub async fn reload(&self) -> Result<()> {
        self.reload_with(&CancellationToken::new()).await
    }

    /// [`reload`](Self::reload), cancelled by `cancel`.
    pub async fn reload_with(&self, cancel: &CancellationToken) -> Result<()> {
        self.channel.send_command_with(CMD_RELOAD, cancel).await?;
        Ok(())
    }

    /// License information, trimmed.
    pub async fn license_info(&self) -> Result<String> {
        self.license_info_with(&CancellationToken::new()).await
    }

    /// [`license_info`](Self::license_info), cancelled by `cancel`.
    pub async fn license_info_with(&self, cancel: &CancellationToken) -> Result<String> {
        let rsp = self.channel.send_command_with(CMD_LICENSE, cancel).await?;
        Ok(rsp.trim().to_string())
    }

    /// The configuration as written.
    pub async fn original_config(&self) -> Result<String> {
        self.original_config_with(&CancellationToken::new()).await
    }

    /// [`original_config`](Self::original_config), cancelled by `cancel`.
    pub async fn original_config_with(&self, cancel: &CancellationToken) -> Result<String> {
        self.channel.send_command_with(CMD_CONFIG_ORIGINAL, cancel).await
    }

    /// The configuration after include and macro processing.
    pub async fn preprocessed_config(&self) -> Result<String> {
        self.preprocessed_config_with(&CancellationToken::new()).await
    }

    /// [`preprocessed_config`](Self::preprocessed_config), cancelled by `cancel`.
    pub async fn preprocessed_config_with(&self, cancel: &CancellationToken) -> Result<String> {
        self.channel
            .send_command_with(CMD_CONFIG_PREPROCESSED, cancel)
            .await
    }

    /// Identifier of the running configuration.
    pub async fn config_id(&self) -> Result<String> {
        self.config_id_with(&CancellationToken::new()).await
    }

    /// [`config_id`](Self::config_id), cancelled by `cancel`.
    pub async fn config_id_with(&self, cancel: &CancellationToken) -> Result<String> {
        self.channel.send_command_with(CMD_CONFIG_ID, cancel).await
    }

    /// Whether `mode` logging is on.
    pub async fn log_level(&self, mode: LogMode) -> Result<bool> {
        self.log_level_with(mode, &CancellationToken::new()).await
    }

    /// [`log_level`](Self::log_level), cancelled by `cancel`.
    pub async fn log_level_with(&self, mode: LogMode, cancel: &CancellationToken) -> Result<bool> {
        let rsp = self
            .channel
            .send_command_with(&format!("LOG {}", mode), cancel)
            .await?;
        parse_log_mode(&rsp, mode)
    }

    /// Turn `mode` logging on or off.
    pub async fn set_log_level(&self, mode: LogMode, on: bool) -> Result<()> {
        self.set_log_level_with(mode, on, &CancellationToken::new()).await
    }

    /// [`set_log_level`](Self::set_log_level), cancelled by `cancel`.
    pub async fn set_log_level_with(
        &self,
        mode: LogMode,
        on: bool,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let switch = if on { "ON" } else { "OFF" };
        self.channel
            .send_command_with(&format!("LOG {} {}", mode, switch), cancel)
            .await?;
        Ok(())
    }
}

/// Parse a `LOG <MODE>` answer such as `DEBUG=1`.
fn parse_log_mode(rsp: &str, mode: LogMode) -> Result<bool> {
    for field in rsp.split_whitespace() {
        if field == "OK" {
            continue;
        }
        return match field.strip_prefix(mode.as_str()) {
            Some("=1") => Ok(true),
            Some("=0") => Ok(false),
            _ => Err(ControlError::UnexpectedResponse(rsp.to_string())),
        };
    }
    Err(ControlError::UnexpectedResponse(rsp.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{MetricKind, DELAY_FAMILY};
    use crate::stats::{OrphanPolicy, SourceState};
    use crate::transport::FnConnector;
    use std::io;
    use std::sync::{Arc, Mutex};
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream};

    /// Controller whose daemon answers each command with `reply(command)`,
    /// or closes the stream on `None`.
    fn fake_controller(
        reply: fn(&str) -> Option<String>,
    ) -> (
        Controller<impl Connector<Stream = DuplexStream>>,
        Arc<Mutex<Vec<String>>>,
    ) {
        let received = Arc::new(Mutex::new(Vec::new()));
        let log = received.clone();

        let connector = FnConnector::new(move || {
            let log = log.clone();
            async move {
                let (client, daemon) = tokio::io::duplex(4096);
                tokio::spawn(async move {
                    let mut daemon = BufReader::new(daemon);
                    let mut line = String::new();
                    if daemon.read_line(&mut line).await.is_err() {
                        return;
                    }
                    let command = line.trim_end_matches('\n').to_string();
                    let rsp = reply(&command);
                    log.lock().unwrap().push(command);
                    if let Some(rsp) = rsp {
                        let _ = daemon.write_all(rsp.as_bytes()).await;
                    }
                });
                Ok::<_, io::Error>(client)
            }
        });

        (Controller::new(ControlChannel::new(connector)), received)
    }

    fn commands(received: &Arc<Mutex<Vec<String>>>) -> Vec<String> {
        received.lock().unwrap().clone()
    }

    #[tokio::test]
    async fn test_stats_drops_orphans_by_default() {
        let (controller, received) = fake_controller(|_| {
            Some(
                "SourceName;SourceId;SourceInstance;State;Type;Number\n\
                 source;s_src;;a;processed;65\n\
                 dst.network;#anon-destination0#0;tcp,localhost:1234;o;dropped;0\n\
                 .\n"
                    .to_string(),
            )
        });

        let parsed = controller.stats().await.unwrap();

        assert!(parsed.is_clean());
        assert_eq!(parsed.stats.len(), 1);
        assert_eq!(parsed.stats[0].source_id, "s_src");
        assert_eq!(parsed.stats[0].number, 65);
        assert_eq!(commands(&received), ["STATS"]);
    }

    #[tokio::test]
    async fn test_stats_keeps_orphans_on_request() {
        let (controller, _) = fake_controller(|_| {
            Some("SourceName;SourceId;SourceInstance;State;Type;Number\nd;x;;o;dropped;1\n.\n".to_string())
        });
        let controller = controller.with_translator(TranslatorConfig::default().orphans(OrphanPolicy::Keep));

        let parsed = controller.stats().await.unwrap();

        assert_eq!(parsed.stats[0].state, SourceState::Orphaned);
    }

    #[tokio::test]
    async fn test_stats_prometheus_tracks_polls() {
        let (mut controller, received) = fake_controller(|_| {
            Some(
                "syslogng_input_events_total{id=\"s\",result=\"processed\"} 3\n\
                 syslogng_output_event_delay_sample_seconds{id=\"d\"} 2\n\
                 syslogng_output_event_delay_sample_age_seconds{id=\"d\"} 3600\n\
                 .\n"
                    .to_string(),
            )
        });
        assert!(controller.last_poll().is_none());

        let first = controller.stats_prometheus().await.unwrap();
        let first_poll = controller.last_poll().unwrap();

        assert_eq!(first.get("syslogng_input_events_total").unwrap().kind, MetricKind::Counter);
        assert_eq!(first.get(DELAY_FAMILY).unwrap().samples.len(), 1);

        // Same sample again: taken before the previous poll
        let second = controller.stats_prometheus().await.unwrap();

        assert!(second.get(DELAY_FAMILY).is_none());
        assert!(controller.last_poll().unwrap() >= first_poll);
        assert_eq!(commands(&received), ["STATS PROMETHEUS", "STATS PROMETHEUS"]);
    }

    #[tokio::test]
    async fn test_stats_prometheus_failure_still_records_poll() {
        let (mut controller, _) = fake_controller(|_| Some("FAIL busy\n.\n".to_string()));

        let err = controller.stats_prometheus().await.unwrap_err();

        assert!(matches!(err, ControlError::CommandFailed(msg) if msg == "busy"));
        assert!(controller.last_poll().is_some());
    }

    #[tokio::test]
    async fn test_ping_on_silent_close() {
        let (controller, received) = fake_controller(|_| None);

        controller.ping().await.unwrap();
        assert_eq!(commands(&received), ["invalid"]);
    }

    #[tokio::test]
    async fn test_ping_on_ok_answer() {
        let (controller, _) = fake_controller(|_| Some("OK\n.\n".to_string()));

        controller.ping().await.unwrap();
    }

    #[tokio::test]
    async fn test_ping_failure_answer_is_error() {
        let (controller, _) = fake_controller(|_| Some("FAIL Invalid command\n.\n".to_string()));

        let err = controller.ping().await.unwrap_err();
        assert!(matches!(err, ControlError::CommandFailed(msg) if msg == "Invalid command"));
    }

    #[tokio::test]
    async fn test_cancelled_call_leaves_session_usable() {
        let (mut controller, received) = fake_controller(|cmd| match cmd {
            "LICENSE" => Some("OK community\n.\n".to_string()),
            _ => Some("syslogng_g 1\n.\n".to_string()),
        });
        let token = CancellationToken::new();
        token.cancel();

        assert!(matches!(
            controller.license_info_with(&token).await,
            Err(ControlError::Cancelled)
        ));
        assert!(matches!(
            controller.stats_prometheus_with(&token).await,
            Err(ControlError::Cancelled)
        ));

        assert_eq!(controller.license_info().await.unwrap(), "community");
        assert_eq!(controller.license_info().await.unwrap(), "community");
        let fresh = CancellationToken::new();
        let set = controller.stats_prometheus_with(&fresh).await.unwrap();
        assert_eq!(set.get("syslogng_g").unwrap().samples.len(), 1);
        assert_eq!(commands(&received), ["LICENSE", "LICENSE", "STATS PROMETHEUS"]);
    }

    #[tokio::test]
    async fn test_ping_partial_answer_is_error() {
        let (controller, _) = fake_controller(|_| Some("garbage".to_string()));

        let err = controller.ping().await.unwrap_err();
        assert!(matches!(err, ControlError::MissingTerminator { .. }));
    }

    #[tokio::test]
    async fn test_ping_connect_failure() {
        let connector = FnConnector::new(|| async {
            Err::<DuplexStream, _>(io::Error::new(io::ErrorKind::ConnectionRefused, "refused"))
        });
        let controller = Controller::new(ControlChannel::new(connector));

        assert!(matches!(controller.ping().await, Err(ControlError::Connect(_))));
    }

    #[tokio::test]
    async fn test_simple_commands() {
        let (controller, received) = fake_controller(|cmd| {
            let rsp = match cmd {
                "LICENSE" => "OK  License: community \n.\n",
                "CONFIG ID" => "OK 1700000000.1234\n.\n",
                "CONFIG GET ORIGINAL" => "@version: 4.5\nlog { };\n.\n",
                "CONFIG GET PREPROCESSED" => "@version: 4.5\n# preprocessed\n.\n",
                _ => "OK Config reload successful\n.\n",
            };
            Some(rsp.to_string())
        });

        assert_eq!(controller.license_info().await.unwrap(), "License: community");
        assert_eq!(controller.config_id().await.unwrap(), "1700000000.1234");
        assert_eq!(controller.original_config().await.unwrap(), "@version: 4.5\nlog { };");
        assert_eq!(
            controller.preprocessed_config().await.unwrap(),
            "@version: 4.5\n# preprocessed"
        );
        controller.reload().await.unwrap();

        assert_eq!(
            commands(&received),
            ["LICENSE", "CONFIG ID", "CONFIG GET ORIGINAL", "CONFIG GET PREPROCESSED", "RELOAD"]
        );
    }

    #[tokio::test]
    async fn test_reload_failure() {
        let (controller, _) = fake_controller(|_| Some("FAIL Error while reloading\n.\n".to_string()));

        let err = controller.reload().await.unwrap_err();
        assert!(matches!(err, ControlError::CommandFailed(msg) if msg == "Error while reloading"));
    }

    #[tokio::test]
    async fn test_log_level() {
        let (controller, received) = fake_controller(|cmd| match cmd {
            "LOG DEBUG" => Some("DEBUG=1\n.\n".to_string()),
            "LOG VERBOSE" => Some("OK VERBOSE=0\n.\n".to_string()),
            "LOG TRACE" => Some("OK nonsense\n.\n".to_string()),
            _ => Some("OK TRACE=1\n.\n".to_string()),
        });

        assert!(controller.log_level(LogMode::Debug).await.unwrap());
        assert!(!controller.log_level(LogMode::Verbose).await.unwrap());
        assert!(matches!(
            controller.log_level(LogMode::Trace).await,
            Err(ControlError::UnexpectedResponse(rsp)) if rsp == "nonsense"
        ));
        controller.set_log_level(LogMode::Trace, true).await.unwrap();
        controller.set_log_level(LogMode::Debug, false).await.unwrap();

        assert_eq!(
            commands(&received),
            ["LOG DEBUG", "LOG VERBOSE", "LOG TRACE", "LOG TRACE ON", "LOG DEBUG OFF"]
        );
    }

    #[test]
    fn test_parse_log_mode() {
        assert!(parse_log_mode("OK\nDEBUG=1", LogMode::Debug).unwrap());
        assert!(!parse_log_mode("TRACE=0", LogMode::Trace).unwrap());
        assert!(parse_log_mode("VERBOSE=1", LogMode::Debug).is_err());
        assert!(parse_log_mode("DEBUG=2", LogMode::Debug).is_err());
        assert!(parse_log_mode("OK", LogMode::Debug).is_err());
        assert!(parse_log_mode("", LogMode::Debug).is_err());
    }
}
