//! Continuous event log retrieval.
//!
//! [`EventLogPoller`] repeatedly scans a log endpoint over the window
//! `[position, now - collection delay]`, writes every event it has not
//! delivered yet to an [`OutputSink`], and sleeps between scans:
//!
//! ```text
//! Idle → Polling → Draining → Sleeping → (Polling | Stopped)
//! ```
//!
//! Guarantees within one running session:
//! - Events reach the sink in server order with non-decreasing
//!   timestamps. Events sharing a millisecond are told apart by identifier,
//!   and nothing covered by the delivery watermark is written twice.
//! - The acknowledged [`EventPosition`] moves only after every page of a
//!   cycle has been drained and flushed. A failed cycle re-requests the same
//!   window, so a transient failure can delay events but never skip them.
//! - Transient failures (transport, 5xx, 429, malformed bodies, other
//!   non-auth statuses) back off exponentially up to a cap. A 401/403 or a
//!   broken output stream ends the run.
//! - A stop request is honoured at the next safe point: immediately while
//!   sleeping, or as soon as the in-flight request returns while polling.
//!   The sink is closed exactly once on the way out.

use std::io::Write;
use std::time::{Duration, Instant};

use reqwest::StatusCode;
use tracing::{debug, error, info, warn};

use crate::auth::Endpoint;
use crate::cancel::{CancellationController, WaitOutcome};
use crate::client::EaaClient;
use crate::error::{EaaError, ErrorClass, Result};
use crate::event::{EventPosition, LogEvent};
use crate::output::OutputSink;
use crate::pagination::{MAX_PAGE_LIMIT, pages};
use crate::retry::{BackoffPolicy, RetryState};

/// Default pause between two polls in follow mode.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(15);

/// Default lag of the window's upper bound behind the current time, giving
/// the service time to index recent events.
pub const DEFAULT_COLLECTION_DELAY: Duration = Duration::from_secs(60);

/// Value of the `source` query parameter identifying this client.
const SOURCE: &str = "eaactl";

/// Which event log to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogType {
    /// End-user access log.
    #[default]
    Access,
    /// Administrator audit log.
    Admin,
}

impl LogType {
    /// Legacy-generation endpoint serving this log.
    pub fn endpoint(self) -> Endpoint {
        match self {
            LogType::Access => Endpoint::legacy("analytics/ops"),
            LogType::Admin => Endpoint::legacy("adminevents-reports/ops/splunk-query"),
        }
    }

    /// Short name used in logs and on the command line.
    pub fn as_str(self) -> &'static str {
        match self {
            LogType::Access => "access",
            LogType::Admin => "admin",
        }
    }
}

/// Poller settings.
#[derive(Debug, Clone)]
pub struct PollConfig {
    /// Log to read.
    pub log_type: LogType,
    /// Start of the first window, in epoch milliseconds. `None` starts one
    /// poll interval before the first window's end.
    pub start: Option<i64>,
    /// End of the window in range mode, in epoch milliseconds. `None` means
    /// now minus the collection delay. Ignored in follow mode.
    pub end: Option<i64>,
    /// Keep polling until stopped (`true`) or run a single cycle (`false`).
    pub follow: bool,
    /// Pause between the start of two successful polls.
    pub poll_interval: Duration,
    /// Lag of each window's upper bound behind the current time.
    pub collection_delay: Duration,
    /// Items requested per page, capped at [`MAX_PAGE_LIMIT`].
    pub page_limit: u32,
    /// Backoff applied to transient failures.
    pub backoff: BackoffPolicy,
}

impl Default for PollConfig {
    fn default() -> Self {
        PollConfig {
            log_type: LogType::Access,
            start: None,
            end: None,
            follow: false,
            poll_interval: DEFAULT_POLL_INTERVAL,
            collection_delay: DEFAULT_COLLECTION_DELAY,
            page_limit: MAX_PAGE_LIMIT,
            backoff: BackoffPolicy::default(),
        }
    }
}

/// States of the poll loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    /// Not started; no position acknowledged yet.
    Idle,
    /// A page request is in flight.
    Polling,
    /// Writing the events of a received page.
    Draining,
    /// Waiting for the next poll or for a backoff delay.
    Sleeping,
    /// Terminal. The sink has been closed.
    Stopped,
}

/// Why a run ended without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Range mode: the single window was fully drained.
    Completed,
    /// A stop request was observed between polls.
    Interrupted,
    /// A stop request arrived while a request was in flight and was
    /// honoured as soon as it returned.
    InterruptedDuringPoll,
}

/// Inclusive scan window in epoch milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    /// Lower bound (`sts`).
    pub start: i64,
    /// Upper bound (`ets`).
    pub end: i64,
}

/// Counters reported when a run ends.
#[derive(Debug, Clone)]
pub struct RunSummary {
    /// Why the loop stopped.
    pub reason: StopReason,
    /// Events written to the sink.
    pub events_emitted: u64,
    /// Events received but already delivered (overlapping windows).
    pub events_skipped: u64,
    /// Cycles drained completely.
    pub cycles: u64,
    /// Polls that failed transiently and were retried after a backoff.
    pub failed_polls: u64,
    /// Longest backoff delay applied during the run.
    pub longest_backoff: Duration,
    /// Every backoff delay applied, in order.
    pub backoff_delays: Vec<Duration>,
    /// Last window requested, if any.
    pub last_window: Option<Window>,
    /// Bytes written to the sink.
    pub bytes_written: u64,
}

enum CycleOutcome {
    Drained,
    Interrupted,
}

/// Polls one event log and writes new events to a sink.
///
/// Owns the acknowledged position and the retry state; both live only as
/// long as the poller.
#[derive(Debug)]
pub struct EventLogPoller<'a> {
    client: &'a EaaClient,
    config: PollConfig,
    endpoint: Endpoint,
    state: PollState,
    /// Last acknowledged position: every event it covers is delivered.
    position: Option<EventPosition>,
    /// Newest position written to the sink, possibly ahead of `position`
    /// while a cycle is partially drained.
    delivered: Option<EventPosition>,
    /// Lower bound of the first window when no start was supplied.
    origin: Option<i64>,
    retry: RetryState,
    events_emitted: u64,
    events_skipped: u64,
    cycles: u64,
    failed_polls: u64,
    longest_backoff: Duration,
    backoff_delays: Vec<Duration>,
    last_window: Option<Window>,
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

fn millis(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}

impl<'a> EventLogPoller<'a> {
    /// Creates an idle poller.
    ///
    /// A configured `start` becomes the initial position, so the first
    /// window begins there and events stamped exactly `start` are included.
    pub fn new(client: &'a EaaClient, mut config: PollConfig) -> Self {
        config.page_limit = config.page_limit.clamp(1, MAX_PAGE_LIMIT);
        EventLogPoller {
            client,
            endpoint: config.log_type.endpoint(),
            state: PollState::Idle,
            position: config.start.map(EventPosition::floor),
            delivered: None,
            origin: None,
            retry: RetryState::new(config.backoff),
            config,
            events_emitted: 0,
            events_skipped: 0,
            cycles: 0,
            failed_polls: 0,
            longest_backoff: Duration::ZERO,
            backoff_delays: Vec::new(),
            last_window: None,
        }
    }

    /// Current state of the loop.
    pub fn state(&self) -> PollState {
        self.state
    }

    /// Last acknowledged position, `None` until one is known.
    pub fn position(&self) -> Option<&EventPosition> {
        self.position.as_ref()
    }

    /// Consecutive transient failures since the last successful poll.
    pub fn consecutive_failures(&self) -> u32 {
        self.retry.failures()
    }

    /// Runs the loop until it completes, is stopped, or hits a fatal error,
    /// then closes `sink`.
    ///
    /// # Errors
    ///
    /// - `EaaError::Api` with a 401/403 status: credentials were rejected.
    /// - `EaaError::Output`: the sink could not be written.
    /// - `EaaError::Config`: the endpoint cannot be addressed.
    pub async fn run<W: Write>(
        &mut self,
        sink: &mut OutputSink<W>,
        cancel: &CancellationController,
    ) -> Result<RunSummary> {
        info!(
            log_type = self.config.log_type.as_str(),
            follow = self.config.follow,
            interval_secs = self.config.poll_interval.as_secs(),
            "starting event log retrieval"
        );

        let outcome = self.run_loop(sink, cancel).await;
        self.state = PollState::Stopped;
        let closed = sink.close();

        let reason = match outcome {
            Ok(reason) => reason,
            Err(e) => {
                if let Err(close_err) = closed {
                    warn!(error = %close_err, "failed to close output after fatal error");
                }
                return Err(e);
            }
        };
        closed?;

        info!(
            events = self.events_emitted,
            cycles = self.cycles,
            failed_polls = self.failed_polls,
            reason = ?reason,
            "event log retrieval stopped"
        );

        Ok(RunSummary {
            reason,
            events_emitted: self.events_emitted,
            events_skipped: self.events_skipped,
            cycles: self.cycles,
            failed_polls: self.failed_polls,
            longest_backoff: self.longest_backoff,
            backoff_delays: self.backoff_delays.clone(),
            last_window: self.last_window,
            bytes_written: sink.bytes(),
        })
    }

    async fn run_loop<W: Write>(
        &mut self,
        sink: &mut OutputSink<W>,
        cancel: &CancellationController,
    ) -> Result<StopReason> {
        loop {
            if cancel.stop_requested() {
                return Ok(StopReason::Interrupted);
            }

            self.state = PollState::Polling;
            let started = Instant::now();
            let window = self.next_window(now_millis());
            self.last_window = Some(window);
            debug!(
                log_type = self.config.log_type.as_str(),
                sts = window.start,
                ets = window.end,
                "polling"
            );

            let delay = match self.poll_cycle(window, sink, cancel).await {
                Ok(CycleOutcome::Interrupted) => return Ok(StopReason::InterruptedDuringPoll),
                Ok(CycleOutcome::Drained) => {
                    self.acknowledge();
                    if cancel.stop_requested() {
                        return Ok(StopReason::InterruptedDuringPoll);
                    }
                    if !self.config.follow {
                        return Ok(StopReason::Completed);
                    }
                    self.config.poll_interval.saturating_sub(started.elapsed())
                }
                Err(e) if e.class() == ErrorClass::Fatal => {
                    error!(
                        endpoint = %self.endpoint.path,
                        error = %e,
                        "fatal error, stopping event log retrieval"
                    );
                    return Err(e);
                }
                Err(e) => {
                    let delay = self.record_transient(&e);
                    if cancel.stop_requested() {
                        return Ok(StopReason::InterruptedDuringPoll);
                    }
                    delay
                }
            };

            self.state = PollState::Sleeping;
            if cancel.wait_or_stop(delay).await == WaitOutcome::Stopped {
                return Ok(StopReason::Interrupted);
            }
        }
    }

    /// Window for the next poll: from the acknowledged position (or the
    /// origin) up to `now` minus the collection delay.
    fn next_window(&mut self, now: i64) -> Window {
        let end = match (self.config.follow, self.config.end) {
            (false, Some(end)) => end,
            _ => now - millis(self.config.collection_delay),
        };
        let start = match &self.position {
            Some(position) => position.timestamp,
            None => *self
                .origin
                .get_or_insert(end - millis(self.config.poll_interval)),
        };
        Window {
            start: start.min(end),
            end,
        }
    }

    /// Fetches every page of `window` and writes undelivered events.
    async fn poll_cycle<W: Write>(
        &mut self,
        window: Window,
        sink: &mut OutputSink<W>,
        cancel: &CancellationController,
    ) -> Result<CycleOutcome> {
        let params = vec![
            ("sts".to_string(), window.start.to_string()),
            ("ets".to_string(), window.end.to_string()),
            ("source".to_string(), SOURCE.to_string()),
        ];
        let mut pager = pages::<LogEvent>(
            self.client,
            self.endpoint.clone(),
            params,
            self.config.page_limit,
        );

        while let Some(page) = pager.next_page().await {
            let page = page?;
            self.state = PollState::Draining;
            for event in &page.items {
                self.deliver(event, sink)?;
            }
            if page.has_more && cancel.stop_requested() {
                return Ok(CycleOutcome::Interrupted);
            }
            self.state = PollState::Polling;
        }

        Ok(CycleOutcome::Drained)
    }

    /// Writes `event` unless the delivery watermark already covers it.
    fn deliver<W: Write>(&mut self, event: &LogEvent, sink: &mut OutputSink<W>) -> Result<()> {
        let watermark = self.delivered.as_ref().or(self.position.as_ref());
        if watermark.is_some_and(|watermark| watermark.covers(event)) {
            debug!(timestamp = event.timestamp, id = %event.id, "event already delivered, skipped");
            self.events_skipped += 1;
            return Ok(());
        }

        sink.emit(event)?;
        self.events_emitted += 1;
        match &mut self.delivered {
            Some(delivered) => delivered.advance(event),
            None => {
                // Carry over the identifiers acknowledged at the same timestamp.
                let mut delivered = self
                    .position
                    .clone()
                    .unwrap_or_else(|| EventPosition::floor(event.timestamp));
                delivered.advance(event);
                self.delivered = Some(delivered);
            }
        }
        Ok(())
    }

    /// Moves the acknowledged position to everything delivered so far and
    /// resets the retry state.
    fn acknowledge(&mut self) {
        if let Some(delivered) = self.delivered.take() {
            debug!(position = %delivered, "position advanced");
            self.position = Some(delivered);
        }
        self.retry.reset();
        self.cycles += 1;
    }

    fn record_transient(&mut self, err: &EaaError) -> Duration {
        let delay = self.retry.record_failure();
        self.failed_polls += 1;
        self.longest_backoff = self.longest_backoff.max(delay);
        self.backoff_delays.push(delay);
        let attempt = self.retry.failures();
        let endpoint = self.endpoint.path.as_str();

        match err {
            EaaError::Parse(_) => error!(
                endpoint,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "malformed response, retrying"
            ),
            EaaError::Api { status, .. } if is_unexpected_client_error(*status) => error!(
                endpoint,
                status = status.as_u16(),
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "unexpected API status, retrying"
            ),
            _ => debug!(
                endpoint,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "transient failure, retrying"
            ),
        }
        delay
    }
}

/// 4xx statuses that are neither throttling nor request timeouts.
fn is_unexpected_client_error(status: StatusCode) -> bool {
    status.is_client_error()
        && status != StatusCode::TOO_MANY_REQUESTS
        && status != StatusCode::REQUEST_TIMEOUT
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{ApiGeneration, Credentials};

    fn client() -> EaaClient {
        let creds = Credentials {
            host: "tenant.example.net".to_string(),
            key_id: "key".to_string(),
            secret: "secret".to_string(),
            access_token: String::new(),
        };
        EaaClient::with_base_url(creds, "http://127.0.0.1:1/").unwrap()
    }

    fn event(id: &str, ts: i64) -> LogEvent {
        LogEvent {
            id: id.to_string(),
            timestamp: ts,
            category: "access".to_string(),
            payload: serde_json::Map::new(),
        }
    }

    #[test]
    fn log_types_use_legacy_endpoints() {
        assert_eq!(LogType::Access.endpoint().path, "analytics/ops");
        assert_eq!(
            LogType::Admin.endpoint().path,
            "adminevents-reports/ops/splunk-query"
        );
        assert_eq!(LogType::Admin.endpoint().generation, ApiGeneration::Legacy);
    }

    #[test]
    fn new_poller_is_idle_with_start_as_position() {
        let client = client();
        let poller = EventLogPoller::new(
            &client,
            PollConfig {
                start: Some(1_000),
                ..PollConfig::default()
            },
        );
        assert_eq!(poller.state(), PollState::Idle);
        assert_eq!(poller.position(), Some(&EventPosition::floor(1_000)));
    }

    #[test]
    fn page_limit_is_clamped_to_server_cap() {
        let client = client();
        let poller = EventLogPoller::new(
            &client,
            PollConfig {
                page_limit: 50_000,
                ..PollConfig::default()
            },
        );
        assert_eq!(poller.config.page_limit, MAX_PAGE_LIMIT);
    }

    #[test]
    fn first_window_without_start_spans_one_interval() {
        let client = client();
        let mut poller = EventLogPoller::new(
            &client,
            PollConfig {
                follow: true,
                poll_interval: Duration::from_secs(15),
                collection_delay: Duration::from_secs(60),
                ..PollConfig::default()
            },
        );
        let window = poller.next_window(1_000_000);
        assert_eq!(window.end, 940_000);
        assert_eq!(window.start, 925_000);
        // Without events the lower bound stays put while the end moves on.
        let later = poller.next_window(1_015_000);
        assert_eq!(later.start, 925_000);
        assert_eq!(later.end, 955_000);
    }

    #[test]
    fn range_mode_uses_configured_end() {
        let client = client();
        let mut poller = EventLogPoller::new(
            &client,
            PollConfig {
                start: Some(100),
                end: Some(200),
                ..PollConfig::default()
            },
        );
        assert_eq!(poller.next_window(10_000_000), Window { start: 100, end: 200 });
    }

    #[test]
    fn deliver_skips_events_at_or_below_position() {
        let client = client();
        let mut poller = EventLogPoller::new(
            &client,
            PollConfig {
                start: Some(10),
                ..PollConfig::default()
            },
        );
        let mut sink = OutputSink::new(Vec::new(), ",");
        poller.deliver(&event("a", 9), &mut sink).unwrap();
        poller.deliver(&event("b", 10), &mut sink).unwrap();
        poller.deliver(&event("b", 10), &mut sink).unwrap();
        poller.deliver(&event("c", 11), &mut sink).unwrap();
        assert_eq!(poller.events_emitted, 2);
        assert_eq!(poller.events_skipped, 2);
        assert_eq!(sink.lines(), 2);
    }

    #[test]
    fn same_millisecond_numeric_ids_are_all_delivered_once() {
        let client = client();
        let mut poller = EventLogPoller::new(
            &client,
            PollConfig {
                start: Some(100),
                ..PollConfig::default()
            },
        );
        let mut sink = OutputSink::new(Vec::new(), ",");
        for id in ["9", "10", "11"] {
            poller.deliver(&event(id, 100), &mut sink).unwrap();
        }
        poller.acknowledge();
        // Overlapping window after the acknowledgement.
        for id in ["9", "10", "11", "12"] {
            poller.deliver(&event(id, 100), &mut sink).unwrap();
        }
        assert_eq!(poller.events_emitted, 4);
        assert_eq!(poller.events_skipped, 3);
        let text = String::from_utf8(sink.into_inner()).unwrap();
        let ids: Vec<&str> = text.lines().map(|l| l.rsplit(',').next().unwrap()).collect();
        assert_eq!(ids, vec!["9", "10", "11", "12"]);
    }

    #[test]
    fn acknowledge_moves_position_to_newest_delivered_and_resets_retry() {
        let client = client();
        let mut poller = EventLogPoller::new(&client, PollConfig::default());
        let mut sink = OutputSink::new(Vec::new(), ",");
        poller.retry.record_failure();
        poller.deliver(&event("x", 5), &mut sink).unwrap();
        poller.deliver(&event("y", 7), &mut sink).unwrap();
        assert_eq!(poller.position(), None, "position moves only on acknowledge");
        poller.acknowledge();
        assert_eq!(
            poller.position(),
            Some(&EventPosition::at(7, "y"))
        );
        assert_eq!(poller.consecutive_failures(), 0);
    }

    #[test]
    fn empty_cycle_leaves_position_unchanged() {
        let client = client();
        let mut poller = EventLogPoller::new(
            &client,
            PollConfig {
                start: Some(42),
                ..PollConfig::default()
            },
        );
        poller.acknowledge();
        assert_eq!(poller.position(), Some(&EventPosition::floor(42)));
        assert_eq!(poller.cycles, 1);
    }

    #[test]
    fn unexpected_client_errors_exclude_throttling() {
        assert!(is_unexpected_client_error(StatusCode::NOT_FOUND));
        assert!(!is_unexpected_client_error(StatusCode::TOO_MANY_REQUESTS));
        assert!(!is_unexpected_client_error(StatusCode::REQUEST_TIMEOUT));
        assert!(!is_unexpected_client_error(StatusCode::BAD_GATEWAY));
    }
}
