use crate::domain::address::{Address, Reference};
use crate::domain::ledger::{Commitment, Signature};
use crate::domain::ports::LedgerClientRef;
use crate::error::LedgerError;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_SIGNATURE_LIMIT: usize = 10;
/// Shortest interval a poller runs with; shorter configured intervals are raised to it.
pub const MIN_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollerConfig {
    /// Delay between two ledger checks. The first check happens one interval after start.
    /// Values below [`MIN_INTERVAL`] are raised to it.
    pub interval: Duration,
    /// How many history entries to request per check. Only the newest is inspected.
    pub signature_limit: usize,
    pub commitment: Commitment,
    /// Give up after this long. `None` polls until confirmed or stopped.
    pub timeout: Option<Duration>,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            signature_limit: DEFAULT_SIGNATURE_LIMIT,
            commitment: Commitment::Confirmed,
            timeout: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollerState {
    Idle,
    Polling,
    Confirmed(Signature),
    Cancelled,
    Expired,
}

impl PollerState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PollerState::Confirmed(_) | PollerState::Cancelled | PollerState::Expired
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Success,
    Warning,
    Error,
}

/// Notifications emitted while a payment is being verified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentEvent {
    Status { message: String, severity: Severity },
    Confirmed { signature: Signature },
    Expired,
}

impl PaymentEvent {
    fn status(message: impl Into<String>, severity: Severity) -> Self {
        PaymentEvent::Status {
            message: message.into(),
            severity,
        }
    }
}

/// What one check observed about the newest signature referencing the token.
#[derive(Debug)]
enum Observation {
    NoSignatures,
    Unresolved(Signature),
    Failed(Signature),
    Succeeded(Signature),
    /// `stop()` landed between the two ledger calls of a check.
    Stale,
}

/// Watches the ledger for a transaction referencing a correlation token.
///
/// `Idle -> Polling -> {Confirmed | Cancelled | Expired}`. The terminal states are final:
/// once reached, the background task is gone and no further ledger calls are made.
///
/// Each start is tagged with an epoch. `stop()` bumps the epoch, so a check that was already
/// in flight can complete but never applies its result.
pub struct VerificationPoller {
    ledger: LedgerClientRef,
    config: PollerConfig,
    state: Arc<watch::Sender<PollerState>>,
    epoch: Arc<AtomicU64>,
    reference: Option<Reference>,
    task: Option<JoinHandle<()>>,
}

impl VerificationPoller {
    pub fn new(ledger: LedgerClientRef, mut config: PollerConfig) -> Self {
        if config.interval < MIN_INTERVAL {
            tracing::warn!(
                interval = ?config.interval,
                min = ?MIN_INTERVAL,
                "poll interval too short, using minimum"
            );
            config.interval = MIN_INTERVAL;
        }
        let (state, _) = watch::channel(PollerState::Idle);
        Self {
            ledger,
            config,
            state: Arc::new(state),
            epoch: Arc::new(AtomicU64::new(0)),
            reference: None,
            task: None,
        }
    }

    pub fn config(&self) -> &PollerConfig {
        &self.config
    }

    /// Starts polling for `reference` on the current tokio runtime.
    ///
    /// Returns `false` without doing anything if the poller has already left `Idle`.
    pub fn start(
        &mut self,
        reference: Reference,
        events: mpsc::UnboundedSender<PaymentEvent>,
    ) -> bool {
        let started = self.state.send_if_modified(|state| {
            if *state == PollerState::Idle {
                *state = PollerState::Polling;
                true
            } else {
                false
            }
        });
        if !started {
            tracing::warn!(
                %reference,
                "poller already started, ignoring start request"
            );
            return false;
        }

        let epoch = self.epoch.load(Ordering::SeqCst);
        tracing::info!(
            %reference,
            interval = ?self.config.interval,
            "waiting for payment"
        );
        self.reference = Some(reference);
        let _ = events.send(PaymentEvent::status("Waiting for payment...", Severity::Info));

        let worker = PollWorker {
            ledger: Arc::clone(&self.ledger),
            config: self.config.clone(),
            reference,
            address: reference.to_address(),
            state: Arc::clone(&self.state),
            epoch_counter: Arc::clone(&self.epoch),
            epoch,
            events,
        };
        self.task = Some(tokio::spawn(worker.run()));
        true
    }

    /// Cancels polling. No-op once a terminal state has been reached.
    pub fn stop(&mut self) {
        let epoch = &self.epoch;
        let cancelled = self.state.send_if_modified(|state| {
            if state.is_terminal() {
                false
            } else {
                epoch.fetch_add(1, Ordering::SeqCst);
                *state = PollerState::Cancelled;
                true
            }
        });
        if let Some(task) = self.task.take() {
            task.abort();
        }
        if cancelled {
            tracing::info!(
                reference = self.reference.map(tracing::field::display),
                "payment verification cancelled"
            );
        }
    }

    pub fn state(&self) -> PollerState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<PollerState> {
        self.state.subscribe()
    }
}

impl Drop for VerificationPoller {
    fn drop(&mut self) {
        if self.task.is_some() {
            self.stop();
        }
    }
}

struct PollWorker {
    ledger: LedgerClientRef,
    config: PollerConfig,
    reference: Reference,
    address: Address,
    state: Arc<watch::Sender<PollerState>>,
    epoch_counter: Arc<AtomicU64>,
    epoch: u64,
    events: mpsc::UnboundedSender<PaymentEvent>,
}

impl PollWorker {
    fn is_current(&self) -> bool {
        self.epoch_counter.load(Ordering::SeqCst) == self.epoch
    }

    fn emit(&self, event: PaymentEvent) {
        let _ = self.events.send(event);
    }

    /// Moves `Polling -> next`, unless the state or the epoch changed underneath us.
    fn settle(&self, next: PollerState) -> bool {
        self.state.send_if_modified(|state| {
            if *state == PollerState::Polling && self.is_current() {
                *state = next;
                true
            } else {
                false
            }
        })
    }

    async fn run(self) {
        let period = self.config.interval;
        let mut ticker = time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let deadline = self.config.timeout.map(|timeout| Instant::now() + timeout);
        let mut stopped = self.state.subscribe();
        let mut last_seen: Option<Signature> = None;

        loop {
            tokio::select! {
                biased;
                _ = stopped.wait_for(PollerState::is_terminal) => return,
                _ = expiry(deadline) => {
                    if self.settle(PollerState::Expired) {
                        tracing::warn!(
                            reference = %self.reference,
                            "payment not received before timeout"
                        );
                        self.emit(PaymentEvent::status(
                            "Payment not received before timeout",
                            Severity::Error,
                        ));
                        self.emit(PaymentEvent::Expired);
                    }
                    return;
                }
                _ = ticker.tick() => {}
            }

            if !self.is_current() {
                return;
            }

            let observation = match self.check().await {
                Ok(observation) => observation,
                Err(err) => {
                    tracing::warn!(
                        reference = %self.reference,
                        error = %err,
                        "ledger check failed, retrying next tick"
                    );
                    continue;
                }
            };

            match observation {
                Observation::NoSignatures => {
                    tracing::debug!(
                        reference = %self.reference,
                        "no transaction yet"
                    );
                }
                Observation::Stale => return,
                Observation::Unresolved(signature) => {
                    tracing::debug!(
                        reference = %self.reference,
                        %signature,
                        "transaction not resolvable yet"
                    );
                    if last_seen.as_ref() != Some(&signature) {
                        self.emit(PaymentEvent::status(
                            format!("Transaction {signature} seen, waiting for confirmation"),
                            Severity::Info,
                        ));
                        last_seen = Some(signature);
                    }
                }
                Observation::Failed(signature) => {
                    tracing::warn!(
                        reference = %self.reference,
                        %signature,
                        "latest transaction failed during execution"
                    );
                    if last_seen.as_ref() != Some(&signature) {
                        self.emit(PaymentEvent::status(
                            format!("Transaction {signature} failed, still waiting"),
                            Severity::Warning,
                        ));
                        last_seen = Some(signature);
                    }
                }
                Observation::Succeeded(signature) => {
                    if self.settle(PollerState::Confirmed(signature.clone())) {
                        tracing::info!(reference = %self.reference, %signature, "payment confirmed");
                        self.emit(PaymentEvent::status("Payment confirmed!", Severity::Success));
                        self.emit(PaymentEvent::Confirmed { signature });
                    }
                    return;
                }
            }
        }
    }

    /// Inspects the newest signature referencing the token.
    ///
    /// A failed newest transaction is not final and older signatures are not searched.
    async fn check(&self) -> Result<Observation, LedgerError> {
        let history = self
            .ledger
            .signatures_for_address(&self.address, self.config.signature_limit)
            .await?;
        let Some(latest) = history.into_iter().next() else {
            return Ok(Observation::NoSignatures);
        };
        if !self.is_current() {
            return Ok(Observation::Stale);
        }

        let observation = match self
            .ledger
            .transaction(&latest.signature, self.config.commitment)
            .await?
        {
            Some(detail) if detail.succeeded => Observation::Succeeded(latest.signature),
            Some(_) => Observation::Failed(latest.signature),
            None => Observation::Unresolved(latest.signature),
        };
        Ok(observation)
    }
}

async fn expiry(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ledger::{SignatureInfo, TransactionDetail};
    use crate::domain::ports::LedgerClient;
    use crate::infrastructure::in_memory::InMemoryLedger;
    use async_trait::async_trait;
    use tokio::time::sleep;

    fn secs(n: u64) -> Duration {
        Duration::from_secs(n)
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<PaymentEvent>) -> Vec<PaymentEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    fn start(
        ledger: LedgerClientRef,
        config: PollerConfig,
    ) -> (VerificationPoller, Reference, mpsc::UnboundedReceiver<PaymentEvent>) {
        let mut poller = VerificationPoller::new(ledger, config);
        let reference = Reference::generate();
        let (tx, rx) = mpsc::unbounded_channel();
        assert!(poller.start(reference, tx));
        (poller, reference, rx)
    }

    async fn land(
        ledger: &InMemoryLedger,
        reference: &Reference,
        signature: &str,
        detail: TransactionDetail,
    ) {
        ledger
            .record_transaction(Signature::new(signature), detail)
            .await;
        ledger
            .record_signature(&reference.to_address(), SignatureInfo::new(signature, 1))
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_confirms_once_and_stops_calling_the_ledger() {
        let ledger = InMemoryLedger::new();
        let (poller, reference, mut rx) = start(Arc::new(ledger.clone()), PollerConfig::default());
        assert_eq!(poller.state(), PollerState::Polling);

        // Ticks at 5s and 10s find nothing.
        sleep(secs(12)).await;
        assert_eq!(ledger.calls(), 2);
        assert_eq!(poller.state(), PollerState::Polling);

        land(&ledger, &reference, "sig-ok", TransactionDetail::succeeded(9)).await;
        sleep(secs(5)).await;
        assert_eq!(
            poller.state(),
            PollerState::Confirmed(Signature::new("sig-ok"))
        );
        assert_eq!(ledger.calls(), 4);

        sleep(secs(30)).await;
        assert_eq!(ledger.calls(), 4);

        let events = drain(&mut rx);
        let confirmations: Vec<_> = events
            .iter()
            .filter(|e| matches!(e, PaymentEvent::Confirmed { .. }))
            .collect();
        assert_eq!(
            confirmations,
            vec![&PaymentEvent::Confirmed {
                signature: Signature::new("sig-ok")
            }]
        );
        assert!(events.contains(&PaymentEvent::Status {
            message: "Payment confirmed!".to_string(),
            severity: Severity::Success,
        }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_interval_is_raised_to_minimum() {
        let ledger = InMemoryLedger::new();
        let config = PollerConfig {
            interval: Duration::ZERO,
            ..PollerConfig::default()
        };
        let (poller, reference, mut rx) = start(Arc::new(ledger.clone()), config);
        assert_eq!(poller.config().interval, MIN_INTERVAL);

        sleep(Duration::from_millis(35)).await;
        assert_eq!(poller.state(), PollerState::Polling);
        assert_eq!(ledger.calls(), 3);

        land(&ledger, &reference, "sig-ok", TransactionDetail::succeeded(9)).await;
        sleep(secs(1)).await;
        assert_eq!(
            poller.state(),
            PollerState::Confirmed(Signature::new("sig-ok"))
        );
        assert!(
            drain(&mut rx)
                .iter()
                .any(|e| matches!(e, PaymentEvent::Confirmed { .. }))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_check_waits_one_interval() {
        let ledger = InMemoryLedger::new();
        let (_poller, _reference, _rx) = start(Arc::new(ledger.clone()), PollerConfig::default());

        sleep(Duration::from_millis(4_900)).await;
        assert_eq!(ledger.calls(), 0);
        sleep(Duration::from_millis(200)).await;
        assert_eq!(ledger.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_transaction_keeps_polling() {
        let ledger = InMemoryLedger::new();
        let (poller, reference, mut rx) = start(Arc::new(ledger.clone()), PollerConfig::default());
        land(&ledger, &reference, "sig-failed", TransactionDetail::failed(3)).await;

        sleep(secs(16)).await;
        assert_eq!(poller.state(), PollerState::Polling);
        // Three ticks, two calls each.
        assert_eq!(ledger.calls(), 6);

        let warnings = drain(&mut rx)
            .into_iter()
            .filter(|e| matches!(e, PaymentEvent::Status { severity: Severity::Warning, .. }))
            .count();
        assert_eq!(warnings, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_newer_success_after_failure_confirms() {
        let ledger = InMemoryLedger::new();
        let (poller, reference, _rx) = start(Arc::new(ledger.clone()), PollerConfig::default());
        land(&ledger, &reference, "sig-failed", TransactionDetail::failed(3)).await;

        sleep(secs(6)).await;
        assert_eq!(poller.state(), PollerState::Polling);

        land(&ledger, &reference, "sig-retry", TransactionDetail::succeeded(4)).await;
        sleep(secs(5)).await;
        assert_eq!(
            poller.state(),
            PollerState::Confirmed(Signature::new("sig-retry"))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_unresolved_signature_is_retried() {
        let ledger = InMemoryLedger::new();
        let (poller, reference, _rx) = start(Arc::new(ledger.clone()), PollerConfig::default());
        ledger
            .record_signature(&reference.to_address(), SignatureInfo::new("sig-late", 5))
            .await;

        sleep(secs(11)).await;
        assert_eq!(poller.state(), PollerState::Polling);

        ledger
            .record_transaction(Signature::new("sig-late"), TransactionDetail::succeeded(5))
            .await;
        sleep(secs(5)).await;
        assert_eq!(
            poller.state(),
            PollerState::Confirmed(Signature::new("sig-late"))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_errors_are_swallowed() {
        let ledger = InMemoryLedger::new();
        let (poller, reference, mut rx) = start(Arc::new(ledger.clone()), PollerConfig::default());
        land(&ledger, &reference, "sig-ok", TransactionDetail::succeeded(9)).await;
        ledger.fail_next(2).await;

        // Tick 1 fails on history, tick 2 fails on history, tick 3 confirms.
        sleep(secs(11)).await;
        assert_eq!(poller.state(), PollerState::Polling);
        assert_eq!(ledger.calls(), 2);

        sleep(secs(5)).await;
        assert_eq!(
            poller.state(),
            PollerState::Confirmed(Signature::new("sig-ok"))
        );
        assert!(
            drain(&mut rx)
                .iter()
                .all(|e| !matches!(e, PaymentEvent::Status { severity: Severity::Error, .. }))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_halts_ledger_calls() {
        let ledger = InMemoryLedger::new();
        let (mut poller, _reference, _rx) =
            start(Arc::new(ledger.clone()), PollerConfig::default());

        sleep(secs(6)).await;
        assert_eq!(ledger.calls(), 1);

        poller.stop();
        assert_eq!(poller.state(), PollerState::Cancelled);

        sleep(secs(15)).await;
        assert_eq!(ledger.calls(), 1);

        // Terminal: stopping again or restarting changes nothing.
        poller.stop();
        let (tx, _rx) = mpsc::unbounded_channel();
        assert!(!poller.start(Reference::generate(), tx));
        assert_eq!(poller.state(), PollerState::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_after_confirmation_is_noop() {
        let ledger = InMemoryLedger::new();
        let (mut poller, reference, _rx) =
            start(Arc::new(ledger.clone()), PollerConfig::default());
        land(&ledger, &reference, "sig-ok", TransactionDetail::succeeded(9)).await;

        sleep(secs(6)).await;
        poller.stop();
        assert_eq!(
            poller.state(),
            PollerState::Confirmed(Signature::new("sig-ok"))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_expires_session() {
        let ledger = InMemoryLedger::new();
        let config = PollerConfig {
            timeout: Some(secs(12)),
            ..PollerConfig::default()
        };
        let (poller, _reference, mut rx) = start(Arc::new(ledger.clone()), config);

        sleep(secs(13)).await;
        assert_eq!(poller.state(), PollerState::Expired);
        assert_eq!(ledger.calls(), 2);
        assert!(drain(&mut rx).contains(&PaymentEvent::Expired));

        sleep(secs(20)).await;
        assert_eq!(ledger.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_releases_the_task() {
        let ledger = InMemoryLedger::new();
        let (poller, _reference, _rx) = start(Arc::new(ledger.clone()), PollerConfig::default());
        drop(poller);

        sleep(secs(20)).await;
        assert_eq!(ledger.calls(), 0);
    }

    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<std::sync::Mutex<Vec<u8>>>);

    impl CapturedLogs {
        fn contents(&self) -> String {
            let buffer = self.0.lock().unwrap();
            String::from_utf8_lossy(&buffer).into_owned()
        }
    }

    impl std::io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for CapturedLogs {
        type Writer = CapturedLogs;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    #[tokio::test]
    async fn test_cancel_log_carries_reference() {
        let ledger = InMemoryLedger::new();
        let (mut poller, reference, _rx) = start(Arc::new(ledger), PollerConfig::default());

        let logs = CapturedLogs::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(logs.clone())
            .with_ansi(false)
            .finish();
        tracing::subscriber::with_default(subscriber, || poller.stop());

        let output = logs.contents();
        assert!(output.contains("payment verification cancelled"), "{output}");
        assert!(output.contains(&format!("reference={reference}")), "{output}");
    }

    /// Delays transaction lookups so a check is still in flight when the poller is stopped.
    struct SlowLedger {
        inner: InMemoryLedger,
        delay: Duration,
    }

    #[async_trait]
    impl LedgerClient for SlowLedger {
        async fn signatures_for_address(
            &self,
            address: &Address,
            limit: usize,
        ) -> Result<Vec<SignatureInfo>, LedgerError> {
            self.inner.signatures_for_address(address, limit).await
        }

        async fn transaction(
            &self,
            signature: &Signature,
            commitment: Commitment,
        ) -> Result<Option<TransactionDetail>, LedgerError> {
            sleep(self.delay).await;
            self.inner.transaction(signature, commitment).await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_in_flight_result_discarded_after_stop() {
        let ledger = InMemoryLedger::new();
        let slow = SlowLedger {
            inner: ledger.clone(),
            delay: secs(3),
        };
        let (mut poller, reference, mut rx) = start(Arc::new(slow), PollerConfig::default());
        land(&ledger, &reference, "sig-ok", TransactionDetail::succeeded(9)).await;

        // The first check starts at 5s and is waiting on the transaction lookup at 6s.
        sleep(secs(6)).await;
        assert_eq!(ledger.calls(), 1);
        poller.stop();

        sleep(secs(20)).await;
        assert_eq!(poller.state(), PollerState::Cancelled);
        assert!(
            drain(&mut rx)
                .iter()
                .all(|e| !matches!(e, PaymentEvent::Confirmed { .. }))
        );
    }
}
