use super::poller::{PaymentEvent, PollerConfig, PollerState, VerificationPoller};
use crate::domain::ledger::Signature;
use crate::domain::ports::LedgerClientRef;
use crate::domain::request::{PaymentRequest, RequestBuilder};
use crate::error::SessionError;
use tokio::sync::{mpsc, watch};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Created,
    Polling,
    Confirmed,
    Cancelled,
    Expired,
}

impl SessionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionStatus::Confirmed | SessionStatus::Cancelled | SessionStatus::Expired
        )
    }
}

impl From<&PollerState> for SessionStatus {
    fn from(state: &PollerState) -> Self {
        match state {
            PollerState::Idle => SessionStatus::Created,
            PollerState::Polling => SessionStatus::Polling,
            PollerState::Confirmed(_) => SessionStatus::Confirmed,
            PollerState::Cancelled => SessionStatus::Cancelled,
            PollerState::Expired => SessionStatus::Expired,
        }
    }
}

/// One payment request and the poller verifying it, end to end.
///
/// The ledger client is injected, so sessions share no global state. Dropping a session
/// stops its poller.
pub struct PaymentSession {
    builder: RequestBuilder,
    poller: VerificationPoller,
    request: Option<PaymentRequest>,
    events_tx: mpsc::UnboundedSender<PaymentEvent>,
    events_rx: Option<mpsc::UnboundedReceiver<PaymentEvent>>,
}

impl PaymentSession {
    pub fn new(ledger: LedgerClientRef, builder: RequestBuilder, config: PollerConfig) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            builder,
            poller: VerificationPoller::new(ledger, config),
            request: None,
            events_tx,
            events_rx: Some(events_rx),
        }
    }

    /// Builds the payment request, starts verifying it and returns its descriptor.
    ///
    /// Must be called from within a tokio runtime. A session accepts a single submission.
    pub fn submit(
        &mut self,
        recipient: &str,
        amount: &str,
        memo: Option<&str>,
        label: Option<&str>,
        message: Option<&str>,
    ) -> Result<String, SessionError> {
        if self.request.is_some() {
            return Err(SessionError::AlreadySubmitted);
        }
        if self.status().is_terminal() {
            return Err(SessionError::Closed);
        }

        let request = self.builder.build(recipient, amount, memo, label, message)?;
        let descriptor = request.descriptor();
        tracing::info!(
            recipient = %request.recipient,
            amount = %request.amount,
            reference = %request.reference,
            "payment request created"
        );

        let reference = request.reference;
        self.request = Some(request);
        self.poller.start(reference, self.events_tx.clone());
        Ok(descriptor)
    }

    pub fn cancel(&mut self) {
        self.poller.stop();
    }

    pub fn status(&self) -> SessionStatus {
        SessionStatus::from(&self.poller.state())
    }

    pub fn transaction_signature(&self) -> Option<Signature> {
        match self.poller.state() {
            PollerState::Confirmed(signature) => Some(signature),
            _ => None,
        }
    }

    pub fn request(&self) -> Option<&PaymentRequest> {
        self.request.as_ref()
    }

    /// Hands out the event stream. Only the first call returns it.
    pub fn take_events(&mut self) -> Option<mpsc::UnboundedReceiver<PaymentEvent>> {
        self.events_rx.take()
    }

    pub fn watch(&self) -> watch::Receiver<PollerState> {
        self.poller.subscribe()
    }

    /// Resolves once the session reaches a terminal status.
    pub async fn wait(&self) -> SessionStatus {
        let mut state = self.poller.subscribe();
        match state.wait_for(PollerState::is_terminal).await {
            Ok(state) => SessionStatus::from(&*state),
            Err(_) => self.status(),
        }
    }
}
