use crate::application::poller::{PaymentEvent, Severity};
use crate::domain::request::PaymentRequest;
use std::io::{self, Write};

/// Renders payment requests and session events as plain text.
///
/// The only place where verification progress turns into user-facing output.
pub struct ConsoleReporter<W: Write> {
    out: W,
}

impl<W: Write> ConsoleReporter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    /// Writes one line per event.
    pub fn report(&mut self, event: &PaymentEvent) -> io::Result<()> {
        match event {
            PaymentEvent::Status { message, severity } => {
                writeln!(self.out, "[{}] {}", severity_tag(*severity), message)?
            }
            PaymentEvent::Confirmed { signature } => {
                writeln!(self.out, "[success] transaction signature: {signature}")?
            }
            PaymentEvent::Expired => writeln!(self.out, "[error] payment request expired")?,
        }
        self.out.flush()
    }

    /// Writes the decoded fields of a payment request, one `key: value` per line.
    pub fn describe(&mut self, request: &PaymentRequest) -> io::Result<()> {
        writeln!(self.out, "recipient: {}", request.recipient)?;
        writeln!(self.out, "amount: {}", request.amount)?;
        for (key, value) in [
            ("memo", &request.memo),
            ("label", &request.label),
            ("message", &request.message),
        ] {
            if let Some(value) = value {
                writeln!(self.out, "{key}: {value}")?;
            }
        }
        writeln!(self.out, "reference: {}", request.reference)?;
        self.out.flush()
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

fn severity_tag(severity: Severity) -> &'static str {
    match severity {
        Severity::Info => "info",
        Severity::Success => "success",
        Severity::Warning => "warning",
        Severity::Error => "error",
    }
}
