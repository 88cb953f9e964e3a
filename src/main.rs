use clap::{Args, Parser, Subcommand};
use miette::{IntoDiagnostic, Result, miette};
use solpay::application::poller::{PaymentEvent, PollerConfig};
use solpay::application::session::{PaymentSession, SessionStatus};
use solpay::domain::ledger::Commitment;
use solpay::domain::request::{PaymentRequest, RequestBuilder};
use solpay::infrastructure::rpc::{Cluster, RpcConfig, RpcLedgerClient};
use solpay::interfaces::console::ConsoleReporter;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print a payment descriptor and wait for the payment to land on-chain
    Request(RequestArgs),
    /// Decode a payment descriptor
    Parse {
        /// A `solana:` payment descriptor
        descriptor: String,
    },
}

#[derive(Args)]
struct RequestArgs {
    /// Recipient account (base58)
    recipient: String,

    /// Amount in SOL, e.g. 0.5
    amount: String,

    #[arg(long)]
    memo: Option<String>,

    #[arg(long, default_value = "Solana Pay")]
    label: String,

    /// Defaults to the memo, or to "Payment of <amount> SOL"
    #[arg(long)]
    message: Option<String>,

    #[arg(long, value_enum, default_value_t = Cluster::Devnet)]
    cluster: Cluster,

    /// JSON-RPC endpoint, overrides --cluster
    #[arg(long, env = "SOLANA_RPC_URL")]
    rpc_url: Option<String>,

    /// Seconds between two ledger checks
    #[arg(long, default_value_t = 5)]
    interval_secs: u64,

    /// Give up after this many seconds (polls forever when omitted)
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Only print the descriptor
    #[arg(long)]
    no_wait: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(io::stderr)
        .init();

    match Cli::parse().command {
        Command::Request(args) => request(args).await,
        Command::Parse { descriptor } => {
            let request: PaymentRequest = descriptor.parse().into_diagnostic()?;
            ConsoleReporter::new(io::stdout().lock())
                .describe(&request)
                .into_diagnostic()
        }
    }
}

async fn request(args: RequestArgs) -> Result<()> {
    let builder = RequestBuilder::new()
        .with_default_label(args.label)
        .describe_amount(true);

    if args.no_wait {
        let request = builder
            .build(
                &args.recipient,
                &args.amount,
                args.memo.as_deref(),
                None,
                args.message.as_deref(),
            )
            .into_diagnostic()?;
        println!("{request}");
        return Ok(());
    }

    let rpc = match args.rpc_url {
        Some(url) => RpcConfig::new(url),
        None => RpcConfig::from(args.cluster),
    };
    let ledger = RpcLedgerClient::new(rpc).into_diagnostic()?;
    let config = PollerConfig {
        interval: Duration::from_secs(args.interval_secs.max(1)),
        commitment: Commitment::Confirmed,
        timeout: args.timeout_secs.map(Duration::from_secs),
        ..PollerConfig::default()
    };

    let mut session = PaymentSession::new(Arc::new(ledger), builder, config);
    let mut events = session
        .take_events()
        .ok_or_else(|| miette!("event stream unavailable"))?;
    let descriptor = session
        .submit(
            &args.recipient,
            &args.amount,
            args.memo.as_deref(),
            None,
            args.message.as_deref(),
        )
        .into_diagnostic()?;
    println!("{descriptor}");

    let mut reporter = ConsoleReporter::new(io::stderr());
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            Some(event) = events.recv() => {
                reporter.report(&event).into_diagnostic()?;
                if matches!(event, PaymentEvent::Confirmed { .. } | PaymentEvent::Expired) {
                    break;
                }
            }
            _ = &mut ctrl_c => {
                session.cancel();
                break;
            }
        }
    }

    match session.status() {
        SessionStatus::Confirmed => {
            if let Some(signature) = session.transaction_signature() {
                println!("{signature}");
            }
            Ok(())
        }
        SessionStatus::Expired => Err(miette!("payment was not received before the timeout")),
        status => Err(miette!("payment request ended without confirmation ({status:?})")),
    }
}
