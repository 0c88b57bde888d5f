//! CLI entry point - the composition root.
//!
//! Resolves settings, opens the audio devices, starts the transport and runs
//! one session on a single-threaded runtime until it completes, the
//! transport gives up, or the user presses Ctrl-C.

use anyhow::Context as _;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use parley_cli::{Cli, CliError, EventPrinter, open_classifier, open_devices, resolve_settings};
use parley_core::{Credential, SessionEndpoint};
use parley_voice::{ConversationSession, ReconnectPolicy, SessionOutcome, WsTransport};

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // Load environment variables before clap reads its env fallbacks
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(outcome) if outcome.is_complete() => Ok(()),
        Ok(outcome) => {
            let err = CliError::Session(format!("stopped while {}", outcome.status.label()));
            eprintln!("{err}");
            std::process::exit(err.exit_code());
        }
        Err(err) => {
            if let Some(cli_err) = err.downcast_ref::<CliError>() {
                eprintln!("Error: {err:#}");
                std::process::exit(cli_err.exit_code());
            }
            Err(err)
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose {
        "parley_cli=debug,parley_voice=debug,parley_core=debug"
    } else {
        "warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> anyhow::Result<SessionOutcome> {
    let settings = resolve_settings(&cli)?;
    let endpoint = SessionEndpoint::new(
        &settings.server_url,
        cli.session_id.clone(),
        Credential::new(cli.token.clone()),
    )
    .map_err(CliError::from)?;
    let (source, sink) = open_devices(&cli, &settings)?;
    let classifier = open_classifier(&cli, &settings)?;

    tracing::info!(
        url = %endpoint.redacted_url(),
        mode = ?settings.capture_mode,
        "Starting session"
    );

    let (transport, transport_events, transport_task) =
        WsTransport::spawn(&endpoint, ReconnectPolicy::from_settings(&settings));
    let (session, mut events) =
        ConversationSession::with_classifier(&settings, transport.clone(), source, sink, classifier);

    let printer = async move {
        let mut printer = EventPrinter::new(std::io::stdout());
        while let Some(event) = events.recv().await {
            if let Err(e) = printer.print(&event) {
                tracing::warn!(error = %e, "Failed to write to stdout");
            }
        }
    };

    let session_run = async { tokio::join!(session.run(transport_events), printer).0 };
    tokio::pin!(session_run);

    let outcome = tokio::select! {
        outcome = &mut session_run => outcome,
        signal = tokio::signal::ctrl_c() => {
            signal.context("failed to listen for Ctrl-C")?;
            tracing::info!("Interrupted, closing session");
            transport.shutdown();
            session_run.await
        }
    };

    transport_task
        .await
        .context("transport task panicked")?;

    if let Some(remaining) = outcome.remaining_seconds {
        tracing::info!(remaining, "Session time left at exit");
    }
    Ok(outcome)
}
