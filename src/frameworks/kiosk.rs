// Framework bootstrap for the check-in kiosk runtime.

use crate::frameworks::config;
use crate::interface_adapters::clients::registration::RegistrationClient;
use crate::interface_adapters::console::Console;
use crate::interface_adapters::wedge::WedgeDecoder;
use crate::use_cases::{
    BadgeRenderer, CheckInCommitService, CheckInMachine, LookupService, Scanner,
};

use std::{io::Result, sync::Arc};
use tokio::io::BufReader;
use tokio::sync::mpsc;

fn init_runtime() {
    let _ = dotenvy::dotenv();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    // Logs go to stderr so they never interleave with console output on stdout.
    let json = matches!(std::env::var("LOG_FORMAT").as_deref(), Ok("json"));
    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .json()
            .with_current_span(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .compact()
            .init();
    }

    std::panic::set_hook(Box::new(|info| {
        let backtrace = std::backtrace::Backtrace::capture();
        tracing::error!(%info, ?backtrace, "panic");
    }));
}

pub async fn run_with_config() -> Result<()> {
    init_runtime();

    let event = config::event_info()
        .inspect_err(|e| tracing::error!(error = %e, "invalid event configuration"))
        .map_err(std::io::Error::other)?;
    let qr_service = config::qr_render_url()
        .inspect_err(|e| tracing::error!(error = %e, "invalid qr render url"))
        .map_err(std::io::Error::other)?;

    let api_url = config::registration_api_url();
    let http_timeout = config::http_timeout();
    let client = Arc::new(RegistrationClient::new(&api_url, http_timeout).map_err(|e| {
        std::io::Error::other(format!("failed to initialize registration client: {e}"))
    })?);
    tracing::debug!(
        api_url = %api_url,
        http_timeout_ms = http_timeout.as_millis(),
        "registration client configured"
    );

    let retry = config::retry_policy();
    let lookup = Arc::new(LookupService::new(client.clone(), retry));
    let commits = Arc::new(CheckInCommitService::new(client, retry));

    // The wedge reader stands in for the camera: the scanner opens and closes it per cycle.
    let wedge = Arc::new(WedgeDecoder::new());
    let scanner = Scanner::new(wedge.clone(), config::SCANNER_CONTAINER_ID);

    let machine = CheckInMachine::new(
        event.clone(),
        lookup,
        commits.clone(),
        BadgeRenderer::new(qr_service),
        scanner,
    )
    .with_facing(config::camera_facing());
    let snapshots = machine.subscribe();

    let (commands_tx, commands_rx) = mpsc::channel(config::COMMAND_CHANNEL_CAPACITY);
    let kiosk = tokio::spawn(machine.run(commands_rx));

    let console = Console::new(commands_tx, wedge, commits, event.id.clone(), config::badge_dir());
    tracing::info!(
        event_id = %event.id,
        event_name = %event.name,
        "kiosk console ready; type `help` for commands"
    );

    let result = console
        .run(
            BufReader::new(tokio::io::stdin()),
            tokio::io::stdout(),
            snapshots,
        )
        .await
        .inspect_err(|e| tracing::error!(error = %e, "console error"));

    // Dropping the console closes the command channel, which stops the kiosk loop.
    drop(console);
    if let Err(e) = kiosk.await {
        tracing::error!(error = %e, "kiosk task failed");
    }

    result
}
