#[tokio::main]
async fn main() {
    if let Err(e) = checkin_kiosk::run_with_config().await {
        tracing::error!(error = %e, "kiosk exited with error");
        std::process::exit(1);
    }
}
