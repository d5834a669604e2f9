use clap::Parser;
use dedup_server::Config;
use dedup_server::app;
use dedup_server::telemetry;
use tower::BoxError;

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    let config = Config::parse();
    telemetry::init(config.log_format, &config.log_file)?;

    app::run(config)
        .await
        .inspect_err(|err| tracing::error!(%err, "server stopped with an error"))?;

    Ok(())
}
