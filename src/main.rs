use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use wayport::config::{Config, Settings};
use wayport::web::WebServer;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Config::parse_args();

    // Setup logging
    setup_logging(cli.debug);

    // Load settings: config file < PORT env < CLI flags
    let mut settings = Settings::load(cli.config.as_ref())?;
    settings.merge_env();
    settings.merge_cli(&cli);
    settings.validate()?;

    // Run the server
    WebServer::new(settings).run().await
}

fn setup_logging(debug: bool) {
    let filter = if debug {
        EnvFilter::new("wayport=debug")
    } else {
        EnvFilter::try_from_env("WAYPORT_LOG").unwrap_or_else(|_| EnvFilter::new("wayport=info"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();
}
