use anyhow::Context;
use mail_relay::config::RelayConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    let (writer, _guard) = tracing_appender::non_blocking(std::io::stderr());
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(writer)
        .with_target(false)
        .init();

    let config = RelayConfig::from_env().unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        eprintln!("  export MAIL_RELAY_STORAGE_URL_PREFIX=https://files.example.com");
        std::process::exit(1);
    });

    eprintln!("📮 Mail Relay v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Listening: http://{}", config.bind);
    eprintln!("   Inbound: POST http://{}/inbound?to=..&from=..", config.bind);
    eprintln!("   Files: {}/{{id}}", config.storage_url_prefix);
    eprintln!("   Database: {}", config.db_path.display());

    mail_relay::server::serve(&config)
        .await
        .context("Mail relay stopped with an error")?;

    Ok(())
}
