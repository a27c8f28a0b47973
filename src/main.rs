use covidloader::{config::Config, error::exit_code_of, pipeline};
use tokio::time::Instant;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() {
    // ─── 1) init logging ─────────────────────────────────────────────
    let env = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_from_env("LOG_LEVEL"))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder()
        .with_env_filter(env)
        .with_span_events(fmt::format::FmtSpan::CLOSE)
        .init();
    info!("startup");

    std::panic::set_hook(Box::new(|info| {
        eprintln!("panic: {:?}", info);
    }));

    // ─── 2) configure ────────────────────────────────────────────────
    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            let err = anyhow::Error::from(e);
            error!("{:#}", err);
            std::process::exit(exit_code_of(&err));
        }
    };
    info!(data_dir = %config.data_dir.display(), database = %config.database, "configured");

    // ─── 3) transform & publish ──────────────────────────────────────
    let start = Instant::now();
    match pipeline::run(&config).await {
        Ok(meta) => {
            info!(
                countries = meta.countries.len(),
                uids = meta.uids.len(),
                elapsed = ?start.elapsed(),
                "done"
            );
        }
        Err(err) => {
            error!("{:#}", err);
            std::process::exit(exit_code_of(&err));
        }
    }
}
