use anyhow::{Context, bail};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mail_spool::config::SpoolConfig;
use mail_spool::spool::SpoolStore;

const USAGE: &str = "usage: mail-spool <status|recover>";

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mail_spool=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = SpoolConfig::from_env().context("reading MAIL_SPOOL_* configuration")?;
    let store = SpoolStore::new(&config.cache_root);

    match std::env::args().nth(1).as_deref() {
        Some("status") => {
            let pending = store.count_pending()?;
            let processing = store.count_processing()?;
            println!("spool:      {}", store.dir().display());
            println!("pending:    {pending}");
            println!("processing: {processing}");
        }
        Some("recover") => {
            let recovered = store
                .recover_stale(config.recover_after)
                .with_context(|| format!("recovering claims in {}", store.dir().display()))?;
            info!(
                recovered,
                older_than_secs = config.recover_after.as_secs(),
                "returned abandoned claims to pending"
            );
        }
        _ => bail!(USAGE),
    }

    Ok(())
}
