use anyhow::Result;
use plugsite::{config::Config, server, warn::WARN_THREAD};

fn main() -> Result<()> {
    let config = Config::from_env()?;
    WARN_THREAD.store(config.is_dev, std::sync::atomic::Ordering::SeqCst);
    server::run(&config)
}
