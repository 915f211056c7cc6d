use anyhow::Result;
use tracing::Level;
use tracing_subscriber::fmt;

/// Warnings (forced cuts, failed sub-panels) are always shown; `verbose`
/// adds the per-stage debug lines.
pub fn init(verbose: bool) -> Result<()> {
    let level = if verbose { Level::DEBUG } else { Level::WARN };
    let _ = fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_level(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .try_init();
    Ok(())
}
