use indicatif::ProgressStyle;

/// Environment variable holding a log filter directive, e.g.
/// `TSUMIKI_LOG=tsumiki=debug`.
pub const LOG_ENV: &str = "TSUMIKI_LOG";

/// Installs the global subscriber: formatted events printed above the
/// progress bars of running tasks. The filter in [`LOG_ENV`] wins over
/// `default`.
#[cfg(feature = "logging")]
pub fn init_logging(default: tracing::level_filters::LevelFilter) -> anyhow::Result<()> {
    use tracing_indicatif::IndicatifLayer;
    use tracing_subscriber::EnvFilter;
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let filter = EnvFilter::builder()
        .with_default_directive(default.into())
        .with_env_var(LOG_ENV)
        .from_env_lossy();

    let indicatif = IndicatifLayer::new();

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(indicatif.get_stderr_writer()),
        )
        .with(indicatif)
        .try_init()?;

    Ok(())
}

/// Style of the bar tracking a whole run.
pub(crate) fn get_style_bar() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        .map(|style| style.progress_chars("=>-"))
        .unwrap_or_else(|_| ProgressStyle::default_bar())
}

/// Style of the spinner shown next to every running task.
pub(crate) fn get_style_task() -> ProgressStyle {
    ProgressStyle::default_spinner()
        .template("{spinner:.blue} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
}

