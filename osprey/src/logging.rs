use tracing_subscriber::{fmt, layer::SubscriberExt};

/// Start logging to console and optionally to a file.
///
/// Filtering is controlled by `RUST_LOG`; without it, info level is used.
pub fn initiate_logging(
    path: Option<&std::path::Path>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync + 'static>> {
    let file_layer = if let Some(path) = path {
        let file = std::fs::File::create(path)?;
        let file_writer = std::sync::Mutex::new(file);
        Some(
            fmt::layer()
                .with_writer(file_writer)
                .with_ansi(false)
                .with_file(true)
                .with_line_number(true),
        )
    } else {
        None
    };

    // Console logging goes to stderr so the fatal-exit reason and the
    // encoder crash dump end up on the same stream.
    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_file(true)
        .with_line_number(true);

    let filter = tracing_subscriber::filter::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::filter::EnvFilter::new("info"));

    let collector = tracing_subscriber::registry()
        .with(file_layer)
        .with(console_layer)
        .with(filter);
    tracing::subscriber::set_global_default(collector)?;

    if let Some(path) = path {
        tracing::debug!("logging to file \"{}\"", path.display());
    }

    Ok(())
}
