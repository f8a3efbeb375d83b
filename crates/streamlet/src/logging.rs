//! Logging setup for the streamlet binary.

/// Initialize the global tracing subscriber from the integer `log_level`
/// setting. Interactive terminals get compact colored lines; everything
/// else gets JSON, so programmatic consumers keep structured fields.
/// Panics if called twice.
pub fn init(log_level: i64) {
    let filter = match log_level {
        0 => "off",
        1 => "error",
        2 => "warn",
        3 => "info",
        4 => "debug",
        _ => "trace",
    };

    let builder = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        // CLOSE span events log one line per completed span, carrying its
        // timing and recorded fields.
        .with_span_events(tracing_subscriber::fmt::format::FmtSpan::CLOSE)
        .with_target(false);

    if atty::is(atty::Stream::Stderr) {
        builder.compact().with_ansi(true).init();
    } else {
        builder
            .json()
            .flatten_event(true)
            .with_current_span(true)
            .with_span_list(false)
            .init();
    }
}
