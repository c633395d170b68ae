use log::LevelFilter;

/// Sets the behavior of the logger, based on passed environment variables
/// such as `RUST_LOG`.
pub fn setup_logging(verbose: bool) {
    let mut builder = env_logger::Builder::default();
    builder.filter_level(if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    });

    if verbose {
        builder.format_timestamp_millis();
    } else {
        builder.format_timestamp_secs();
    }

    // Overwrite the defaults from env
    builder.parse_default_env();
    builder.init();
}
