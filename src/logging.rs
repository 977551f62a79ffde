/// Environment variable overriding the log filter
pub const LOG_ENV: &str = "OSK_TOOLS_LOG";

/// Initialize env_logger, `OSK_TOOLS_LOG` taking precedence over `verbose`
pub fn init(verbose: bool) {
    let log_level = if verbose { "debug" } else { "info" };
    env_logger::Builder::new()
        .parse_filters(&std::env::var(LOG_ENV).unwrap_or_else(|_| log_level.to_string()))
        .format_timestamp(None)
        .init();
}
