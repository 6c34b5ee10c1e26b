//! Runtime settings for `daisy-perms`.

use tracing_subscriber::EnvFilter;

/// Used when neither `--db` nor `DAISY_PERMS_DB` is given.
pub const DEFAULT_DB: &str = "./daisy_perms.redb";

/// Used when `RUST_LOG` is unset.
pub const DEFAULT_LOG_FILTER: &str = "daisy_store=info";

/// Log to stderr so command output on stdout stays machine-readable.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Parse a `name=value` entity link.
pub fn parse_link(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((name, value)) if !name.is_empty() => Ok((name.to_string(), value.to_string())),
        _ => Err(format!("expected NAME=VALUE, got '{}'", s)),
    }
}
