use tracing_subscriber::{EnvFilter, fmt};

pub const LOG_JSON_ENV: &str = "KVX_LOG_JSON";

/// Installs the stderr subscriber. Filter comes from `RUST_LOG`, default `warn`.
pub fn init_logging() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let use_json = std::env::var(LOG_JSON_ENV)
        .map(|value| value == "1")
        .unwrap_or(false);

    if use_json {
        let _ = fmt::Subscriber::builder()
            .with_env_filter(env_filter)
            .json()
            .with_writer(std::io::stderr)
            .try_init();
    } else {
        let _ = fmt::Subscriber::builder()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .try_init();
    }
}
