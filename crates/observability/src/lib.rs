use tracing_subscriber::{fmt, EnvFilter};

pub fn init_tracing(service_name: &str) {
    init_tracing_with_filter(service_name, "info");
}

pub fn init_tracing_with_filter(service_name: &str, default_filter: &str) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let _ = fmt()
        .with_target(false)
        .with_env_filter(env_filter)
        .compact()
        .try_init();

    // Multiple worker processes share one log stream in deployment; the
    // pid is the line that tells them apart.
    tracing::info!(
        service = service_name,
        pid = std::process::id(),
        "tracing initialized"
    );
}
