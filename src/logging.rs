use tracing_subscriber::{EnvFilter, fmt};

/// Installs the stderr subscriber used by embedding binaries.
///
/// Verbose mode logs runner and plugin lifecycle at debug level; otherwise
/// `RUST_LOG` is honoured with a `warn` floor. Calling it twice is harmless.
pub fn init(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug").add_directive(directive("chromiumoxide=info"))
    } else {
        EnvFilter::from_default_env()
            .add_directive(directive("warn"))
            .add_directive(directive("chromiumoxide=off"))
    };

    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .try_init();
}

fn directive(value: &'static str) -> tracing_subscriber::filter::Directive {
    value
        .parse()
        .unwrap_or_else(|_| tracing_subscriber::filter::LevelFilter::WARN.into())
}
