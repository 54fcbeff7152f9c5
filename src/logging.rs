//! Tracing subscriber setup shared by every CLI subcommand.

use tracing_subscriber::EnvFilter;

/// Install the global `tracing` subscriber. `verbose` forces debug output
/// regardless of `RUST_LOG`; otherwise the default directive is `info` for
/// this crate's own spans, with `RUST_LOG` free to override everything
/// else.
pub fn init(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env()
            .add_directive("romulus=info".parse().expect("valid log directive"))
    };

    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}
