//! Logger setup

use std::io::Write;

use env_logger::{Builder, Env};

/// Initialize the logger.
///
/// Verbose mode shows polythene's progress and probe details, otherwise only
/// warnings get through. `RUST_LOG` overrides both.
pub fn init(verbose: bool) {
    let default_filter = if verbose { "polythene=debug" } else { "warn" };
    let env = Env::default().filter_or("RUST_LOG", default_filter);

    // A second init (tests, embedding callers) keeps the first logger.
    let _ = Builder::from_env(env)
        .format(|buf, record| {
            writeln!(
                buf,
                "[{}] {}",
                chrono::Local::now().format("%H:%M:%S"),
                record.args()
            )
        })
        .try_init();
}
