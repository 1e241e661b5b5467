//! Diagnostics subscriber.
//!
//! The subscriber is built as a value: the binary installs it once as the
//! global default, tests install it scoped with
//! [`tracing::subscriber::with_default`].

use tracing::Subscriber;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::EnvFilter;

/// Filter used with `-v`: debug for this program, info for its dependencies.
const VERBOSE_FILTER: &str = "info,bq2csv=debug,bq2csv_bigquery=debug,bq2csv_core=debug";

/// Build the subscriber writing to `writer`.
///
/// `-v` forces debug output for this program. Otherwise `RUST_LOG` applies
/// when set, falling back to `info`.
pub fn subscriber<W>(
    verbose: bool,
    ansi: bool,
    writer: W,
) -> impl Subscriber + Send + Sync + 'static
where
    W: for<'a> MakeWriter<'a> + Send + Sync + 'static,
{
    let filter = if verbose {
        EnvFilter::new(VERBOSE_FILTER)
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(ansi)
        .with_target(false)
        .finish()
}
