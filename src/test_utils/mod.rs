//! In-memory driver and helpers for exercising connections and pools without a server.

mod mock;
pub mod test_helpers;

pub use mock::{MockConnector, MockResponse, text_column};
pub use test_helpers::create_test_row;

/// Route `tracing` output through the test harness's captured stdout.
///
/// Safe to call from every test; only the first call installs the subscriber.
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}
