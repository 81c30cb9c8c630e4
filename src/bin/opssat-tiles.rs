//! OPS-SAT dataset preparation CLI
//!
//! Fetches the dataset archive, tiles source images, augments labeled tiles and
//! runs the interactive tile sorter.

#[cfg(feature = "cli")]
use opssat_tiles::cli;

#[cfg(feature = "cli")]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    cli::main().await
}

#[cfg(not(feature = "cli"))]
fn main() {
    panic!("CLI feature not enabled. Please rebuild with --features cli");
}
