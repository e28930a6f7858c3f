//! Binary entry point for the huddle presence server.
//!
//! All startup logic lives in the library crate so it can be exercised from
//! tests; this file only stands up the runtime and delegates.

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    lib_huddle::init().await
}
