//! Dedicated Tokio runtime for PostgreSQL connections
//!
//! tokio-postgres needs a Tokio reactor for DNS resolution and networking.
//! Connection tasks always run here so a client keeps working no matter
//! which executor the caller polls it from; the blocking wrappers drive
//! their futures on it too.

use std::sync::OnceLock;
use tokio::runtime::Runtime;

static POSTGRES_RUNTIME: OnceLock<Runtime> = OnceLock::new();

/// Get or create the shared runtime.
///
/// # Panics
///
/// Panics if the runtime cannot be created.
pub fn postgres_runtime() -> &'static Runtime {
    POSTGRES_RUNTIME.get_or_init(|| {
        tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .thread_name("pgbulk-postgres-runtime")
            .build()
            .expect("Failed to create Tokio runtime for pgbulk")
    })
}

/// Run a future to completion on the shared runtime, blocking the current
/// thread.
///
/// Must not be called from inside an async context; use the async
/// operations there.
pub fn block_on<F, T>(future: F) -> T
where
    F: std::future::Future<Output = T>,
{
    postgres_runtime().block_on(future)
}
