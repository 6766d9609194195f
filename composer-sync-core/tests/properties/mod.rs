//! Property test modules

mod credentials_tests;
mod pagination_tests;
mod store_tests;

/// Single-threaded runtime for driving async code inside `proptest!`
pub fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}
