// Private module declaration
mod consumer;

// Re-export for public API
pub use consumer::run_consumer;
