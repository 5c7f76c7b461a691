pub mod classify;
pub mod facets;
pub mod orchestrator;
pub mod pool;
pub mod providers;
