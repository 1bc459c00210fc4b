pub mod config;
pub mod domain {
    pub mod parse;
    pub mod transaction;
}
pub mod error;
pub mod model {
    pub mod artifacts;
    pub mod predictor;
}
pub mod repo {
    pub mod memory_store;
    pub mod scored_transactions_repo;
    pub mod store;
}
pub mod scoring {
    pub mod engine;
    pub mod types;
    pub mod velocity;
}
pub mod service {
    pub mod consumer_loop;
    pub mod retry;
    pub mod scoring_service;
    pub mod write_buffer;
}
pub mod stream;
