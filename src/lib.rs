// Blob storage primitives and backends
pub mod object_store;

// Installation and bot credential persistence
pub mod installation;

// Single-use OAuth state nonces
pub mod state_store;

// TOML configuration
pub mod config;
