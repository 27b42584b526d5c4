//! PostgreSQL outbox repository.

pub mod postgres;

pub use postgres::PostgresOutboxRepository;
