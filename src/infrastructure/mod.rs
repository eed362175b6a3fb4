// Persistence adapters behind the domain repository ports:
// Postgres (sqlx) for the service, an in-memory store for tests and local runs

pub mod repositories;
