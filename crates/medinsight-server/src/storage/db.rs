//! `SQLite` database for the `MedInsight` server.

pub use medinsight_core::db::DatabaseError;

medinsight_core::define_database!(MedDatabase, "MedInsight database migrations complete");
