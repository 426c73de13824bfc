pub mod postgres;

pub use postgres::PostgresReadingSink;
