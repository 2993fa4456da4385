//! libSQL database layer backing the durable local store

mod connection;
mod migrations;

pub use connection::Database;
