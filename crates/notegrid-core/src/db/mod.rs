//! Local libSQL database used by the grid cache

mod connection;
mod migrations;

pub use connection::Database;
