// Persistence: the SQLite home database and its record store.

pub mod home_db;
pub mod records;
