mod database;
mod file;

pub use database::RecordDatabaseStorage;
pub use file::LocalFileStorage;
