pub mod db;
pub mod models;
mod objects;
mod tables;

pub use db::{Database, DatabaseError};
pub use models::{NewObject, ObjectRecord, ObjectStatus};
pub use tables::*;
