//! Store-backed kanban core: projects own ordered columns, columns own
//! ordered tasks, and every column's task positions stay a dense 1..=count
//! sequence across create, move, and delete.

mod db;
mod digest;
mod error;
mod models;
mod position;

pub use db::Db;
pub use digest::{ColumnDigest, ProjectDigest};
pub use error::{DbError, DbResult};
pub use models::{Column, Project, ProjectDetail, Task, TaskPatch};
