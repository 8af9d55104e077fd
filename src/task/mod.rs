pub mod model;
pub mod repository;

pub use model::{ExecutionStatus, Task, TaskExecution};
pub use repository::TaskRepository;
