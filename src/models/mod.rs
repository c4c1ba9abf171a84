pub mod chat;
pub mod task;
pub mod user;

pub use chat::{ChatMessage, ChatRequest, ChatResponse, ChatRole};
pub use task::{Priority, StatusFilter, Task, TaskDraft, TaskId, TaskPatch};
pub use user::{AuthResponse, CurrentUser, Credentials};
