mod error;
pub use error::AppError;

mod deadline;
pub use deadline::Deadline;

mod config;
pub use config::{APP_CONFIG, AppConfig};

mod message;
pub use message::{Message, MessageRole, Turn};

mod similarity;
pub use similarity::cosine_similarity;

pub mod ids;
