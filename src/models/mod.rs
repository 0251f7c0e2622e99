pub mod message;
pub mod search;
pub mod ingest;
pub mod maintenance;
pub mod stats;
pub mod system;

pub use message::*;
pub use search::*;
pub use ingest::*;
pub use maintenance::*;
pub use stats::*;
pub use system::*;
