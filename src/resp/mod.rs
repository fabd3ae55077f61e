pub mod reader;
pub mod types;
pub mod writer;

pub use reader::Reader;
pub use types::RespValue;
pub use writer::encode_command;
