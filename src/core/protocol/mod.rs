// src/core/protocol/mod.rs

pub mod body;
pub mod command_id;
pub mod frame;

pub use body::{BodyReader, BodyWriter, MAX_NAME_LEN};
pub use command_id::{CommandFlags, CommandId, ErrorTag, Status};
pub use frame::{Request, RequestCodec, Response, ResponseCodec};
