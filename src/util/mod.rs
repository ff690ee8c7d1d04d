mod body;
mod file_bytes_stream;
mod file_response_builder;
mod requested_path;
mod transfer;

pub use self::body::*;
pub use self::file_bytes_stream::*;
pub use self::file_response_builder::*;
pub use self::transfer::*;

pub(crate) use self::requested_path::*;
