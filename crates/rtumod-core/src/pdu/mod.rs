pub mod exception;
pub mod function_code;
pub mod request;
pub mod response;

pub use exception::{ExceptionCode, ExceptionResponse, NO_REPLY};
pub use function_code::FunctionCode;
pub use request::*;
pub use response::*;
