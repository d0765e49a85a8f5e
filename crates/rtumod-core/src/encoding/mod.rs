pub mod reader;
pub mod writer;

pub use reader::{packed_bit, Reader};
pub use writer::Writer;
