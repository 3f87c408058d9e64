pub mod common;
pub mod cursor;
pub mod sync;
