pub mod common;
pub mod node;
pub mod record;
pub mod sync;
