//! Services shared by the node process and the CLI

mod store;

pub use store::NodeStore;
