pub mod store;
#[cfg(test)]
mod tests;

pub use store::{BrainStore, StoreConfig};
