//! Durable local storage module
//!
//! The timer mirrors its fields into a string key-value store so a restarted
//! process can pick up where it left off. The store is a port: the
//! application state only sees [`KeyValueStore`].

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

/// Synchronous string key-value store with no cross-key atomicity
pub trait KeyValueStore: Send + Sync {
    /// Read a value, `None` when the key is absent
    fn get(&self, key: &str) -> Option<String>;

    /// Write a value, replacing any previous one
    fn set(&self, key: &str, value: &str) -> anyhow::Result<()>;

    /// Remove a key. Removing an absent key is not an error.
    fn remove(&self, key: &str) -> anyhow::Result<()>;

    /// Apply a batch of changes, `Some` writes and `None` removes
    ///
    /// Stores that persist on every mutation override this to write once.
    fn apply(&self, changes: &[(&str, Option<String>)]) -> anyhow::Result<()> {
        for (key, value) in changes {
            match value {
                Some(value) => self.set(key, value)?,
                None => self.remove(key)?,
            }
        }
        Ok(())
    }
}
