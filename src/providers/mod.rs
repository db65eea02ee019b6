//! Collaborator implementations.

pub mod memory;

pub use memory::{
    MemoryBlacklist, MemoryChatRelay, MemoryRaceStore, MemoryResults, MemoryServices, RelayCall,
    StaticDiscovery,
};
