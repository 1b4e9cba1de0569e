//! Repository Pattern Implementation
//!
//! Abstract interfaces for persisting client settings, allowing the
//! storage backend to be swapped (file system, database, cloud, etc.).
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │         Repository Traits               │
//! │  (Abstract interface for data access)   │
//! └──────────────┬──────────────────────────┘
//!                │
//!        ┌───────┴────────┐
//!        │                │
//! ┌──────▼──────────┐  ┌──▼────────────┐
//! │FileConfigRepo   │  │DatabaseRepo   │
//! │- JSON store     │  │(future)       │
//! └─────────────────┘  └───────────────┘
//! ```

pub mod file;
pub mod traits;

// Re-export main types
pub use file::FileConfigRepository;
pub use traits::ConfigRepository;
