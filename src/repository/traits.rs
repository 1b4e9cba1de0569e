//! Repository trait definitions
//!
//! These traits define the abstract interfaces for data access operations.
//! Different implementations can provide different storage backends.

use crate::error::AnchorResult;
use crate::ledger::LedgerConfig;

/// Repository for ledger configuration
///
/// Implementations can use different storage backends (file, database, cloud, etc.)
pub trait ConfigRepository: Send + Sync {
    /// Save ledger configuration
    fn save_config(&self, config: &LedgerConfig) -> AnchorResult<()>;

    /// Load ledger configuration
    fn load_config(&self) -> AnchorResult<Option<LedgerConfig>>;

    /// Delete ledger configuration
    fn delete_config(&self) -> AnchorResult<()>;

    /// Check if configuration exists
    fn has_config(&self) -> AnchorResult<bool> {
        Ok(self.load_config()?.is_some())
    }
}
