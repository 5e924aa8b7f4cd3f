//! Declarative store upgrade manifest.
//!
//! Renames and deletions of substores are applied only while loading a
//! version; once loaded they are invisible to subsequent commits.

use serde::{Deserialize, Serialize};

/// A single substore rename.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreRename {
    /// The name the data was previously mounted under.
    pub old_name: String,
    /// The name the data moves to.
    pub new_name: String,
}

/// Upgrade manifest consulted at load time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreUpgrades {
    /// Substores whose contents move to a new name.
    pub renames: Vec<StoreRename>,
    /// Substores whose contents are removed (the mount itself stays).
    pub deletes: Vec<String>,
}

impl StoreUpgrades {
    /// Whether the named store's contents are to be deleted.
    pub fn is_deleted(&self, name: &str) -> bool {
        self.deletes.iter().any(|d| d == name)
    }

    /// The old name whose data moves to `new_name`, if any.
    pub fn renamed_from(&self, new_name: &str) -> Option<&str> {
        self.renames
            .iter()
            .find(|r| r.new_name == new_name)
            .map(|r| r.old_name.as_str())
    }
}
