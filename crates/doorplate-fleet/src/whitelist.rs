//! # Whitelist Gate
//!
//! Only hardware identities an operator has cleared may ever receive an
//! activation code. Lookups are side-effect free.

use tracing::{debug, info};

use doorplate_core::validation::validate_hardware_id;
use doorplate_core::WhitelistEntry;
use doorplate_db::{Database, DbError};

use crate::error::{FleetError, FleetResult};

#[derive(Debug, Clone)]
pub struct WhitelistGate {
    db: Database,
}

impl WhitelistGate {
    pub fn new(db: Database) -> Self {
        WhitelistGate { db }
    }

    /// Returns true if `hardware_id` may activate.
    ///
    /// Malformed identities are simply not allowed.
    pub async fn is_allowed(&self, hardware_id: &str) -> FleetResult<bool> {
        let Ok(hardware_id) = validate_hardware_id(hardware_id) else {
            return Ok(false);
        };
        let allowed = self.db.whitelist().exists(&hardware_id).await?;
        debug!(hardware_id = %hardware_id, allowed, "Whitelist lookup");
        Ok(allowed)
    }

    /// Clears a hardware identity for activation.
    pub async fn add(&self, hardware_id: &str) -> FleetResult<WhitelistEntry> {
        let hardware_id = validate_hardware_id(hardware_id)?;
        let entry = self.db.whitelist().insert(&hardware_id).await.map_err(|e| match e {
            DbError::UniqueViolation { .. } => FleetError::AlreadyExists(hardware_id.clone()),
            other => other.into(),
        })?;

        info!(hardware_id = %hardware_id, "Hardware id whitelisted");
        Ok(entry)
    }

    /// Revokes a hardware identity. Devices already bound stay bound.
    pub async fn remove(&self, hardware_id: &str) -> FleetResult<()> {
        let hardware_id = validate_hardware_id(hardware_id)?;
        self.db.whitelist().delete(&hardware_id).await.map_err(|e| match e {
            DbError::NotFound { .. } => FleetError::NotFound(hardware_id.clone()),
            other => other.into(),
        })?;

        info!(hardware_id = %hardware_id, "Hardware id removed from whitelist");
        Ok(())
    }

    /// Like [`is_allowed`](Self::is_allowed) but rejects malformed input.
    pub async fn check(&self, hardware_id: &str) -> FleetResult<bool> {
        let hardware_id = validate_hardware_id(hardware_id)?;
        Ok(self.db.whitelist().exists(&hardware_id).await?)
    }

    pub async fn list(&self) -> FleetResult<Vec<WhitelistEntry>> {
        Ok(self.db.whitelist().list().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;

    #[tokio::test]
    async fn test_add_and_lookup() {
        let gate = WhitelistGate::new(testing::db().await);

        assert!(!gate.is_allowed("ABC123").await.unwrap());
        gate.add("  ABC123 ").await.unwrap();

        assert!(gate.is_allowed("ABC123").await.unwrap());
        assert!(gate.check(" ABC123").await.unwrap());
        assert_eq!(gate.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_misuse_errors() {
        let gate = WhitelistGate::new(testing::db().await);
        gate.add("ABC123").await.unwrap();

        assert!(matches!(gate.add("ABC123").await, Err(FleetError::AlreadyExists(_))));
        assert!(matches!(gate.remove("ZZZ").await, Err(FleetError::NotFound(_))));
        assert!(matches!(gate.add("   ").await, Err(FleetError::InvalidArgument(_))));
        assert!(matches!(gate.check("").await, Err(FleetError::InvalidArgument(_))));
        assert!(!gate.is_allowed("").await.unwrap());
    }

    #[tokio::test]
    async fn test_remove() {
        let gate = WhitelistGate::new(testing::db().await);
        gate.add("ABC123").await.unwrap();
        gate.remove("ABC123").await.unwrap();

        assert!(!gate.is_allowed("ABC123").await.unwrap());
    }
}
