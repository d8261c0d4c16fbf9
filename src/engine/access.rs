//! Caller authorization shared by the ledger, executor, and router.

use crate::config::AccessConfig;
use crate::error::{RecoupError, Result};
use alloy::primitives::Address;
use std::collections::HashSet;
use tokio::sync::RwLock;
use tracing::info;

/// Authorized identities for the engine's surfaces.
///
/// Owner and pipeline are fixed at construction; the executor set is
/// owner-managed at runtime.
pub struct AccessRegistry {
    owner: Address,
    pipeline: Address,
    executors: RwLock<HashSet<Address>>,
}

impl AccessRegistry {
    pub fn new(owner: Address, pipeline: Address, executors: Vec<Address>) -> Self {
        Self {
            owner,
            pipeline,
            executors: RwLock::new(executors.into_iter().collect()),
        }
    }

    pub fn from_config(access: &AccessConfig) -> Result<Self> {
        Ok(Self::new(
            access.owner_address()?,
            access.pipeline_address()?,
            access.executor_addresses()?,
        ))
    }

    pub fn pipeline(&self) -> Address {
        self.pipeline
    }

    pub fn ensure_owner(&self, caller: Address) -> Result<()> {
        if caller == self.owner {
            Ok(())
        } else {
            Err(unauthorized(caller, "owner"))
        }
    }

    pub fn ensure_pipeline(&self, caller: Address) -> Result<()> {
        if caller == self.pipeline {
            Ok(())
        } else {
            Err(unauthorized(caller, "pipeline"))
        }
    }

    pub async fn ensure_executor(&self, caller: Address) -> Result<()> {
        if self.executors.read().await.contains(&caller) {
            Ok(())
        } else {
            Err(unauthorized(caller, "executor"))
        }
    }

    pub async fn add_executor(&self, caller: Address, executor: Address) -> Result<()> {
        self.ensure_owner(caller)?;
        if executor == Address::ZERO {
            return Err(RecoupError::Validation(
                "executor must not be the zero address".into(),
            ));
        }
        if self.executors.write().await.insert(executor) {
            info!(%executor, "executor authorized");
        }
        Ok(())
    }

    pub async fn remove_executor(&self, caller: Address, executor: Address) -> Result<()> {
        self.ensure_owner(caller)?;
        if self.executors.write().await.remove(&executor) {
            info!(%executor, "executor deauthorized");
        }
        Ok(())
    }

    pub async fn executors(&self) -> Vec<Address> {
        let mut list: Vec<Address> = self.executors.read().await.iter().copied().collect();
        list.sort();
        list
    }
}

fn unauthorized(caller: Address, role: &str) -> RecoupError {
    RecoupError::UnauthorizedCaller {
        caller: caller.to_string(),
        role: role.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::address;

    const OWNER: Address = address!("0000000000000000000000000000000000000001");
    const PIPELINE: Address = address!("0000000000000000000000000000000000000002");
    const EXECUTOR: Address = address!("0000000000000000000000000000000000000003");
    const STRANGER: Address = address!("00000000000000000000000000000000000000ff");

    fn test_registry() -> AccessRegistry {
        AccessRegistry::new(OWNER, PIPELINE, vec![EXECUTOR])
    }

    #[tokio::test]
    async fn test_role_checks() {
        let registry = test_registry();

        assert!(registry.ensure_owner(OWNER).is_ok());
        assert!(registry.ensure_owner(STRANGER).is_err());
        assert!(registry.ensure_pipeline(PIPELINE).is_ok());
        assert!(registry.ensure_pipeline(OWNER).is_err());
        assert!(registry.ensure_executor(EXECUTOR).await.is_ok());
        assert!(registry.ensure_executor(STRANGER).await.is_err());
    }

    #[tokio::test]
    async fn test_executor_set_is_owner_managed() {
        let registry = test_registry();

        assert!(registry.add_executor(STRANGER, STRANGER).await.is_err());
        registry.add_executor(OWNER, STRANGER).await.unwrap();
        assert!(registry.ensure_executor(STRANGER).await.is_ok());
        assert_eq!(registry.executors().await, vec![EXECUTOR, STRANGER]);

        registry.remove_executor(OWNER, STRANGER).await.unwrap();
        assert!(registry.ensure_executor(STRANGER).await.is_err());
        assert_eq!(registry.executors().await, vec![EXECUTOR]);

        assert!(registry
            .add_executor(OWNER, Address::ZERO)
            .await
            .is_err());
    }
}
