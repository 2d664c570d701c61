use thiserror::Error;

use crate::{
    db_types::{InstanceRecord, InstanceSettings, NewInstance, WireAccount},
    traits::{is_soft_sqlx_error, is_unique_violation, RetryableError},
};

#[derive(Debug, Clone, Error)]
pub enum InstanceError {
    #[error("Transient database error: {0}")]
    SoftError(String),
    #[error("Internal database error: {0}")]
    DatabaseError(String),
    #[error("Could not complete the transaction after several attempts. Maybe try again?")]
    SerializationFailure,
    #[error("An instance with id '{0}' already exists with different settings")]
    InstanceConflict(String),
    #[error("Instance '{0}' does not exist")]
    InstanceNotFound(String),
    #[error("'{0}' is not a valid payto URI")]
    InvalidPaytoUri(String),
}

impl From<sqlx::Error> for InstanceError {
    fn from(e: sqlx::Error) -> Self {
        if is_soft_sqlx_error(&e) {
            Self::SoftError(e.to_string())
        } else if is_unique_violation(&e) {
            Self::InstanceConflict(e.to_string())
        } else {
            Self::DatabaseError(e.to_string())
        }
    }
}

impl RetryableError for InstanceError {
    fn is_soft(&self) -> bool {
        matches!(self, Self::SoftError(_))
    }

    fn serialization_failure() -> Self {
        Self::SerializationFailure
    }
}

/// Storage of merchant instances and their bank accounts.
#[allow(async_fn_in_trait)]
pub trait InstanceManagement {
    /// Stores a new instance and its accounts in one transaction.
    ///
    /// If a live instance with the same id exists, the call succeeds without changes when the settings and the set of
    /// payto URIs are identical, and fails with [`InstanceError::InstanceConflict`] otherwise. A soft-deleted id can
    /// not be reused.
    async fn insert_instance(&self, instance: NewInstance) -> Result<InstanceRecord, InstanceError>;

    /// Fetches an instance, including soft-deleted ones.
    async fn fetch_instance(&self, instance_id: &str) -> Result<Option<InstanceRecord>, InstanceError>;

    /// All instances that have not been deleted.
    async fn fetch_instances(&self) -> Result<Vec<InstanceRecord>, InstanceError>;

    async fn fetch_accounts(&self, instance_serial: i64, active_only: bool) -> Result<Vec<WireAccount>, InstanceError>;

    /// Replaces the settings of an instance and reconciles its accounts with `payto_uris` in one transaction.
    ///
    /// Active accounts whose URI is absent from the list are inactivated; URIs without an active account get a new
    /// account with a fresh salt. Returns the active accounts after the change.
    async fn update_instance(
        &self,
        settings: InstanceSettings,
        payto_uris: Vec<String>,
    ) -> Result<Vec<WireAccount>, InstanceError>;

    /// Marks an instance as deleted. Its settings and accounts remain for audit. Returns false if the instance did not
    /// exist or was already deleted.
    async fn delete_instance(&self, instance_id: &str) -> Result<bool, InstanceError>;
}
