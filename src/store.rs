//! Patient store collaborator
//!
//! The store owns persistence and is the source of truth for identity
//! uniqueness: implementations must reject a `create` whose email already
//! exists, even when the caller checked beforehand.

use crate::error::StoreError;
use crate::patient::{InboundPatientRecord, Patient};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// External patient store
pub trait PatientStore: Send + Sync {
    /// Look up a patient by identity (email)
    fn find_by_identity(
        &self,
        identity: &str,
    ) -> impl Future<Output = Result<Option<Patient>, StoreError>> + Send;

    /// Create a patient from a normalized record
    ///
    /// Must fail with a [`StoreErrorKind::UniqueViolation`](crate::error::StoreErrorKind::UniqueViolation)
    /// error when the identity already exists.
    fn create(
        &self,
        record: InboundPatientRecord,
    ) -> impl Future<Output = Result<Patient, StoreError>> + Send;
}

impl<S: PatientStore> PatientStore for Arc<S> {
    fn find_by_identity(
        &self,
        identity: &str,
    ) -> impl Future<Output = Result<Option<Patient>, StoreError>> + Send {
        (**self).find_by_identity(identity)
    }

    fn create(
        &self,
        record: InboundPatientRecord,
    ) -> impl Future<Output = Result<Patient, StoreError>> + Send {
        (**self).create(record)
    }
}

/// In-process store keyed by email
///
/// Uniqueness is enforced under the write lock, so concurrent creates for the
/// same identity yield exactly one record.
#[derive(Debug, Default)]
pub struct InMemoryPatientStore {
    patients: RwLock<HashMap<String, Patient>>,
    next_id: AtomicU64,
}

impl InMemoryPatientStore {
    /// Empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an existing patient, replacing any with the same email
    pub async fn insert(&self, patient: Patient) {
        self.patients
            .write()
            .await
            .insert(patient.email.clone(), patient);
    }

    /// Number of stored patients
    pub async fn len(&self) -> usize {
        self.patients.read().await.len()
    }

    /// True when no patient is stored
    pub async fn is_empty(&self) -> bool {
        self.patients.read().await.is_empty()
    }

    /// All stored patients, in no particular order
    pub async fn list(&self) -> Vec<Patient> {
        self.patients.read().await.values().cloned().collect()
    }
}

impl PatientStore for InMemoryPatientStore {
    async fn find_by_identity(&self, identity: &str) -> Result<Option<Patient>, StoreError> {
        Ok(self.patients.read().await.get(identity).cloned())
    }

    async fn create(&self, record: InboundPatientRecord) -> Result<Patient, StoreError> {
        let mut patients = self.patients.write().await;
        if patients.contains_key(&record.email) {
            return Err(StoreError::unique_violation(&record.email));
        }

        let id = format!("P{:08}", self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        let patient = Patient::from_record(&id, record);
        patients.insert(patient.email.clone(), patient.clone());
        debug!(patient_id = %id, "Patient record created");
        Ok(patient)
    }
}
