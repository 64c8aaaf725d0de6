//! Local signature state for one document and its reconciliation with the store
//!
//! Gesture events are applied locally first. Commits carry the revision of
//! the local record they were built from; a completion that arrives after the
//! record moved on is ignored. Failures are repaired by refetching, never by
//! undoing deltas.

use std::sync::Arc;

use shared_types::{Coordinates, DocumentId, PositionUpdate, Signature, SignatureId};
use tracing::{debug, warn};

use crate::error::{DocsignError, Result};
use crate::gesture::GestureEvent;
use crate::store::SignatureStore;

#[derive(Debug, Clone, PartialEq)]
struct LocalRecord {
    signature: Signature,
    /// Bumped on every local placement change
    revision: u64,
    /// Revision of the newest commit not yet acknowledged
    in_flight: Option<u64>,
}

impl LocalRecord {
    fn new(signature: Signature) -> Self {
        Self {
            signature,
            revision: 0,
            in_flight: None,
        }
    }

    fn place(&mut self, page_number: u32, coordinates: Coordinates) {
        self.signature.page_number = page_number;
        self.signature.coordinates = coordinates;
        self.revision += 1;
    }
}

/// A position write waiting to be sent
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PendingCommit {
    pub signature_id: SignatureId,
    pub revision: u64,
    pub update: PositionUpdate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    /// The store accepted the latest local placement
    Confirmed,
    /// A newer local placement exists; the completion was ignored
    Superseded,
    /// The store reported a conflict and local state was refetched
    ConflictRecovered,
}

pub struct PlacementSync<S: SignatureStore + ?Sized> {
    store: Arc<S>,
    document_id: DocumentId,
    records: Vec<LocalRecord>,
    active: Option<SignatureId>,
}

impl<S: SignatureStore + ?Sized> PlacementSync<S> {
    pub async fn load(store: Arc<S>, document_id: DocumentId) -> Result<Self> {
        let signatures = store.fetch_signatures(document_id).await?;
        debug!(%document_id, count = signatures.len(), "loaded signatures");
        Ok(Self {
            store,
            document_id,
            records: signatures.into_iter().map(LocalRecord::new).collect(),
            active: None,
        })
    }

    pub fn document_id(&self) -> DocumentId {
        self.document_id
    }

    pub fn signatures(&self) -> Vec<&Signature> {
        self.records.iter().map(|r| &r.signature).collect()
    }

    pub fn signature(&self, id: SignatureId) -> Option<&Signature> {
        self.record(id).map(|r| &r.signature)
    }

    /// Signature under an active gesture, if any
    pub fn active(&self) -> Option<SignatureId> {
        self.active
    }

    /// Mark the signature a gesture just started on
    pub fn begin_gesture(&mut self, id: SignatureId) {
        self.active = Some(id);
    }

    fn record(&self, id: SignatureId) -> Option<&LocalRecord> {
        self.records.iter().find(|r| r.signature.id == id)
    }

    fn record_mut(&mut self, id: SignatureId) -> Option<&mut LocalRecord> {
        self.records.iter_mut().find(|r| r.signature.id == id)
    }

    /// Refetch every signature of the document from the store
    pub async fn refresh(&mut self) -> Result<()> {
        let fresh = self.store.fetch_signatures(self.document_id).await?;
        debug!(document_id = %self.document_id, count = fresh.len(), "refetched signatures");
        self.merge_authoritative(fresh);
        Ok(())
    }

    /// Replace local state with `fresh`, except for placements that are being
    /// dragged or have a commit in flight.
    pub fn merge_authoritative(&mut self, fresh: Vec<Signature>) {
        let mut previous = std::mem::take(&mut self.records);
        let mut merged = Vec::with_capacity(fresh.len());

        for signature in fresh {
            let local = previous
                .iter()
                .position(|r| r.signature.id == signature.id)
                .map(|i| previous.swap_remove(i));
            let record = match local {
                Some(mut local) => {
                    let held = self.active == Some(signature.id) || local.in_flight.is_some();
                    let (page_number, coordinates) = if held {
                        (local.signature.page_number, local.signature.coordinates)
                    } else {
                        (signature.page_number, signature.coordinates)
                    };
                    if !held
                        && (local.signature.coordinates != coordinates
                            || local.signature.page_number != page_number)
                    {
                        local.revision += 1;
                    }
                    local.signature = Signature {
                        page_number,
                        coordinates,
                        ..signature
                    };
                    local
                }
                None => LocalRecord::new(signature),
            };
            merged.push(record);
        }

        // A signature deleted elsewhere stays visible while it is being dragged
        if let Some(active) = self.active {
            merged.extend(previous.into_iter().filter(|r| r.signature.id == active));
        }
        self.records = merged;
    }

    /// Apply a gesture event to local state. Returns the write to send for a
    /// commit.
    pub fn apply(&mut self, event: &GestureEvent) -> Option<PendingCommit> {
        let id = event.signature_id();
        match *event {
            GestureEvent::Live { coordinates, .. } => {
                self.active = Some(id);
                let record = self.record_mut(id)?;
                let page_number = record.signature.page_number;
                record.place(page_number, coordinates);
                None
            }
            GestureEvent::Commit {
                page_number,
                coordinates,
                ..
            } => {
                self.active = None;
                self.record_mut(id)?.place(page_number, coordinates);
                self.prepare_commit(id)
            }
            GestureEvent::Revert { coordinates, .. } => {
                self.active = None;
                let record = self.record_mut(id)?;
                let page_number = record.signature.page_number;
                record.place(page_number, coordinates);
                None
            }
        }
    }

    /// Build a write from the most recent local placement of `id`
    pub fn prepare_commit(&mut self, id: SignatureId) -> Option<PendingCommit> {
        let record = self.record_mut(id)?;
        record.in_flight = Some(record.revision);
        Some(PendingCommit {
            signature_id: id,
            revision: record.revision,
            update: PositionUpdate {
                coordinates: record.signature.coordinates,
                page_number: record.signature.page_number,
            },
        })
    }

    /// Place `id` at `coordinates` locally and persist it
    pub async fn commit_position(
        &mut self,
        id: SignatureId,
        coordinates: Coordinates,
    ) -> Result<CommitOutcome> {
        let record = self
            .record_mut(id)
            .ok_or_else(|| DocsignError::not_found(format!("signature {}", id)))?;
        let page_number = record.signature.page_number;
        record.place(page_number, coordinates);

        let commit = self
            .prepare_commit(id)
            .ok_or_else(|| DocsignError::not_found(format!("signature {}", id)))?;
        self.send(commit).await
    }

    /// Send a prepared write and reconcile with its result
    pub async fn send(&mut self, commit: PendingCommit) -> Result<CommitOutcome> {
        let result = self
            .store
            .update_signature_position(commit.signature_id, commit.update)
            .await;
        self.complete_commit(&commit, result).await
    }

    /// Reconcile local state with the result of a write. A failure is repaired
    /// by refetching unless a newer commit for the same signature is pending.
    pub async fn complete_commit(
        &mut self,
        commit: &PendingCommit,
        result: Result<()>,
    ) -> Result<CommitOutcome> {
        // A completion is superseded once the record changed after the commit
        // was built. It still settles the record when no newer commit is
        // pending, so that a failure gets repaired.
        let (latest, settled) = match self.record_mut(commit.signature_id) {
            Some(record) => {
                let settled = record.in_flight == Some(commit.revision);
                if settled {
                    record.in_flight = None;
                }
                (record.revision == commit.revision, settled)
            }
            None => (true, true),
        };

        if !latest && (!settled || result.is_ok()) {
            debug!(
                signature_id = %commit.signature_id,
                revision = commit.revision,
                "ignoring completion of a superseded commit"
            );
            return Ok(CommitOutcome::Superseded);
        }

        match result {
            Ok(()) => {
                debug!(signature_id = %commit.signature_id, "position committed");
                Ok(CommitOutcome::Confirmed)
            }
            Err(DocsignError::Conflict(reason)) => {
                warn!(signature_id = %commit.signature_id, %reason, "position conflict; refetching");
                self.refresh().await?;
                Ok(CommitOutcome::ConflictRecovered)
            }
            Err(err) => {
                warn!(signature_id = %commit.signature_id, error = %err, "position commit failed; refetching");
                if let Err(refresh_err) = self.refresh().await {
                    warn!(error = %refresh_err, "refetch after failed commit also failed");
                }
                Err(err)
            }
        }
    }
}
