//! Bookkeeping for the blobs an event references.
//!
//! Blob storage and the relational store share no transaction, so every
//! write computes which URLs it orphans and which it introduces, and the
//! caller deletes one side or the other depending on whether the
//! transaction committed.

use std::collections::BTreeSet;

use futures::future::join_all;

use crate::db::{AggregateLayout, EventFields};
use crate::models::{Event, Ticket};
use crate::storage::{key_from_url, ObjectStorage};

pub type BlobRefs = BTreeSet<String>;

/// Image, map and every ticket file of a write input.
pub fn refs_of_input(fields: &EventFields, layout: &AggregateLayout) -> BlobRefs {
    let mut refs = BlobRefs::new();
    refs.insert(fields.image.clone());
    refs.extend(fields.map.clone());
    refs.extend(layout.tickets().into_iter().map(|t| t.fields.file.clone()));
    refs
}

/// Image, map and every ticket file of a stored event.
pub fn refs_of_stored(event: &Event, tickets: &[Ticket]) -> BlobRefs {
    let mut refs = BlobRefs::new();
    refs.insert(event.image.clone());
    refs.extend(event.map.clone());
    refs.extend(tickets.iter().map(|t| t.file.clone()));
    refs
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct BlobChanges {
    /// Referenced before the write and not after it.
    pub orphaned: Vec<String>,
    /// Referenced after the write and not before it.
    pub fresh: Vec<String>,
}

impl BlobChanges {
    pub fn between(before: &BlobRefs, after: &BlobRefs) -> Self {
        Self {
            orphaned: before.difference(after).cloned().collect(),
            fresh: after.difference(before).cloned().collect(),
        }
    }
}

/// Deletes the blobs behind `urls` concurrently. Failures are logged and
/// swallowed; returns how many deletes succeeded.
pub async fn discard_blobs(storage: &dyn ObjectStorage, urls: &[String], reason: &str) -> usize {
    if urls.is_empty() {
        return 0;
    }

    let deletes = urls.iter().map(|url| async move {
        let Some(key) = key_from_url(url) else {
            tracing::warn!(url = %url, reason, "cannot derive blob key from url");
            return false;
        };
        match storage.delete(key).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(key = %key, reason, error = %e, "failed to delete blob");
                false
            }
        }
    });

    let deleted = join_all(deletes).await.into_iter().filter(|ok| *ok).count();
    tracing::debug!(reason, requested = urls.len(), deleted, "discarded blobs");
    deleted
}
