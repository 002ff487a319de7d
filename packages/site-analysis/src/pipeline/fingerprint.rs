//! Fingerprint registry - decides whether a request needs new work.

use std::sync::Arc;
use tracing::debug;

use crate::error::Result;
use crate::traits::store::SubjectStore;
use crate::types::{
    fingerprint::Fingerprint,
    kind::WorkKind,
    subject::{SubjectId, TaskRefs},
};

/// Outcome of the dedup check.
#[derive(Debug, Clone, PartialEq)]
pub enum DedupDecision {
    /// Content is unchanged; hand back what is already attached.
    Skip {
        record_id: SubjectId,
        tasks: TaskRefs,
    },
    /// New work is needed.
    Proceed,
}

impl DedupDecision {
    pub fn is_skip(&self) -> bool {
        matches!(self, DedupDecision::Skip { .. })
    }
}

/// Compares fingerprints against the subject's last known one.
pub struct FingerprintRegistry<S: SubjectStore + ?Sized> {
    store: Arc<S>,
}

impl<S: SubjectStore + ?Sized> FingerprintRegistry<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Skip when the stored fingerprint equals `fingerprint`, else proceed.
    ///
    /// A subject with no record always proceeds.
    pub async fn should_dispatch(
        &self,
        subject_key: &str,
        fingerprint: &Fingerprint,
    ) -> Result<DedupDecision> {
        let Some(record) = self.store.get_subject(subject_key).await? else {
            return Ok(DedupDecision::Proceed);
        };

        if record.content_fingerprint.as_ref() == Some(fingerprint) {
            debug!(subject_key = %subject_key, fingerprint = %fingerprint, "Fingerprint unchanged");
            return Ok(DedupDecision::Skip {
                record_id: record.id,
                tasks: record.tasks,
            });
        }

        Ok(DedupDecision::Proceed)
    }

    /// Kind-aware gate used when handling a request.
    ///
    /// Content-keyed kinds skip only when the fingerprint matches and the
    /// requested kind already has a handle attached, so a subject first seen
    /// through another kind still gets this kind's work. URL-keyed kinds
    /// ignore fingerprints and skip only when `reuse` is set and a handle is
    /// attached.
    pub async fn should_dispatch_kind(
        &self,
        kind: WorkKind,
        subject_key: &str,
        fingerprint: Option<&Fingerprint>,
        reuse: bool,
    ) -> Result<DedupDecision> {
        if kind.is_content_keyed() {
            let Some(fingerprint) = fingerprint else {
                return Ok(DedupDecision::Proceed);
            };
            // Compare against the fingerprint this kind's own task was run on;
            // another kind may have moved the subject's last fingerprint since.
            return match self.store.get_subject(subject_key).await? {
                Some(record)
                    if record.kind_fingerprints.get(kind) == Some(fingerprint)
                        && record.tasks.get(kind).is_some() =>
                {
                    debug!(subject_key = %subject_key, kind = %kind, "Content unchanged for kind");
                    Ok(DedupDecision::Skip {
                        record_id: record.id,
                        tasks: record.tasks,
                    })
                }
                _ => Ok(DedupDecision::Proceed),
            };
        }

        if !reuse {
            return Ok(DedupDecision::Proceed);
        }

        match self.store.get_subject(subject_key).await? {
            Some(record) if record.tasks.get(kind).is_some() => {
                debug!(subject_key = %subject_key, kind = %kind, "Reusing attached task");
                Ok(DedupDecision::Skip {
                    record_id: record.id,
                    tasks: record.tasks,
                })
            }
            _ => Ok(DedupDecision::Proceed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stores::MemoryStore;
    use crate::types::{
        subject::{SubjectPatch, SubjectRecord},
        task::TaskId,
    };

    async fn seeded(patch: SubjectPatch) -> (FingerprintRegistry<MemoryStore>, SubjectRecord) {
        let store = Arc::new(MemoryStore::new());
        let record = SubjectRecord::new("http://test.com", &patch);
        store.insert_subject(&record).await.unwrap();
        (FingerprintRegistry::new(store), record)
    }

    #[tokio::test]
    async fn test_unknown_subject_proceeds() {
        let registry = FingerprintRegistry::new(Arc::new(MemoryStore::new()));
        let decision = registry
            .should_dispatch("http://test.com", &Fingerprint::of("<html></html>"))
            .await
            .unwrap();
        assert_eq!(decision, DedupDecision::Proceed);
    }

    #[tokio::test]
    async fn test_equal_fingerprint_skips_with_all_handles() {
        let social = TaskId::new();
        let location = TaskId::new();
        let fingerprint = Fingerprint::of("<html>same</html>");
        let (registry, record) = seeded(
            SubjectPatch::new()
                .with_fingerprint(fingerprint.clone())
                .with_task(WorkKind::Social, social)
                .with_task(WorkKind::Location, location),
        )
        .await;

        match registry.should_dispatch("http://test.com", &fingerprint).await.unwrap() {
            DedupDecision::Skip { record_id, tasks } => {
                assert_eq!(record_id, record.id);
                assert_eq!(tasks.social, Some(social));
                assert_eq!(tasks.location, Some(location));
            }
            other => panic!("expected skip, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_changed_fingerprint_proceeds() {
        let (registry, _) = seeded(
            SubjectPatch::new()
                .with_fingerprint(Fingerprint::of("<html>old</html>"))
                .with_task(WorkKind::Social, TaskId::new()),
        )
        .await;

        let decision = registry
            .should_dispatch("http://test.com", &Fingerprint::of("<html>new</html>"))
            .await
            .unwrap();
        assert_eq!(decision, DedupDecision::Proceed);
    }

    #[tokio::test]
    async fn test_content_kind_without_own_handle_proceeds() {
        let fingerprint = Fingerprint::of("<html>same</html>");
        let (registry, _) = seeded(
            SubjectPatch::new()
                .with_kind_fingerprint(WorkKind::Social, fingerprint.clone())
                .with_task(WorkKind::Social, TaskId::new()),
        )
        .await;

        let social = registry
            .should_dispatch_kind(WorkKind::Social, "http://test.com", Some(&fingerprint), false)
            .await
            .unwrap();
        let classification = registry
            .should_dispatch_kind(
                WorkKind::Classification,
                "http://test.com",
                Some(&fingerprint),
                false,
            )
            .await
            .unwrap();

        assert!(social.is_skip());
        assert_eq!(classification, DedupDecision::Proceed);
    }

    #[tokio::test]
    async fn test_kind_compares_against_its_own_fingerprint() {
        let old = Fingerprint::of("<html>a</html>");
        let new = Fingerprint::of("<html>b</html>");
        // Social ran on the old page, classification has since run on the new one
        let (registry, _) = seeded(
            SubjectPatch::new()
                .with_kind_fingerprint(WorkKind::Social, old.clone())
                .with_task(WorkKind::Social, TaskId::new())
                .with_kind_fingerprint(WorkKind::Classification, new.clone())
                .with_task(WorkKind::Classification, TaskId::new()),
        )
        .await;

        let social_on_new = registry
            .should_dispatch_kind(WorkKind::Social, "http://test.com", Some(&new), false)
            .await
            .unwrap();
        let social_on_old = registry
            .should_dispatch_kind(WorkKind::Social, "http://test.com", Some(&old), false)
            .await
            .unwrap();

        assert_eq!(social_on_new, DedupDecision::Proceed);
        assert!(social_on_old.is_skip());
    }

    #[tokio::test]
    async fn test_location_bypasses_fingerprint_unless_reuse() {
        let (registry, _) = seeded(SubjectPatch::new().with_task(WorkKind::Location, TaskId::new())).await;

        let fresh = registry
            .should_dispatch_kind(WorkKind::Location, "http://test.com", None, false)
            .await
            .unwrap();
        let reused = registry
            .should_dispatch_kind(WorkKind::Location, "http://test.com", None, true)
            .await
            .unwrap();

        assert_eq!(fresh, DedupDecision::Proceed);
        assert!(reused.is_skip());
    }
}
