//! Subject records - one per analysed URL.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::{
    fingerprint::Fingerprint,
    kind::WorkKind,
    task::{TaskId, TaskRecord},
    timestamps::Timestamps,
};

/// Stable identity of a subject record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubjectId(pub Uuid);

impl SubjectId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SubjectId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// One optional slot per work kind.
///
/// `TaskSlots<TaskId>` is what a subject stores; `TaskSlots<TaskRecord>` is
/// the same shape with every reference resolved through the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSlots<T> {
    pub social: Option<T>,
    pub classification: Option<T>,
    pub location: Option<T>,
}

impl<T> Default for TaskSlots<T> {
    fn default() -> Self {
        Self {
            social: None,
            classification: None,
            location: None,
        }
    }
}

impl<T> TaskSlots<T> {
    pub fn get(&self, kind: WorkKind) -> Option<&T> {
        match kind {
            WorkKind::Social => self.social.as_ref(),
            WorkKind::Classification => self.classification.as_ref(),
            WorkKind::Location => self.location.as_ref(),
        }
    }

    pub fn set(&mut self, kind: WorkKind, value: T) {
        *self.slot_mut(kind) = Some(value);
    }

    pub fn with(mut self, kind: WorkKind, value: T) -> Self {
        self.set(kind, value);
        self
    }

    /// Occupied slots, in `WorkKind::ALL` order.
    pub fn iter(&self) -> impl Iterator<Item = (WorkKind, &T)> + '_ {
        WorkKind::ALL
            .into_iter()
            .filter_map(move |kind| self.get(kind).map(|value| (kind, value)))
    }

    fn slot_mut(&mut self, kind: WorkKind) -> &mut Option<T> {
        match kind {
            WorkKind::Social => &mut self.social,
            WorkKind::Classification => &mut self.classification,
            WorkKind::Location => &mut self.location,
        }
    }
}

impl<T: Clone> TaskSlots<T> {
    /// Overlay the occupied slots of `patch`; empty slots leave ours untouched.
    pub fn merge(&mut self, patch: &TaskSlots<T>) {
        for (kind, value) in patch.iter() {
            self.set(kind, value.clone());
        }
    }
}

/// Task references attached to a subject.
pub type TaskRefs = TaskSlots<TaskId>;

/// The fingerprint each kind's attached task was computed from.
pub type FingerprintSlots = TaskSlots<Fingerprint>;

/// Persisted record for a subject key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubjectRecord {
    pub id: SubjectId,
    /// Unique across all records
    pub subject_key: String,
    /// Last fingerprint written by any content-keyed kind
    pub content_fingerprint: Option<Fingerprint>,
    pub kind_fingerprints: FingerprintSlots,
    pub flagged: bool,
    pub saved: bool,
    pub tasks: TaskRefs,
    #[serde(flatten)]
    pub timestamps: Timestamps,
}

impl SubjectRecord {
    /// A new record with defaults everywhere except the supplied patch.
    pub fn new(subject_key: impl Into<String>, patch: &SubjectPatch) -> Self {
        let mut record = Self {
            id: SubjectId::new(),
            subject_key: subject_key.into(),
            content_fingerprint: None,
            kind_fingerprints: FingerprintSlots::default(),
            flagged: false,
            saved: false,
            tasks: TaskRefs::default(),
            timestamps: Timestamps::now(),
        };
        record.apply(patch);
        record
    }

    /// Apply a partial update in place. Omitted fields are untouched.
    pub fn apply(&mut self, patch: &SubjectPatch) {
        if let Some(fingerprint) = &patch.fingerprint {
            self.content_fingerprint = Some(fingerprint.clone());
        }
        self.kind_fingerprints.merge(&patch.kind_fingerprints);
        self.tasks.merge(&patch.tasks);
        self.timestamps.touch();
    }

    /// Apply a monotonic annotation. Returns false when it was already set.
    pub fn annotate(&mut self, annotation: Annotation) -> bool {
        let field = match annotation {
            Annotation::Flagged => &mut self.flagged,
            Annotation::Saved => &mut self.saved,
        };
        if *field {
            return false;
        }
        *field = true;
        self.timestamps.touch();
        true
    }
}

/// Partial update applied by the reconciler.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubjectPatch {
    pub fingerprint: Option<Fingerprint>,
    pub kind_fingerprints: FingerprintSlots,
    pub tasks: TaskRefs,
}

impl SubjectPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_fingerprint(mut self, fingerprint: Fingerprint) -> Self {
        self.fingerprint = Some(fingerprint);
        self
    }

    /// Record that `kind`'s task was computed from `fingerprint`.
    ///
    /// Also becomes the subject's last-written fingerprint.
    pub fn with_kind_fingerprint(mut self, kind: WorkKind, fingerprint: Fingerprint) -> Self {
        self.kind_fingerprints.set(kind, fingerprint.clone());
        self.fingerprint = Some(fingerprint);
        self
    }

    pub fn with_task(mut self, kind: WorkKind, task_id: TaskId) -> Self {
        self.tasks.set(kind, task_id);
        self
    }
}

/// User annotations; once set they stay set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Annotation {
    Flagged,
    Saved,
}

/// A subject with its task references resolved to full task records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubjectView {
    pub id: SubjectId,
    pub subject_key: String,
    pub content_fingerprint: Option<Fingerprint>,
    pub kind_fingerprints: FingerprintSlots,
    pub flagged: bool,
    pub saved: bool,
    pub tasks: TaskSlots<TaskRecord>,
    #[serde(flatten)]
    pub timestamps: Timestamps,
}

impl SubjectView {
    pub fn new(record: SubjectRecord, tasks: TaskSlots<TaskRecord>) -> Self {
        Self {
            id: record.id,
            subject_key: record.subject_key,
            content_fingerprint: record.content_fingerprint,
            kind_fingerprints: record.kind_fingerprints,
            flagged: record.flagged,
            saved: record.saved,
            tasks,
            timestamps: record.timestamps,
        }
    }
}
