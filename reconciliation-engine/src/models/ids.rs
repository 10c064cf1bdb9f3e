use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Backend record identifier.
pub type RecordId = i64;

/// A `(id, display_name)` pair as returned by the backend for relational fields.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NameGet {
    pub id: RecordId,
    #[serde(default)]
    pub display_name: String,
}

impl NameGet {
    pub fn new(id: RecordId, display_name: impl Into<String>) -> Self {
        Self {
            id,
            display_name: display_name.into(),
        }
    }
}

/// Process-local handle of a reconciliation line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LineHandle(pub u64);

impl std::fmt::Display for LineHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "rline{}", self.0)
    }
}

/// Identity of a proposition: an existing backend journal item, or a draft
/// that will be created when the line is validated.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum PropositionRef {
    Existing(RecordId),
    Draft(Uuid),
}

impl PropositionRef {
    pub fn new_draft() -> Self {
        PropositionRef::Draft(Uuid::new_v4())
    }

    pub fn is_existing(&self) -> bool {
        matches!(self, PropositionRef::Existing(_))
    }

    pub fn is_draft(&self) -> bool {
        matches!(self, PropositionRef::Draft(_))
    }

    /// Backend id, if this proposition points at an existing record.
    pub fn record_id(&self) -> Option<RecordId> {
        match self {
            PropositionRef::Existing(id) => Some(*id),
            PropositionRef::Draft(_) => None,
        }
    }
}

impl std::fmt::Display for PropositionRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PropositionRef::Existing(id) => write!(f, "{}", id),
            PropositionRef::Draft(uuid) => write!(f, "draft-{}", uuid),
        }
    }
}
