//! Generated artifacts and merging them into caller-owned collections.

use std::collections::HashSet;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::types::JobId;

/// Object keys that hold a list of outputs inside a `result` payload.
const LIST_KEYS: &[&str] = &["artifacts", "images", "videos", "outputs", "urls"];

/// Object keys that hold a single output location.
const URL_KEYS: &[&str] = &["url", "image_url", "imageUrl", "video_url", "videoUrl", "output"];

/// Opaque reference to a generated image or video.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Artifact {
    /// Identity used for de-duplication. Falls back to the URL.
    pub id: String,
    pub url: String,
}

impl Artifact {
    pub fn new(id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
        }
    }

    /// An artifact identified by its URL alone.
    pub fn from_url(url: impl Into<String>) -> Self {
        let url = url.into();
        Self {
            id: url.clone(),
            url,
        }
    }
}

/// Outcome of a finished job. Built once and never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobResult {
    pub job_id: JobId,
    pub artifacts: Option<Vec<Artifact>>,
    pub error: Option<String>,
}

impl JobResult {
    pub fn success(job_id: impl Into<JobId>, artifacts: Vec<Artifact>) -> Self {
        Self {
            job_id: job_id.into(),
            artifacts: Some(artifacts),
            error: None,
        }
    }

    pub fn failure(job_id: impl Into<JobId>, error: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            artifacts: None,
            error: Some(error.into()),
        }
    }

    /// Build a successful result from the raw `result` field of a status
    /// response.
    pub fn from_payload(job_id: impl Into<JobId>, payload: Option<&serde_json::Value>) -> Self {
        let artifacts = payload.map(artifacts_from_value).unwrap_or_default();
        Self::success(job_id, artifacts)
    }

    pub fn artifacts(&self) -> &[Artifact] {
        self.artifacts.as_deref().unwrap_or_default()
    }
}

/// Extract artifacts from a loosely shaped `result` payload.
///
/// Accepts a bare URL string, an object with `id`/`url`-like keys, an
/// object wrapping a list under one of [`LIST_KEYS`], or an array of any of
/// these. Anything else yields no artifacts.
pub fn artifacts_from_value(value: &serde_json::Value) -> Vec<Artifact> {
    let mut out = Vec::new();
    collect_artifacts(value, &mut out);
    out
}

fn collect_artifacts(value: &serde_json::Value, out: &mut Vec<Artifact>) {
    use serde_json::Value;

    match value {
        Value::String(s) if !s.trim().is_empty() => out.push(Artifact::from_url(s.trim())),
        Value::Array(items) => items.iter().for_each(|item| collect_artifacts(item, out)),
        Value::Object(map) => {
            if let Some(list) = LIST_KEYS.iter().find_map(|k| map.get(*k)) {
                collect_artifacts(list, out);
                return;
            }
            let url = URL_KEYS
                .iter()
                .find_map(|k| map.get(*k).and_then(Value::as_str))
                .map(str::to_string);
            let id = match map.get("id") {
                Some(Value::String(s)) => Some(s.clone()),
                Some(Value::Number(n)) => Some(n.to_string()),
                _ => None,
            };
            match (id, url) {
                (Some(id), Some(url)) => out.push(Artifact::new(id, url)),
                (None, Some(url)) => out.push(Artifact::from_url(url)),
                (Some(id), None) => out.push(Artifact::new(id.clone(), id)),
                (None, None) => {}
            }
        }
        _ => {}
    }
}

// ---------------------------------------------------------------------------
// Merging
// ---------------------------------------------------------------------------

/// Where new artifacts go in the target collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Placement {
    /// Newest first, as in a session results strip.
    #[default]
    Prepend,
    Append,
}

/// Merge `incoming` into `collection`, skipping any artifact whose id is
/// already present (in the collection or earlier in `incoming`).
///
/// Relative order of the incoming artifacts is preserved. Returns the
/// number of artifacts added.
pub fn merge_artifacts(
    collection: &mut Vec<Artifact>,
    incoming: &[Artifact],
    placement: Placement,
) -> usize {
    let mut seen: HashSet<&str> = collection.iter().map(|a| a.id.as_str()).collect();
    let fresh: Vec<Artifact> = incoming
        .iter()
        .filter(|a| seen.insert(a.id.as_str()))
        .cloned()
        .collect();
    let added = fresh.len();

    match placement {
        Placement::Prepend => {
            collection.splice(0..0, fresh);
        }
        Placement::Append => collection.extend(fresh),
    }
    added
}

/// Receives the result of every successfully finished job.
pub trait ResultConsumer: Send + Sync {
    fn consume(&self, result: &JobResult);
}

/// In-memory list of artifacts produced during a session.
#[derive(Debug, Default)]
pub struct SessionCollection {
    items: Mutex<Vec<Artifact>>,
    placement: Placement,
}

impl SessionCollection {
    pub fn new(placement: Placement) -> Self {
        Self {
            items: Mutex::new(Vec::new()),
            placement,
        }
    }

    /// Copy of the current contents.
    pub fn items(&self) -> Vec<Artifact> {
        self.items.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    pub fn merge(&self, incoming: &[Artifact]) -> usize {
        merge_artifacts(&mut self.items.lock(), incoming, self.placement)
    }
}

impl ResultConsumer for SessionCollection {
    fn consume(&self, result: &JobResult) {
        self.merge(result.artifacts());
    }
}
