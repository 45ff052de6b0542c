//! Exported JSON
//!
//! A plain serialization of the three collections, for reuse outside the
//! browser (the CLI applies one to a PDF).

use crate::store::{AnnotationStore, BoundingBox, FormValues, TextAnnotation};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnotationSnapshot {
    #[serde(default)]
    pub boxes: Vec<BoundingBox>,
    #[serde(default, rename = "textAnnotations")]
    pub texts: Vec<TextAnnotation>,
    #[serde(default)]
    pub form_values: FormValues,
}

impl AnnotationSnapshot {
    pub fn from_store(store: &AnnotationStore) -> Self {
        Self {
            boxes: store.boxes().to_vec(),
            texts: store.texts().to_vec(),
            form_values: store.form_values().clone(),
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Parse a snapshot, repairing what can be repaired: box corners are
    /// re-sorted, and empty boxes and repeated ids are dropped
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let mut snapshot: Self = serde_json::from_str(json)?;
        snapshot.normalize();
        Ok(snapshot)
    }

    fn normalize(&mut self) {
        let mut seen = HashSet::new();

        self.boxes.retain_mut(|b| {
            let [x1, y1, x2, y2] = b.coords;
            b.coords = [x1.min(x2), y1.min(y2), x1.max(x2), y1.max(y2)];
            let keep = b.width() > 0.0 && b.height() > 0.0 && seen.insert(b.id.clone());
            if !keep {
                tracing::warn!("Dropping box {} from snapshot", b.id);
            }
            keep
        });

        self.texts.retain(|t| {
            let keep = seen.insert(t.id.clone());
            if !keep {
                tracing::warn!("Dropping text annotation {} with a repeated id", t.id);
            }
            keep
        });
    }
}
