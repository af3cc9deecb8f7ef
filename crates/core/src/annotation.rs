use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::request::SpaceRequestDraft;

/// Optional free-text note attached to a request at submission. Providers must never block
/// submission: return `None` when no annotation is available.
#[async_trait]
pub trait AnnotationProvider: Send + Sync {
    async fn annotate(&self, draft: &SpaceRequestDraft) -> Option<String>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct NoAnnotation;

#[async_trait]
impl AnnotationProvider for NoAnnotation {
    async fn annotate(&self, _draft: &SpaceRequestDraft) -> Option<String> {
        None
    }
}

/// Which provider annotates submissions. Selected by `workflow.annotation`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnnotationMode {
    #[default]
    None,
    Footprint,
}

impl AnnotationMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Footprint => "footprint",
        }
    }

    pub fn provider(self) -> Arc<dyn AnnotationProvider> {
        match self {
            Self::None => Arc::new(NoAnnotation),
            Self::Footprint => Arc::new(FootprintAnnotation),
        }
    }
}

impl FromStr for AnnotationMode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(Self::None),
            "footprint" => Ok(Self::Footprint),
            other => Err(format!("unknown annotation mode `{other}`")),
        }
    }
}

/// Deterministic note built from the draft's own dimensions.
#[derive(Clone, Copy, Debug, Default)]
pub struct FootprintAnnotation;

#[async_trait]
impl AnnotationProvider for FootprintAnnotation {
    async fn annotate(&self, draft: &SpaceRequestDraft) -> Option<String> {
        if draft.machine_name.trim().is_empty() {
            return None;
        }
        Some(format!(
            "Footprint {} x {} x {} for {}.",
            draft.length.normalize(),
            draft.width.normalize(),
            draft.height.normalize(),
            draft.machine_name.trim()
        ))
    }
}
