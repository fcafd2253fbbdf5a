use crate::foundation::core::{NodeId, Point};

/// Severity of an [`Issue`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    Warning,
    Error,
}

/// Region- or sample-scoped diagnostic attached to a pipeline artifact.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Issue {
    pub kind: IssueKind,
    pub message: String,
    /// Location of the problem in sketch-local millimetres, when known.
    pub center: Option<Point>,
    pub sketch: Option<NodeId>,
    /// Offending mesh samples (finest layer indices of `sketch`).
    #[serde(default)]
    pub samples: Vec<u32>,
}

impl Issue {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            kind: IssueKind::Error,
            message: message.into(),
            center: None,
            sketch: None,
            samples: Vec::new(),
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            kind: IssueKind::Warning,
            ..Self::error(message)
        }
    }

    pub fn at(mut self, center: Point) -> Self {
        self.center = Some(center);
        self
    }

    pub fn on(mut self, sketch: NodeId) -> Self {
        self.sketch = Some(sketch);
        self
    }

    pub fn with_samples(mut self, samples: Vec<u32>) -> Self {
        self.samples = samples;
        self
    }

    pub fn is_error(&self) -> bool {
        self.kind == IssueKind::Error
    }
}

/// Count issues of a given kind.
pub fn count_kind(issues: &[Issue], kind: IssueKind) -> usize {
    issues.iter().filter(|i| i.kind == kind).count()
}
