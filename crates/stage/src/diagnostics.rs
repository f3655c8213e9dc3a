use crate::pipeline::LoadStage;

/// A load failure recorded for display and tests. Never retried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub stage: LoadStage,
    pub message: String,
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} stage failed: {}", self.stage, self.message)
    }
}

/// Append-only diagnostic log of a mount.
#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, stage: LoadStage, message: impl Into<String>) {
        let message = message.into();
        tracing::error!(%stage, error = %message, "asset load failed");
        self.entries.push(Diagnostic { stage, message });
    }

    pub fn entries(&self) -> &[Diagnostic] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_in_order() {
        let mut d = Diagnostics::new();
        d.record(LoadStage::Model, "missing.glb not found");
        d.record(LoadStage::Environment, "bad header");
        assert_eq!(d.len(), 2);
        assert_eq!(d.entries()[0].stage, LoadStage::Model);
        assert_eq!(
            d.entries()[1].to_string(),
            "environment stage failed: bad header"
        );
    }
}
