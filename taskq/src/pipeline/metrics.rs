/// What happened to one stage for one payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageOutcome {
    /// The stage output became the next stage's input.
    Applied,
    /// The stage failed; its input was passed on unchanged.
    Skipped { error: String },
}

impl StageOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, StageOutcome::Applied)
    }
}

#[derive(Debug, Clone)]
pub struct StageMetrics {
    pub index: usize,
    pub name: String,
    pub outcome: StageOutcome,
    pub duration_ms: u128,
}

#[derive(Debug, Clone, Default)]
pub struct PipelineMetrics {
    pub total_duration_ms: u128,
    pub stages: Vec<StageMetrics>,
}

impl PipelineMetrics {
    pub fn stage_duration_ms(&self, name: &str) -> Option<u128> {
        self.stages
            .iter()
            .find(|stage| stage.name == name)
            .map(|stage| stage.duration_ms)
    }

    /// Stages that failed and were skipped, in execution order.
    pub fn skipped(&self) -> impl Iterator<Item = &StageMetrics> {
        self.stages
            .iter()
            .filter(|stage| !stage.outcome.is_applied())
    }

    pub fn failure_count(&self) -> usize {
        self.skipped().count()
    }

    /// Every stage applied its transform.
    pub fn is_clean(&self) -> bool {
        self.failure_count() == 0
    }
}
