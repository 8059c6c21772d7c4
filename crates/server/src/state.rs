use std::sync::Arc;

use reelcrawl_core::{
    Config, ControlService, ItemRepository, PipelineRunner, SanitizedConfig,
};

/// Shared application state
pub struct AppState {
    config: Config,
    repository: Arc<dyn ItemRepository>,
    control: Arc<ControlService>,
    pipeline: Arc<PipelineRunner>,
}

impl AppState {
    pub fn new(
        config: Config,
        repository: Arc<dyn ItemRepository>,
        control: Arc<ControlService>,
        pipeline: Arc<PipelineRunner>,
    ) -> Self {
        Self {
            config,
            repository,
            control,
            pipeline,
        }
    }

    pub fn sanitized_config(&self) -> SanitizedConfig {
        SanitizedConfig::from(&self.config)
    }

    pub fn repository(&self) -> &dyn ItemRepository {
        self.repository.as_ref()
    }

    pub fn control(&self) -> &ControlService {
        &self.control
    }

    pub fn pipeline(&self) -> &PipelineRunner {
        &self.pipeline
    }
}
