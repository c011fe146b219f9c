use color_eyre::Result;
use tracing::info;

use crate::call::{ExecutionRecord, InteractionTrace, ToolCall, TurnEvent, dispatch_with, handle_question_with_logger};
use crate::config::Config;
use crate::dataset::{IncidentStore, loader::load_dataset};
use crate::eval::{EvalReport, EvalSuite, run_suite};
use crate::llm::{ModelGateway, backend_from_config};
use crate::tools::{ToolCatalog, catalog};

/// Everything a turn needs, passed explicitly instead of living in globals.
pub struct AppContext {
    pub config: Config,
    pub store: IncidentStore,
    pub catalog: &'static ToolCatalog,
}

impl AppContext {
    /// Context with an empty store; call [`AppContext::load`] before asking questions.
    pub fn new(config: Config) -> Self {
        Self { config, store: IncidentStore::empty(), catalog: catalog() }
    }

    /// Load (or reload) the dataset per config and swap it in. Returns the record count.
    pub fn load(&self, force_refresh: bool) -> Result<usize> {
        let dataset = load_dataset(&self.config, force_refresh)?;
        let n = dataset.len();
        info!(target: "cli", records = n, source = %dataset.source(), "dataset_ready");
        self.store.replace(dataset);
        Ok(n)
    }

    pub fn gateway(&self) -> Result<ModelGateway> {
        let backend = backend_from_config(&self.config)?;
        Ok(ModelGateway::new(backend, &self.config.prompt_variant, self.catalog))
    }

    pub fn ask(&self, gateway: &ModelGateway, question: &str, logger: impl FnMut(&TurnEvent)) -> InteractionTrace {
        handle_question_with_logger(question, gateway, self.catalog, &self.store, logger)
    }

    pub fn run_tool(&self, call: &ToolCall) -> ExecutionRecord {
        dispatch_with(self.catalog, call, &self.store)
    }

    pub fn evaluate(&self, gateway: &ModelGateway, suite: &EvalSuite) -> EvalReport {
        run_suite(suite, gateway, self.catalog, &self.store, &self.config.model)
    }
}
