//! Process-level setup: logging and the recognition engine lifecycle

use crate::config::{ConfigError, ScanmarkConfig};
use crate::ocr::{OcrPipeline, RecognitionEngine, RecognitionError};
use crate::session::{DocumentSession, SessionError};
use crate::tesseract::TesseractEngine;
use scanmark_pdf::{default_engine, OpenSource, PdfEngine};
use std::sync::{Arc, OnceLock};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Used when `RUST_LOG` is unset
pub const DEFAULT_LOG_FILTER: &str = "info,scanmark=debug";

static LOGGING: OnceLock<()> = OnceLock::new();

/// Install the global tracing subscriber
///
/// Safe to call more than once. If the host already installed a
/// subscriber, that one is kept.
pub fn init_logging() {
    LOGGING.get_or_init(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(DEFAULT_LOG_FILTER));

        let installed = tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_target(false))
            .try_init();

        if installed.is_ok() {
            tracing::debug!("logging initialized");
        }
    });
}

#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("recognition engine check failed: {0}")]
    Recognition(#[from] RecognitionError),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error("runtime already shut down")]
    ShutDown,
}

/// Holds the validated configuration and the shared recognition engine
///
/// Create one with [`Runtime::init`] at startup and release it with
/// [`Runtime::shutdown`]. Sessions opened from it share the engine.
pub struct Runtime {
    config: ScanmarkConfig,
    engine: Option<Arc<dyn RecognitionEngine>>,
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("config", &self.config)
            .field("engine", &self.engine.as_ref().map(|engine| engine.name()))
            .finish()
    }
}

impl Runtime {
    /// Start with the tesseract engine from `config`
    pub fn init(config: ScanmarkConfig) -> Result<Self, RuntimeError> {
        let engine = Arc::new(TesseractEngine::from_config(&config.ocr));
        Self::with_engine(config, engine)
    }

    /// Start with a caller-supplied engine; the engine is probed once here
    pub fn with_engine(
        config: ScanmarkConfig,
        engine: Arc<dyn RecognitionEngine>,
    ) -> Result<Self, RuntimeError> {
        init_logging();
        config.validate()?;
        engine.probe()?;

        tracing::info!(
            engine = engine.name(),
            language = %config.ocr.language,
            magnification = config.ocr.magnification,
            concurrent = config.ocr.concurrent,
            "runtime initialized"
        );

        Ok(Self { config, engine: Some(engine) })
    }

    pub fn config(&self) -> &ScanmarkConfig {
        &self.config
    }

    pub fn is_running(&self) -> bool {
        self.engine.is_some()
    }

    pub fn pipeline(&self) -> Result<OcrPipeline, RuntimeError> {
        let engine = self.engine.as_ref().ok_or(RuntimeError::ShutDown)?;
        Ok(OcrPipeline::new(Arc::clone(engine), &self.config.ocr))
    }

    /// Open a document from a path, URL or bytes with the default backend
    pub fn open_document(
        &self,
        source: impl Into<OpenSource>,
        container_width: f32,
    ) -> Result<DocumentSession, RuntimeError> {
        self.open_with_engine(default_engine(), source, container_width)
    }

    pub fn open_with_engine(
        &self,
        engine: Box<dyn PdfEngine>,
        source: impl Into<OpenSource>,
        container_width: f32,
    ) -> Result<DocumentSession, RuntimeError> {
        let pipeline = self.pipeline()?;
        DocumentSession::open(engine, source.into(), pipeline, self.config.clone(), container_width)
            .map_err(RuntimeError::from)
    }

    /// Release the engine; sessions still holding it keep it alive until
    /// they are dropped
    pub fn shutdown(mut self) {
        if let Some(engine) = self.engine.take() {
            tracing::info!(
                engine = engine.name(),
                sessions = Arc::strong_count(&engine) - 1,
                "runtime shut down"
            );
        }
    }
}
