//! Burncast: agricultural burn coordination
//!
//! Coordinates field-burning requests across nearby farms so cumulative
//! smoke stays under PM2.5 safety thresholds.
//!
//! ## Architecture
//!
//! - **Coordinator**: request validation, priority scoring, terrain embedding
//! - **Weather**: provider fetch + cache, Pasquill–Gifford stability, suitability
//! - **Predictor**: Gaussian-plume dispersion, pairwise conflict detection
//! - **Optimizer**: simulated-annealing schedule search
//! - **Alerts**: multi-channel dispatch with acknowledgment tracking
//! - **Pipeline**: process-wide orchestrator driving submissions through
//!   the stages and batching optimization cycles

pub mod alerts;
pub mod api;
pub mod config;
pub mod coordinator;
pub mod embedding;
pub mod error;
pub mod optimizer;
pub mod pipeline;
pub mod predictor;
pub mod store;
pub mod types;
pub mod weather;

// Re-export the configuration record
pub use config::AppConfig;

// Re-export commonly used types
pub use types::{
    Alert, AlertRecipient, AlertSeverity, AlertType, BurnRequest, Conflict, ConflictSeverity,
    CropType, Farm, Field, RequestStatus, ScheduleEntry, ScheduleStatus, SmokePrediction,
    StabilityClass, WeatherObservation,
};

// Re-export the error taxonomy
pub use error::{AppError, ErrorKind};

// Re-export the pipeline components
pub use alerts::AlertService;
pub use coordinator::Coordinator;
pub use optimizer::Optimizer;
pub use pipeline::Pipeline;
pub use predictor::Predictor;
pub use store::{MemStore, PgStore, Store};
pub use weather::WeatherService;
