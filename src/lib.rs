//! Used-car resale price service: model-backed prediction, six-year
//! depreciation forecast, sell-by advisory, narrative explanation and PDF
//! report.

pub mod chart;
pub mod config;
pub mod error;
pub mod forecast;
pub mod form;
pub mod model;
pub mod model_store;
pub mod narrative;
pub mod pipeline;
pub mod report;
pub mod server;
pub mod types;

pub use error::PipelineError;
pub use form::CarForm;
pub use model::{LinearModel, ModelError, PricePredictor};
pub use narrative::{Narrative, TextGenerator};
pub use pipeline::{Feature, Pipeline, PipelineOptions, PipelineOutput};
pub use types::{FeatureRecord, ForecastPoint, ForecastSeries, FuelType, PredictionResult, SellerType, Transmission};
