//! Process-wide handle to the loaded price model.
//!
//! The artifact is loaded once at start-up and is read-only afterwards, so
//! every request shares the same `Arc`.

use once_cell::sync::OnceCell;
use std::sync::Arc;

use crate::model::{ModelError, PricePredictor};

static MODEL: OnceCell<Arc<dyn PricePredictor>> = OnceCell::new();

/// Install the model. Fails if one is already installed.
pub fn init(model: Arc<dyn PricePredictor>) -> Result<Arc<dyn PricePredictor>, ModelError> {
    MODEL
        .set(model)
        .map_err(|_| ModelError::AlreadyInitialised)?;
    get().ok_or(ModelError::AlreadyInitialised)
}

/// Install the model produced by `load` unless one is already present.
pub fn get_or_try_init<F>(load: F) -> anyhow::Result<Arc<dyn PricePredictor>>
where
    F: FnOnce() -> anyhow::Result<Arc<dyn PricePredictor>>,
{
    MODEL.get_or_try_init(load).cloned()
}

pub fn get() -> Option<Arc<dyn PricePredictor>> {
    MODEL.get().cloned()
}
