use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::{collections::HashMap, fs, path::Path, sync::Arc};
use thiserror::Error;

use crate::config::{Backend, Config};
use crate::types::{FeatureRecord, CATEGORICAL_COLUMNS, NUMERIC_COLUMNS};

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("unknown {column} value '{value}'")]
    UnknownCategory { column: String, value: String },

    #[error("unsupported feature column '{0}'")]
    UnsupportedFeature(String),

    #[error("feature length mismatch: got {got}, expected {expected}")]
    LengthMismatch { got: usize, expected: usize },

    #[error("model returned a non-finite price")]
    NonFinite,

    #[error("inference failed: {0}")]
    Inference(String),

    #[error("model store already initialised")]
    AlreadyInitialised,
}

/// A pre-trained regression artifact: one record in, one price (Lakhs) out.
pub trait PricePredictor: Send + Sync {
    fn predict(&self, record: &FeatureRecord) -> Result<f64, ModelError>;

    /// Short backend name for logs.
    fn name(&self) -> &str;
}

// ---------- Feature encoding ----------

#[derive(Debug, Clone)]
enum Slot {
    Numeric(&'static str),
    OneHot { column: &'static str, value: String },
}

/// Maps a [`FeatureRecord`] onto the artifact's authoritative column order.
///
/// Numeric columns are referenced by name (`Year`, `Present_Price`, ...).
/// Categorical columns are one-hot as `Column_Value`, e.g. `Fuel_Type_Diesel`.
/// Columns listed in `categories` reject values outside that list; this is
/// how an unseen categorical value fails at prediction time.
#[derive(Debug, Clone)]
pub struct FeatureEncoder {
    feat_list: Vec<String>,
    slots: Vec<Slot>,
    categories: HashMap<String, Vec<String>>,
}

impl FeatureEncoder {
    pub fn new(
        feat_list: Vec<String>,
        categories: HashMap<String, Vec<String>>,
    ) -> Result<Self, ModelError> {
        let slots = feat_list
            .iter()
            .map(|name| parse_slot(name).ok_or_else(|| ModelError::UnsupportedFeature(name.clone())))
            .collect::<Result<Vec<_>, _>>()?;
        if let Some(col) = categories
            .keys()
            .find(|c| !CATEGORICAL_COLUMNS.contains(&c.as_str()))
        {
            return Err(ModelError::UnsupportedFeature(col.clone()));
        }
        Ok(Self {
            feat_list,
            slots,
            categories,
        })
    }

    pub fn feat_list(&self) -> &[String] {
        &self.feat_list
    }

    pub fn in_dim(&self) -> usize {
        self.slots.len()
    }

    pub fn encode(&self, record: &FeatureRecord) -> Result<Vec<f64>, ModelError> {
        for (column, allowed) in &self.categories {
            let value = record.categorical(column).unwrap_or_default();
            if !allowed.iter().any(|a| a == value) {
                return Err(ModelError::UnknownCategory {
                    column: column.clone(),
                    value: value.to_string(),
                });
            }
        }

        let mut v = Vec::with_capacity(self.slots.len());
        for slot in &self.slots {
            let x = match slot {
                Slot::Numeric(col) => record.numeric(col).unwrap_or(0.0),
                Slot::OneHot { column, value } => {
                    if record.categorical(column) == Some(value.as_str()) {
                        1.0
                    } else {
                        0.0
                    }
                }
            };
            v.push(x);
        }
        Ok(v)
    }
}

fn parse_slot(name: &str) -> Option<Slot> {
    if let Some(col) = NUMERIC_COLUMNS.iter().copied().find(|c| *c == name) {
        return Some(Slot::Numeric(col));
    }
    CATEGORICAL_COLUMNS.iter().copied().find_map(|col| {
        name.strip_prefix(col)
            .and_then(|rest| rest.strip_prefix('_'))
            .filter(|value| !value.is_empty())
            .map(|value| Slot::OneHot {
                column: col,
                value: value.to_string(),
            })
    })
}

fn log_pred_enabled() -> bool {
    std::env::var("LOG_PRED").ok().as_deref() == Some("1")
}

/// Debug signal so we can confirm we're not sending all-zeros.
fn log_feature_vector(vec: &[f64], feat_list: &[String]) {
    let nz = vec.iter().filter(|x| **x != 0.0).count();
    let mean = if vec.is_empty() { 0.0 } else { vec.iter().sum::<f64>() / (vec.len() as f64) };
    let mut sample = vec![];
    for (i, name) in feat_list.iter().take(6).enumerate() {
        sample.push(format!("{}={:.3}", name, vec[i]));
    }
    tracing::info!(
        "encoded in_dim={} nonzero={} mean={:.3} sample=[{}]",
        vec.len(), nz, mean, sample.join(", ")
    );
}

// ---------- Linear backend ----------

#[derive(Deserialize)]
struct LinearJson {
    feat_list: Vec<String>,
    coefficients: Vec<f64>,
    intercept: f64,
    #[serde(default)]
    categories: HashMap<String, Vec<String>>,
}

/// Ordinary least squares model exported as JSON coefficients.
pub struct LinearModel {
    encoder: FeatureEncoder,
    coefficients: Vec<f64>,
    intercept: f64,
    log_pred: bool,
}

impl LinearModel {
    pub fn new(
        encoder: FeatureEncoder,
        coefficients: Vec<f64>,
        intercept: f64,
    ) -> Result<Self, ModelError> {
        if coefficients.len() != encoder.in_dim() {
            return Err(ModelError::LengthMismatch {
                got: coefficients.len(),
                expected: encoder.in_dim(),
            });
        }
        Ok(Self {
            encoder,
            coefficients,
            intercept,
            log_pred: log_pred_enabled(),
        })
    }

    pub fn from_json(txt: &str) -> Result<Self> {
        let raw: LinearJson = serde_json::from_str(txt).context("failed to parse linear model JSON")?;
        let encoder = FeatureEncoder::new(raw.feat_list, raw.categories)?;
        Ok(Self::new(encoder, raw.coefficients, raw.intercept)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let txt = fs::read_to_string(path)
            .with_context(|| format!("failed to read model at {}", path.display()))?;
        Self::from_json(&txt).with_context(|| format!("invalid model artifact {}", path.display()))
    }
}

impl PricePredictor for LinearModel {
    fn predict(&self, record: &FeatureRecord) -> Result<f64, ModelError> {
        let x = self.encoder.encode(record)?;
        if self.log_pred {
            log_feature_vector(&x, self.encoder.feat_list());
        }
        let price = self.intercept
            + x.iter()
                .zip(&self.coefficients)
                .map(|(x, w)| x * w)
                .sum::<f64>();
        if !price.is_finite() {
            return Err(ModelError::NonFinite);
        }
        Ok(price)
    }

    fn name(&self) -> &str {
        "linear"
    }
}

// ---------- TorchScript backend ----------

#[cfg(feature = "torch")]
pub use torch::TorchModel;

#[cfg(feature = "torch")]
mod torch {
    use super::*;
    use parking_lot::Mutex;
    use tch::{kind::Kind, CModule, Device, Tensor};

    #[derive(Deserialize)]
    struct MetaJson {
        feat_list: Vec<String>,
        in_dim: Option<usize>,
        #[serde(default)]
        categories: HashMap<String, Vec<String>>,
    }

    /// TorchScript regressor: `[1, in_dim]` float input, one scalar out.
    pub struct TorchModel {
        model: Mutex<CModule>,
        device: Device,
        encoder: FeatureEncoder,
        log_pred: bool,
    }

    impl TorchModel {
        pub fn new(model_path: &str, meta_path: &str) -> Result<Self> {
            let device = Device::Cpu;

            // Load meta.json to get feature ordering and input dim
            let meta_txt = fs::read_to_string(Path::new(meta_path))
                .with_context(|| format!("failed to read meta at {}", meta_path))?;
            let meta: MetaJson =
                serde_json::from_str(&meta_txt).with_context(|| "failed to parse meta.json")?;

            let encoder = FeatureEncoder::new(meta.feat_list, meta.categories)?;
            let in_dim = meta.in_dim.unwrap_or(encoder.in_dim());
            if in_dim != encoder.in_dim() {
                tracing::warn!(
                    "meta.in_dim ({}) != feat_list.len() ({}); using feat_list.len()",
                    in_dim,
                    encoder.in_dim()
                );
            }

            let model = CModule::load_on_device(model_path, device)
                .with_context(|| format!("failed to load TorchScript {}", model_path))?;

            // Probe output shape with a dummy forward; expect a single value
            let dummy = Tensor::zeros([1, encoder.in_dim() as i64], (Kind::Float, device));
            let t = model.forward_ts(&[dummy])?;
            if t.numel() != 1 {
                bail!("unexpected model output size: {:?}", t.size());
            }

            Ok(Self {
                model: Mutex::new(model),
                device,
                encoder,
                log_pred: log_pred_enabled(),
            })
        }
    }

    impl PricePredictor for TorchModel {
        fn predict(&self, record: &FeatureRecord) -> Result<f64, ModelError> {
            let x = self.encoder.encode(record)?;
            if self.log_pred {
                log_feature_vector(&x, self.encoder.feat_list());
            }
            let x: Vec<f32> = x.into_iter().map(|v| v as f32).collect();
            let input = Tensor::from_slice(&x)
                .reshape([1, x.len() as i64])
                .to_device(self.device);

            let t = self
                .model
                .lock()
                .forward_ts(&[input])
                .map_err(|e| ModelError::Inference(e.to_string()))?;
            let price = t.reshape([-1]).double_value(&[0]);
            if !price.is_finite() {
                return Err(ModelError::NonFinite);
            }
            Ok(price)
        }

        fn name(&self) -> &str {
            "torchscript"
        }
    }
}

// ---------- Loading ----------

/// Load the configured backend from disk.
pub fn load_predictor(cfg: &Config) -> Result<Arc<dyn PricePredictor>> {
    match cfg.backend {
        Backend::Linear => Ok(Arc::new(LinearModel::from_path(&cfg.model_path)?)),
        #[cfg(feature = "torch")]
        Backend::Torch => {
            let Some(meta_path) = cfg.meta_path.as_deref() else {
                bail!("META_PATH not set (required by the torch backend)");
            };
            Ok(Arc::new(TorchModel::new(&cfg.model_path, meta_path)?))
        }
        #[cfg(not(feature = "torch"))]
        Backend::Torch => bail!("torch backend requested but built without the `torch` feature"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FuelType, SellerType, Transmission};

    fn record(company: &str, fuel: FuelType) -> FeatureRecord {
        FeatureRecord::new(
            company,
            2014,
            5.59,
            27000,
            fuel,
            SellerType::Dealer,
            Transmission::Manual,
            0,
        )
        .unwrap()
    }

    fn feats(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_encoder_orders_numeric_and_one_hot() {
        let enc = FeatureEncoder::new(
            feats(&["Fuel_Type_Diesel", "Year", "Present_Price", "Fuel_Type_Petrol", "company_Maruti"]),
            HashMap::new(),
        )
        .unwrap();
        let v = enc.encode(&record("Maruti", FuelType::Petrol)).unwrap();
        assert_eq!(v, vec![0.0, 2014.0, 5.59, 1.0, 1.0]);
    }

    #[test]
    fn test_encoder_rejects_unknown_column() {
        let err = FeatureEncoder::new(feats(&["Year", "Mileage"]), HashMap::new()).unwrap_err();
        assert!(matches!(err, ModelError::UnsupportedFeature(ref c) if c == "Mileage"));

        let err = FeatureEncoder::new(feats(&["Fuel_Type_"]), HashMap::new()).unwrap_err();
        assert!(matches!(err, ModelError::UnsupportedFeature(_)));
    }

    #[test]
    fn test_unseen_category_fails_prediction() {
        let mut categories = HashMap::new();
        categories.insert("company".to_string(), feats(&["Maruti", "Honda"]));
        let enc = FeatureEncoder::new(feats(&["Year", "company_Honda"]), categories).unwrap();
        let model = LinearModel::new(enc, vec![0.5, 1.0], -1000.0).unwrap();

        assert!(model.predict(&record("Maruti", FuelType::Petrol)).is_ok());
        let err = model.predict(&record("Yugo", FuelType::Petrol)).unwrap_err();
        assert!(matches!(err, ModelError::UnknownCategory { ref column, .. } if column == "company"));
    }

    #[test]
    fn test_linear_predict() {
        let model = LinearModel::from_json(
            r#"{
                "feat_list": ["Year", "Present_Price", "Fuel_Type_Diesel"],
                "coefficients": [0.5, 0.4, 2.0],
                "intercept": -1000.0
            }"#,
        )
        .unwrap();
        let petrol = model.predict(&record("Maruti", FuelType::Petrol)).unwrap();
        let diesel = model.predict(&record("Maruti", FuelType::Diesel)).unwrap();
        assert!((petrol - (-1000.0 + 1007.0 + 0.4 * 5.59)).abs() < 1e-9);
        assert!((diesel - petrol - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_linear_rejects_coefficient_mismatch() {
        let err = LinearModel::from_json(
            r#"{"feat_list": ["Year"], "coefficients": [0.5, 1.0], "intercept": 0.0}"#,
        );
        assert!(err.is_err());
    }

    #[test]
    fn test_from_path_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = LinearModel::from_path(dir.path().join("nope.json")).err().unwrap();
        assert!(format!("{:#}", err).contains("failed to read model"));
    }
}
