use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

use crate::error::PipelineError;

pub const MIN_YEAR: i32 = 1995;
pub const MAX_YEAR: i32 = 2025;
pub const MAX_PRESENT_PRICE: f64 = 100.0;
pub const MAX_KMS_DRIVEN: u32 = 500_000;
pub const MAX_OWNER: u8 = 3;

/// Number of (year, price) points in every forecast: base year through base year + 5.
pub const FORECAST_POINTS: usize = 6;

// ---------- Categorical attributes ----------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FuelType {
    Petrol,
    Diesel,
    #[serde(rename = "CNG")]
    Cng,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SellerType {
    Dealer,
    Individual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Transmission {
    Manual,
    Automatic,
}

/// Label spelling must match the categories the model was trained on.
macro_rules! labelled_enum {
    ($ty:ident, $field:literal, { $($variant:ident => $label:literal),+ $(,)? }) => {
        impl $ty {
            pub const ALL: &'static [$ty] = &[$($ty::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($ty::$variant => $label),+
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $ty {
            type Err = PipelineError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim() {
                    $($label => Ok($ty::$variant),)+
                    other => Err(PipelineError::invalid(
                        $field,
                        format!(
                            "'{}' is not one of {}",
                            other,
                            [$($label),+].join("/")
                        ),
                    )),
                }
            }
        }
    };
}

labelled_enum!(FuelType, "fuel_type", { Petrol => "Petrol", Diesel => "Diesel", Cng => "CNG" });
labelled_enum!(SellerType, "seller_type", { Dealer => "Dealer", Individual => "Individual" });
labelled_enum!(Transmission, "transmission", { Manual => "Manual", Automatic => "Automatic" });

// ---------- Feature record ----------

/// Column names of the trained feature schema, in display order.
pub const FIELD_LABELS: [&str; 8] = [
    "company",
    "Year",
    "Present_Price",
    "Kms_Driven",
    "Fuel_Type",
    "Seller_Type",
    "Transmission",
    "Owner",
];

pub const NUMERIC_COLUMNS: [&str; 4] = ["Year", "Present_Price", "Kms_Driven", "Owner"];
pub const CATEGORICAL_COLUMNS: [&str; 4] = ["company", "Fuel_Type", "Seller_Type", "Transmission"];

/// Validated car attributes handed to the price model.
///
/// Fields are private so a record can only exist in a validated state; the
/// forecast derives shifted copies through [`FeatureRecord::with_year`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureRecord {
    company: String,
    #[serde(rename = "Year")]
    year: i32,
    #[serde(rename = "Present_Price")]
    present_price: f64,
    #[serde(rename = "Kms_Driven")]
    kms_driven: u32,
    #[serde(rename = "Fuel_Type")]
    fuel_type: FuelType,
    #[serde(rename = "Seller_Type")]
    seller_type: SellerType,
    #[serde(rename = "Transmission")]
    transmission: Transmission,
    #[serde(rename = "Owner")]
    owner: u8,
}

impl FeatureRecord {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        company: impl Into<String>,
        year: i32,
        present_price: f64,
        kms_driven: u32,
        fuel_type: FuelType,
        seller_type: SellerType,
        transmission: Transmission,
        owner: u8,
    ) -> Result<Self, PipelineError> {
        let company = company.into().trim().to_string();
        if company.is_empty() {
            return Err(PipelineError::invalid("company", "must not be empty"));
        }
        if !(MIN_YEAR..=MAX_YEAR).contains(&year) {
            return Err(PipelineError::invalid(
                "year",
                format!("{} is outside {}-{}", year, MIN_YEAR, MAX_YEAR),
            ));
        }
        if !present_price.is_finite() || !(0.0..=MAX_PRESENT_PRICE).contains(&present_price) {
            return Err(PipelineError::invalid(
                "present_price",
                format!("{} is outside 0-{} Lakhs", present_price, MAX_PRESENT_PRICE),
            ));
        }
        if kms_driven > MAX_KMS_DRIVEN {
            return Err(PipelineError::invalid(
                "kms_driven",
                format!("{} is above {}", kms_driven, MAX_KMS_DRIVEN),
            ));
        }
        if owner > MAX_OWNER {
            return Err(PipelineError::invalid(
                "owner",
                format!("{} is not one of 0/1/2/3", owner),
            ));
        }
        Ok(Self {
            company,
            year,
            present_price,
            kms_driven,
            fuel_type,
            seller_type,
            transmission,
            owner,
        })
    }

    /// Copy of this record with only the year changed. Used for forecast
    /// steps, which may run past [`MAX_YEAR`].
    pub fn with_year(&self, year: i32) -> Self {
        Self {
            year,
            ..self.clone()
        }
    }

    pub fn company(&self) -> &str {
        &self.company
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn present_price(&self) -> f64 {
        self.present_price
    }

    pub fn kms_driven(&self) -> u32 {
        self.kms_driven
    }

    pub fn fuel_type(&self) -> FuelType {
        self.fuel_type
    }

    pub fn seller_type(&self) -> SellerType {
        self.seller_type
    }

    pub fn transmission(&self) -> Transmission {
        self.transmission
    }

    pub fn owner(&self) -> u8 {
        self.owner
    }

    pub fn numeric(&self, column: &str) -> Option<f64> {
        match column {
            "Year" => Some(self.year as f64),
            "Present_Price" => Some(self.present_price),
            "Kms_Driven" => Some(self.kms_driven as f64),
            "Owner" => Some(self.owner as f64),
            _ => None,
        }
    }

    pub fn categorical(&self, column: &str) -> Option<&str> {
        match column {
            "company" => Some(&self.company),
            "Fuel_Type" => Some(self.fuel_type.as_str()),
            "Seller_Type" => Some(self.seller_type.as_str()),
            "Transmission" => Some(self.transmission.as_str()),
            _ => None,
        }
    }

    /// `(label, value)` pairs in [`FIELD_LABELS`] order.
    pub fn fields(&self) -> Vec<(&'static str, String)> {
        vec![
            ("company", self.company.clone()),
            ("Year", self.year.to_string()),
            ("Present_Price", self.present_price.to_string()),
            ("Kms_Driven", self.kms_driven.to_string()),
            ("Fuel_Type", self.fuel_type.to_string()),
            ("Seller_Type", self.seller_type.to_string()),
            ("Transmission", self.transmission.to_string()),
            ("Owner", self.owner.to_string()),
        ]
    }
}

// ---------- Forecast ----------

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ForecastPoint {
    pub year: i32,
    pub price: f64,
}

/// Six contiguous, ascending (year, price) points.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ForecastSeries {
    points: Vec<ForecastPoint>,
}

impl ForecastSeries {
    pub fn new(points: Vec<ForecastPoint>) -> Result<Self, PipelineError> {
        if points.len() != FORECAST_POINTS {
            return Err(PipelineError::Prediction(format!(
                "forecast needs {} points, got {}",
                FORECAST_POINTS,
                points.len()
            )));
        }
        if points.windows(2).any(|w| w[1].year != w[0].year + 1) {
            return Err(PipelineError::Prediction(
                "forecast years must be contiguous and ascending".to_string(),
            ));
        }
        Ok(Self { points })
    }

    pub fn points(&self) -> &[ForecastPoint] {
        &self.points
    }

    pub fn first(&self) -> ForecastPoint {
        self.points[0]
    }

    pub fn start_year(&self) -> i32 {
        self.points[0].year
    }

    pub fn years(&self) -> Vec<i32> {
        self.points.iter().map(|p| p.year).collect()
    }

    pub fn prices(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.price).collect()
    }

    pub fn as_pairs(&self) -> Vec<(i32, f64)> {
        self.points.iter().map(|p| (p.year, p.price)).collect()
    }
}

/// Predicted price in Lakhs, rounded to 2 decimals.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PredictionResult {
    pub year: i32,
    pub price: f64,
}

impl PredictionResult {
    pub fn from_series(series: &ForecastSeries) -> Self {
        let first = series.first();
        Self {
            year: first.year,
            price: first.price,
        }
    }
}

impl fmt::Display for PredictionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.price)
    }
}
