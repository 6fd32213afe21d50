//! Depreciation forecast and "sell before" advisory.

use crate::error::PipelineError;
use crate::model::PricePredictor;
use crate::types::{FeatureRecord, ForecastPoint, ForecastSeries, PredictionResult, FORECAST_POINTS};

pub fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

/// Price for the record at its own year.
pub fn predict_price(
    predictor: &dyn PricePredictor,
    record: &FeatureRecord,
) -> Result<PredictionResult, PipelineError> {
    let price = predictor.predict(record)?;
    Ok(PredictionResult {
        year: record.year(),
        price: round2(price),
    })
}

/// Predict the record at `start_year`, `start_year + 1`, ... `start_year + 5`.
///
/// All-or-nothing: a failure on any step fails the forecast.
pub fn generate_forecast(
    predictor: &dyn PricePredictor,
    base: &FeatureRecord,
    start_year: i32,
) -> Result<ForecastSeries, PipelineError> {
    if start_year != base.year() {
        return Err(PipelineError::invalid(
            "year",
            format!("forecast start {} differs from record year {}", start_year, base.year()),
        ));
    }

    let mut points = Vec::with_capacity(FORECAST_POINTS);
    for i in 0..FORECAST_POINTS as i32 {
        let year = start_year + i;
        let price = round2(predictor.predict(&base.with_year(year))?);
        tracing::debug!(model = predictor.name(), year, price, "forecast step");
        points.push(ForecastPoint { year, price });
    }
    ForecastSeries::new(points)
}

/// Year of the lowest forecast price; the earliest year wins a tie.
pub fn select_best_sale_year(series: &ForecastSeries) -> i32 {
    let first = series.first();
    series
        .points()
        .iter()
        .fold(first, |best, p| if p.price < best.price { *p } else { best })
        .year
}

/// Slice form of [`select_best_sale_year`]; `None` for an empty slice.
pub fn min_price_year(points: &[(i32, f64)]) -> Option<i32> {
    let (&first, rest) = points.split_first()?;
    Some(
        rest.iter()
            .fold(first, |best, &p| if p.1 < best.1 { p } else { best })
            .0,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ModelError;
    use crate::types::{FuelType, SellerType, Transmission};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Price = table[year - 2014], for scripted series.
    struct Scripted(Vec<f64>);

    impl PricePredictor for Scripted {
        fn predict(&self, record: &FeatureRecord) -> Result<f64, ModelError> {
            self.0
                .get((record.year() - 2014) as usize)
                .copied()
                .ok_or_else(|| ModelError::Inference("out of script".to_string()))
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    /// Fails on one particular year and counts calls.
    struct FailsOn {
        year: i32,
        calls: AtomicUsize,
    }

    impl PricePredictor for FailsOn {
        fn predict(&self, record: &FeatureRecord) -> Result<f64, ModelError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if record.year() == self.year {
                return Err(ModelError::Inference("boom".to_string()));
            }
            Ok(1.0)
        }

        fn name(&self) -> &str {
            "fails-on"
        }
    }

    fn maruti() -> FeatureRecord {
        FeatureRecord::new(
            "Maruti",
            2014,
            5.59,
            27000,
            FuelType::Petrol,
            SellerType::Dealer,
            Transmission::Manual,
            0,
        )
        .unwrap()
    }

    #[test]
    fn test_forecast_has_six_contiguous_years() {
        let model = Scripted(vec![4.1, 3.9, 3.5, 3.3, 3.0, 2.8]);
        let series = generate_forecast(&model, &maruti(), 2014).unwrap();
        assert_eq!(series.years(), vec![2014, 2015, 2016, 2017, 2018, 2019]);
        assert_eq!(series.prices(), vec![4.1, 3.9, 3.5, 3.3, 3.0, 2.8]);
    }

    #[test]
    fn test_forecast_rounds_to_cents() {
        let model = Scripted(vec![4.12345, 3.999, 3.5, 3.3, 3.0, 2.8]);
        let series = generate_forecast(&model, &maruti(), 2014).unwrap();
        assert_eq!(series.prices()[0], 4.12);
        assert_eq!(series.prices()[1], 4.0);
    }

    #[test]
    fn test_prediction_matches_first_point() {
        let model = Scripted(vec![4.12345, 3.9, 3.5, 3.3, 3.0, 2.8]);
        let series = generate_forecast(&model, &maruti(), 2014).unwrap();
        let single = predict_price(&model, &maruti()).unwrap();
        assert_eq!(single, PredictionResult::from_series(&series));
    }

    #[test]
    fn test_forecast_start_must_match_record() {
        let model = Scripted(vec![1.0; 8]);
        let err = generate_forecast(&model, &maruti(), 2015).unwrap_err();
        assert!(err.is_invalid_input());
    }

    #[test]
    fn test_forecast_is_all_or_nothing() {
        let model = FailsOn {
            year: 2017,
            calls: AtomicUsize::new(0),
        };
        let err = generate_forecast(&model, &maruti(), 2014).unwrap_err();
        assert!(matches!(err, PipelineError::Prediction(_)));
        assert_eq!(model.calls.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn test_best_year_is_minimum() {
        let model = Scripted(vec![4.0, 3.0, 2.0, 2.5, 3.5, 5.0]);
        let series = generate_forecast(&model, &maruti(), 2014).unwrap();
        assert_eq!(select_best_sale_year(&series), 2016);
    }

    #[test]
    fn test_best_year_tie_picks_earliest() {
        let model = Scripted(vec![4.0, 2.0, 3.0, 2.0, 2.0, 5.0]);
        let series = generate_forecast(&model, &maruti(), 2014).unwrap();
        assert_eq!(select_best_sale_year(&series), 2015);
    }

    #[test]
    fn test_min_price_year_on_slices() {
        assert_eq!(min_price_year(&[]), None);
        assert_eq!(min_price_year(&[(2020, 1.0)]), Some(2020));
        assert_eq!(min_price_year(&[(2020, 2.0), (2021, 1.0), (2022, 1.0)]), Some(2021));
    }
}
