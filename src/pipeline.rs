//! One prediction request, end to end.
//!
//! Which steps run is decided by [`PipelineOptions`], passed in by the caller,
//! rather than by presentation state.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::chart::{render_chart, DEFAULT_HEIGHT, DEFAULT_WIDTH};
use crate::error::PipelineError;
use crate::forecast::{generate_forecast, predict_price, select_best_sale_year};
use crate::model::PricePredictor;
use crate::narrative::{explain, Narrative, TextGenerator};
use crate::report::build_report;
use crate::types::{FeatureRecord, ForecastSeries, PredictionResult};

/// User-facing features, each mapping to a set of pipeline steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    PricePrediction,
    DepreciationGraph,
    BestTimeToSell,
    AiExplanation,
    DownloadReport,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PipelineOptions {
    pub forecast: bool,
    pub chart: bool,
    pub advisory: bool,
    pub narrative: bool,
    pub report: bool,
}

impl PipelineOptions {
    /// Prediction only.
    pub fn price_only() -> Self {
        Self::default()
    }

    /// Every step, report included.
    pub fn full() -> Self {
        Self {
            forecast: true,
            chart: true,
            advisory: true,
            narrative: true,
            report: true,
        }
    }

    pub fn for_feature(feature: Feature) -> Self {
        let o = Self::default();
        let selected = match feature {
            Feature::PricePrediction => o,
            Feature::DepreciationGraph => Self { chart: true, ..o },
            Feature::BestTimeToSell => Self { advisory: true, ..o },
            Feature::AiExplanation => Self { narrative: true, ..o },
            Feature::DownloadReport => Self { report: true, ..o },
        };
        selected.normalized()
    }

    /// Pull in the steps each enabled step depends on.
    pub fn normalized(self) -> Self {
        let report = self.report;
        let narrative = self.narrative || report;
        let chart = self.chart || report;
        let advisory = self.advisory;
        let forecast = self.forecast || chart || advisory || narrative;
        Self {
            forecast,
            chart,
            advisory,
            narrative,
            report,
        }
    }
}

#[derive(Debug)]
pub struct PipelineOutput {
    pub prediction: PredictionResult,
    pub forecast: Option<ForecastSeries>,
    pub sell_before: Option<i32>,
    pub narrative: Option<Narrative>,
    pub chart_png: Option<Vec<u8>>,
    /// A failed report leaves the other results intact.
    pub report: Option<Result<Vec<u8>, PipelineError>>,
}

#[derive(Clone)]
pub struct Pipeline {
    predictor: Arc<dyn PricePredictor>,
    narrator: Arc<dyn TextGenerator>,
    chart_size: (u32, u32),
}

impl Pipeline {
    pub fn new(predictor: Arc<dyn PricePredictor>, narrator: Arc<dyn TextGenerator>) -> Self {
        Self {
            predictor,
            narrator,
            chart_size: (DEFAULT_WIDTH, DEFAULT_HEIGHT),
        }
    }

    pub fn with_chart_size(mut self, width: u32, height: u32) -> Self {
        self.chart_size = (width, height);
        self
    }

    /// Prediction failures abort the run. Narrative failures degrade, and
    /// chart/report failures are confined to [`PipelineOutput::report`]
    /// (or returned when only the chart was requested).
    pub async fn run(
        &self,
        record: &FeatureRecord,
        options: PipelineOptions,
    ) -> Result<PipelineOutput, PipelineError> {
        let options = options.normalized();
        let predictor = self.predictor.as_ref();

        let forecast = if options.forecast {
            Some(generate_forecast(predictor, record, record.year())?)
        } else {
            None
        };

        // The headline price is the forecast's base-year point whenever a
        // forecast exists, so the two can never disagree.
        let prediction = match &forecast {
            Some(series) => {
                let headline = PredictionResult::from_series(series);
                let check = predict_price(predictor, record)?;
                if check != headline {
                    tracing::warn!(
                        model = predictor.name(),
                        forecast = headline.price,
                        single = check.price,
                        "model is not deterministic; using the forecast's first point"
                    );
                }
                headline
            }
            None => predict_price(predictor, record)?,
        };
        tracing::info!(
            company = record.company(),
            year = record.year(),
            price = prediction.price,
            "predicted resale price"
        );

        let sell_before = match (&forecast, options.advisory) {
            (Some(series), true) => Some(select_best_sale_year(series)),
            _ => None,
        };

        let narrative = match (&forecast, options.narrative) {
            (Some(series), true) => {
                Some(explain(self.narrator.as_ref(), record, &prediction, series).await)
            }
            _ => None,
        };

        let chart = match (&forecast, options.chart) {
            (Some(series), true) => Some(render_chart(series, self.chart_size.0, self.chart_size.1)),
            _ => None,
        };

        let (chart_png, report) = match chart {
            None => (None, None),
            Some(Ok(png)) => {
                let report = options.report.then(|| {
                    let narrative = narrative
                        .clone()
                        .unwrap_or_else(|| Narrative::Unavailable("not requested".to_string()));
                    build_report(record, &prediction, &narrative, &png)
                });
                (Some(png), report)
            }
            Some(Err(e)) if options.report => {
                tracing::warn!("report aborted: {}", e);
                (None, Some(Err(PipelineError::Report(e.to_string()))))
            }
            Some(Err(e)) => return Err(e),
        };
        if let Some(Err(e)) = &report {
            tracing::warn!("report unavailable: {}", e);
        }

        Ok(PipelineOutput {
            prediction,
            forecast,
            sell_before,
            narrative,
            chart_png,
            report,
        })
    }
}
