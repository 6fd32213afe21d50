/// Integration tests for the prediction pipeline against the bundled model
///
/// Run with: cargo test --test pipeline_integration -- --nocapture

use async_trait::async_trait;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use printpdf::lopdf::Document;
use resale_predictor::{
    forecast::{generate_forecast, predict_price, select_best_sale_year},
    narrative::NarrativeError,
    report::{layout_report, Block},
    types::FIELD_LABELS,
    CarForm, FeatureRecord, LinearModel, ModelError, Narrative, Pipeline, PipelineError,
    PipelineOptions, PricePredictor, TextGenerator,
};

const MODEL: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/models/car_price_lr.json");

fn bundled_model() -> Arc<LinearModel> {
    Arc::new(LinearModel::from_path(MODEL).expect("bundled model should load"))
}

struct Canned;

#[async_trait]
impl TextGenerator for Canned {
    async fn generate(&self, _prompt: &str) -> Result<String, NarrativeError> {
        Ok("Well kept petrol hatchback.\n\nDemand stays steady.\nSell within two years.".to_string())
    }
}

struct Offline;

#[async_trait]
impl TextGenerator for Offline {
    async fn generate(&self, _prompt: &str) -> Result<String, NarrativeError> {
        Err(NarrativeError::Malformed("connection reset".to_string()))
    }
}

/// Wraps a predictor and counts calls.
struct Counting<P> {
    inner: P,
    calls: AtomicUsize,
}

impl<P: PricePredictor> PricePredictor for Counting<P> {
    fn predict(&self, record: &FeatureRecord) -> Result<f64, ModelError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.predict(record)
    }

    fn name(&self) -> &str {
        "counting"
    }
}

fn maruti() -> FeatureRecord {
    CarForm::default().validate().unwrap()
}

#[tokio::test]
async fn test_end_to_end_maruti_2014() {
    println!("\n=== Test: End-to-end Maruti 2014 ===");
    let pipeline = Pipeline::new(bundled_model(), Arc::new(Canned));
    let out = pipeline.run(&maruti(), PipelineOptions::full()).await.unwrap();

    let series = out.forecast.expect("forecast requested");
    assert_eq!(series.years(), (2014..=2019).collect::<Vec<_>>());
    println!("✓ Forecast: {:?}", series.as_pairs());

    let price = out.prediction.price;
    assert!(price >= 0.0, "price should be non-negative, got {}", price);
    assert_eq!((price * 100.0).round() / 100.0, price, "price should have 2 decimals");

    let year = out.sell_before.expect("advisory requested");
    assert!((2014..=2019).contains(&year));
    println!("✓ Predicted ₹ {} Lakhs, sell before {}", price, year);

    assert_eq!(
        out.narrative,
        Some(Narrative::Available(
            "Well kept petrol hatchback.\nDemand stays steady.\nSell within two years.".to_string()
        ))
    );
    let pdf = out.report.expect("report requested").expect("report should build");
    assert!(pdf.starts_with(b"%PDF"));
    println!("✓ Report: {} bytes", pdf.len());
}

#[test]
fn test_prediction_agrees_with_first_forecast_point() {
    println!("\n=== Test: Prediction/forecast consistency ===");
    let model = bundled_model();
    let record = maruti();
    let single = predict_price(model.as_ref(), &record).unwrap();
    let series = generate_forecast(model.as_ref(), &record, record.year()).unwrap();
    assert_eq!(single.price, series.first().price);
    assert_eq!(single.year, series.start_year());
    println!("✓ Both give {}", single.price);
}

#[test]
fn test_forecast_is_idempotent() {
    let model = bundled_model();
    let record = CarForm {
        company: "Honda".to_string(),
        year: 2018,
        fuel_type: "Diesel".to_string(),
        owner: 1,
        ..CarForm::default()
    }
    .validate()
    .unwrap();

    let a = generate_forecast(model.as_ref(), &record, 2018).unwrap();
    let b = generate_forecast(model.as_ref(), &record, 2018).unwrap();
    assert_eq!(a, b);
    assert_eq!(select_best_sale_year(&a), select_best_sale_year(&b));
    // Forecast steps may run past the form's year bound.
    assert_eq!(a.years().last(), Some(&2023));
}

#[tokio::test]
async fn test_narrative_outage_still_yields_report() {
    println!("\n=== Test: Narrative outage ===");
    let pipeline = Pipeline::new(bundled_model(), Arc::new(Offline));
    let out = pipeline.run(&maruti(), PipelineOptions::full()).await.unwrap();

    assert!(matches!(out.narrative, Some(Narrative::Unavailable(_))));
    let pdf = out.report.unwrap().unwrap();
    assert!(pdf.starts_with(b"%PDF"));
    println!("✓ Report still produced ({} bytes)", pdf.len());
}

#[tokio::test]
async fn test_invalid_fuel_type_never_reaches_model() {
    let model = Arc::new(Counting {
        inner: LinearModel::from_path(MODEL).unwrap(),
        calls: AtomicUsize::new(0),
    });
    let form = CarForm {
        fuel_type: "Electric".to_string(),
        ..CarForm::default()
    };

    let err = form.validate().unwrap_err();
    assert!(err.is_invalid_input());
    assert_eq!(model.calls.load(Ordering::SeqCst), 0);

    // Valid input: one call per forecast year plus the agreement check
    let pipeline = Pipeline::new(model.clone(), Arc::new(Canned));
    pipeline
        .run(&maruti(), PipelineOptions { forecast: true, ..PipelineOptions::default() })
        .await
        .unwrap();
    assert_eq!(model.calls.load(Ordering::SeqCst), 7);
}

#[tokio::test]
async fn test_unknown_company_aborts_request() {
    let record = CarForm {
        company: "Trabant".to_string(),
        ..CarForm::default()
    }
    .validate()
    .expect("company is free text at the form boundary");

    let pipeline = Pipeline::new(bundled_model(), Arc::new(Canned));
    let err = pipeline
        .run(&record, PipelineOptions::full())
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::Prediction(ref m) if m.contains("Trabant")));
}

#[tokio::test]
async fn test_report_contains_labels_and_price() {
    let pipeline = Pipeline::new(bundled_model(), Arc::new(Canned));
    let record = maruti();
    let out = pipeline.run(&record, PipelineOptions::full()).await.unwrap();

    let blocks = layout_report(
        &record,
        &out.prediction,
        out.narrative.as_ref().unwrap(),
        out.chart_png.as_deref().unwrap(),
    )
    .unwrap();
    let text: Vec<String> = blocks.iter().filter_map(Block::text).collect();
    let joined = text.join("\n");
    for label in FIELD_LABELS {
        assert!(joined.contains(label), "missing label {}", label);
    }
    assert!(joined.contains(&format!("{:.2}", out.prediction.price)));
    assert_eq!(blocks.iter().filter(|b| matches!(b, Block::Image { .. })).count(), 1);

    // The rendered bytes carry the same text
    let pdf = out.report.unwrap().unwrap();
    let doc = Document::load_mem(&pdf).unwrap();
    let pages: Vec<u32> = doc.get_pages().keys().copied().collect();
    let rendered = doc.extract_text(&pages).unwrap();
    for label in FIELD_LABELS {
        assert!(rendered.contains(&format!("{}:", label)), "PDF lacks label {}", label);
    }
    assert!(rendered.contains(&format!("Rs. {:.2} Lakhs", out.prediction.price)));
    assert!(rendered.contains("Sell within two years."));
    println!("✓ PDF text: {} chars", rendered.len());
}
