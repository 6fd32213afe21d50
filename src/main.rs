use anyhow::Context;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use resale_predictor::{
    config::Config,
    model, model_store,
    narrative::{Disabled, GeminiClient, TextGenerator},
    server::{self, AppState},
    CarForm, Pipeline,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,resale_predictor=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cfg = Config::from_env().context("invalid configuration")?;

    let mdl = model_store::get_or_try_init(|| model::load_predictor(&cfg))?;
    // Warmup so a bad artifact fails at start-up rather than on the first request
    let warm = CarForm::default().validate()?;
    let price = mdl.predict(&warm).context("warmup prediction failed")?;
    tracing::info!("loaded {} model from {}; warmup price {:.2}", mdl.name(), cfg.model_path, price);

    let narrator: Arc<dyn TextGenerator> = match &cfg.gemini {
        Some(g) => {
            tracing::info!("narrative via {} at {}", g.model, g.base_url);
            Arc::new(GeminiClient::new(
                g.api_key.clone(),
                g.base_url.clone(),
                g.model.clone(),
                cfg.narrative_timeout,
            )?)
        }
        None => {
            tracing::warn!("GOOGLE_API_KEY not set; narrative disabled");
            Arc::new(Disabled)
        }
    };

    let pipeline = Pipeline::new(mdl, narrator).with_chart_size(cfg.chart_width, cfg.chart_height);
    let app = server::router(AppState {
        pipeline: Arc::new(pipeline),
    });

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], cfg.port));
    tracing::info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
