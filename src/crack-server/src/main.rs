//! HTTP API server for concrete crack detection.
//!
//! One binary covers both deployment shapes: a local weight file loaded
//! eagerly at startup, or a remote object-storage artifact fetched lazily on
//! the first request.

mod routes;
mod state;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::http::HeaderValue;
use clap::Parser;
use crack_detect::{device_name, select_device};
use log::info;
use tower_http::cors::{Any, CorsLayer};

use crate::state::{AppState, WeightSource};

/// Origins always allowed so a local frontend works out of the box.
const LOCAL_ORIGINS: [&str; 2] = ["http://localhost:3000", "http://127.0.0.1:3000"];

/// HTTP API server for concrete crack detection
#[derive(Parser, Debug)]
#[command(name = "crack-server")]
#[command(about = "Serve crack/no-crack predictions for uploaded photos")]
struct Cli {
    /// Host to bind to
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// Port to listen on
    #[arg(short, long, default_value = "8000")]
    port: u16,

    /// Path to the trained weights, loaded eagerly at startup
    #[arg(long, env = "MODEL_WEIGHTS", default_value = "resnet18_trained.pth")]
    weights: PathBuf,

    /// Fetch the weights from this URL instead, lazily on the first request
    #[arg(long, env = "MODEL_WEIGHTS_URL")]
    weights_url: Option<String>,

    /// Object-storage bucket holding the weights; composes a URL with
    /// --weights-key and --weights-region
    #[arg(long, env = "MODEL_BUCKET")]
    weights_bucket: Option<String>,

    /// Object key inside the bucket
    #[arg(long, env = "MODEL_KEY", default_value = "resnet18_trained.pth")]
    weights_key: String,

    /// Object-storage region
    #[arg(long, env = "MODEL_REGION", default_value = "eu-west-1")]
    weights_region: String,

    /// Quantize the classification head to int8
    #[arg(long, env = "MODEL_QUANTIZE")]
    quantize: bool,

    /// Extra allowed CORS origins, comma separated
    #[arg(long, env = "ALLOWED_ORIGINS", value_delimiter = ',')]
    allowed_origins: Vec<String>,

    /// Upper bound on a single forward pass, in seconds
    #[arg(long, default_value = "30")]
    infer_timeout_secs: u64,
}

impl Cli {
    fn weight_source(&self) -> WeightSource {
        if let Some(url) = &self.weights_url {
            WeightSource::Remote(url.clone())
        } else if let Some(bucket) = &self.weights_bucket {
            WeightSource::Remote(format!(
                "https://{bucket}.s3.{}.amazonaws.com/{}",
                self.weights_region, self.weights_key
            ))
        } else {
            WeightSource::Local(self.weights.clone())
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let device = select_device();
    info!("using device: {}", device_name(&device));

    let source = cli.weight_source();
    let lazy = matches!(source, WeightSource::Remote(_));

    let state = Arc::new(AppState::new(
        source,
        device,
        cli.quantize,
        Duration::from_secs(cli.infer_timeout_secs),
    ));

    if lazy {
        info!("remote weight source configured; model loads on the first request");
    } else {
        // Eager variant: refuse to serve traffic without a model.
        state.classifier().await.context("model load failed")?;
    }

    let mut origins: Vec<HeaderValue> = Vec::new();
    for origin in LOCAL_ORIGINS
        .iter()
        .map(|s| s.to_string())
        .chain(cli.allowed_origins.iter().cloned())
    {
        let value = origin
            .parse()
            .with_context(|| format!("invalid CORS origin {origin:?}"))?;
        origins.push(value);
    }

    let cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = routes::router(state).layer(cors);

    let addr: SocketAddr = format!("{}:{}", cli.host, cli.port)
        .parse()
        .context("invalid bind address")?;
    info!("listening on http://{addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
