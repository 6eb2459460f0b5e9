use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use crack_detect::{device_name, CrackClassifier, Device};
use log::info;

/// CLI app to run crack detection on an image
#[derive(Parser, Debug)]
#[command(name = "crack-classify")]
#[command(about = "Classify a concrete photo as cracked or not")]
struct CmdArgs {
    /// Path to the image to classify
    image: PathBuf,

    /// Path to the trained weights
    #[arg(long, default_value = "resnet18_trained.pth")]
    weights: PathBuf,

    /// Quantize the classification head to int8
    #[arg(long)]
    quantize: bool,

    /// Force CPU inference even when a GPU is available
    #[arg(long)]
    cpu: bool,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = CmdArgs::parse();

    let classifier = if args.cpu {
        CrackClassifier::load_with_device(&args.weights, Device::Cpu, args.quantize)
    } else {
        CrackClassifier::load(&args.weights, args.quantize)
    }?;
    info!("running on {}", device_name(classifier.device()));

    let bytes = std::fs::read(&args.image)
        .with_context(|| format!("could not read {}", args.image.display()))?;
    let filename = args.image.file_name().and_then(|n| n.to_str());

    let prediction = classifier.predict_bytes(filename, &bytes)?;

    println!("{}", serde_json::to_string_pretty(&prediction)?);

    Ok(())
}
