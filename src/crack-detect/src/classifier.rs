//! Classifier adapter.
//!
//! Owns the loaded ResNet-18 and its device placement. Weights come from a
//! torchvision-format state dict (`resnet18_trained.pth`); all layers are
//! frozen and the final linear layer is a 2-output binary head. The optional
//! quantized mode replaces that head with an int8 `QMatMul`, trading a small
//! accuracy shift for faster inference.

use std::path::Path;

use candle_core::quantized::{GgmlDType, QMatMul, QTensor};
use candle_core::{DType, Device, Module, Tensor, D};
use candle_nn::{Func, VarBuilder};
use candle_transformers::models::resnet;
use log::info;

use crate::error::Error;
use crate::prediction::Prediction;
use crate::preprocess::{preprocess, INPUT_HEIGHT, INPUT_WIDTH};
use crate::validate::validate_upload;
use crate::Timer;

pub const CLASS_NO_CRACK: usize = 0;
pub const CLASS_CRACK: usize = 1;

const NUM_CLASSES: usize = 2;
const FEATURE_DIM: usize = 512;

/// Prefer the GPU when one is present.
pub fn select_device() -> Device {
    Device::cuda_if_available(0).unwrap_or(Device::Cpu)
}

/// Device name as reported on the health endpoint.
pub fn device_name(device: &Device) -> &'static str {
    match device {
        Device::Cpu => "cpu",
        Device::Cuda(_) => "cuda",
        Device::Metal(_) => "metal",
    }
}

enum Net {
    Full(Func<'static>),
    QuantizedHead {
        backbone: Func<'static>,
        fc: QMatMul,
        fc_bias: Tensor,
    },
}

pub struct CrackClassifier {
    net: Net,
    device: Device,
    quantized: bool,
}

impl CrackClassifier {
    /// Load weights from `path` onto the automatically selected device.
    pub fn load(path: &Path, quantize: bool) -> Result<Self, Error> {
        Self::load_with_device(path, select_device(), quantize)
    }

    pub fn load_with_device(path: &Path, device: Device, quantize: bool) -> Result<Self, Error> {
        let mut t = Timer::new_start("Loading weights");

        let vb = VarBuilder::from_pth(path, DType::F32, &device).map_err(Error::model_load)?;
        let classifier = Self::from_var_builder(vb, device, quantize)?;

        t.stop();
        info!(
            "model loaded from {} on {} (quantized: {})",
            path.display(),
            device_name(&classifier.device),
            quantize
        );

        Ok(classifier)
    }

    /// Build the network from an already-open weight store. Shape mismatches
    /// against the architecture surface here as [`Error::ModelLoad`].
    pub fn from_var_builder(
        vb: VarBuilder<'static>,
        device: Device,
        quantize: bool,
    ) -> Result<Self, Error> {
        let net = if quantize {
            let backbone =
                resnet::resnet18_no_final_layer(vb.clone()).map_err(Error::model_load)?;
            let fc = vb.pp("fc");
            let weight = fc
                .get((NUM_CLASSES, FEATURE_DIM), "weight")
                .map_err(Error::model_load)?;
            let fc_bias = fc.get(NUM_CLASSES, "bias").map_err(Error::model_load)?;

            let qweight =
                QTensor::quantize(&weight, GgmlDType::Q8_0).map_err(Error::model_load)?;
            let fc = QMatMul::from_qtensor(qweight).map_err(Error::model_load)?;

            Net::QuantizedHead {
                backbone,
                fc,
                fc_bias,
            }
        } else {
            Net::Full(resnet::resnet18(NUM_CLASSES, vb).map_err(Error::model_load)?)
        };

        Ok(CrackClassifier {
            net,
            device,
            quantized: quantize,
        })
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn is_quantized(&self) -> bool {
        self.quantized
    }

    /// Forward pass over a preprocessed batch-of-one tensor.
    ///
    /// Returns the predicted class index and the softmax probabilities
    /// `[no_crack, crack]`. Candle builds no gradient graph for plain
    /// tensors, so this is a pure forward pass.
    pub fn infer(&self, input: &Tensor) -> Result<(usize, [f32; 2]), Error> {
        let expected = [1, 3, INPUT_HEIGHT, INPUT_WIDTH];
        if input.dims() != expected {
            return Err(Error::Inference(format!(
                "bad input shape {:?}, expected {:?}",
                input.dims(),
                expected
            )));
        }

        let logits = match &self.net {
            Net::Full(model) => model.forward(input),
            Net::QuantizedHead {
                backbone,
                fc,
                fc_bias,
            } => backbone
                .forward(input)
                .and_then(|features| fc.forward(&features))
                .and_then(|logits| logits.broadcast_add(fc_bias)),
        }
        .map_err(Error::inference)?;

        let probabilities = candle_nn::ops::softmax(&logits, D::Minus1)
            .and_then(|p| p.squeeze(0))
            .and_then(|p| p.to_vec1::<f32>())
            .map_err(Error::inference)?;

        let (no_crack, crack) = (probabilities[CLASS_NO_CRACK], probabilities[CLASS_CRACK]);
        let class = if crack >= no_crack {
            CLASS_CRACK
        } else {
            CLASS_NO_CRACK
        };

        Ok((class, [no_crack, crack]))
    }

    /// Full request pipeline: validate, preprocess, infer, format.
    ///
    /// Validation runs here even when the transport already checked the same
    /// limits.
    pub fn predict_bytes(&self, filename: Option<&str>, bytes: &[u8]) -> Result<Prediction, Error> {
        validate_upload(filename, bytes.len())?;

        let mut t = Timer::new_start("Preprocessing image");
        let tensor = preprocess(bytes, &self.device)?;
        t.stop();

        let mut t = Timer::new_start("Running inference");
        let (class, probabilities) = self.infer(&tensor)?;
        t.stop();

        let prediction = Prediction::from_probabilities(probabilities);
        info!(
            "predicted class {} with confidence {:.4}",
            class, prediction.confidence
        );

        Ok(prediction)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use image::{DynamicImage, ImageFormat};

    use super::*;
    use crate::error::ValidationError;
    use crate::prediction::Label;

    fn zeros_classifier(quantize: bool) -> CrackClassifier {
        let device = Device::Cpu;
        let vb = VarBuilder::zeros(DType::F32, &device);
        CrackClassifier::from_var_builder(vb, device, quantize).unwrap()
    }

    fn sample_png() -> Vec<u8> {
        let img = DynamicImage::ImageRgb8(image::RgbImage::from_fn(64, 64, |x, y| {
            image::Rgb([(x * 4) as u8, (y * 4) as u8, 128])
        }));
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .unwrap();
        buf
    }

    #[test]
    fn probabilities_form_a_distribution() {
        let classifier = zeros_classifier(false);
        let prediction = classifier
            .predict_bytes(Some("wall.png"), &sample_png())
            .unwrap();

        let sum = prediction.probabilities.crack + prediction.probabilities.no_crack;
        assert!((sum - 1.0).abs() < 1e-5, "sum {sum}");
        assert_eq!(
            prediction.confidence,
            prediction
                .probabilities
                .crack
                .max(prediction.probabilities.no_crack)
        );
        // Zero weights give zero logits, an exact tie, which goes to Crack.
        assert_eq!(prediction.prediction, Label::Crack);
    }

    #[test]
    fn quantized_head_stays_close_to_full_model() {
        let full = zeros_classifier(false);
        let quantized = zeros_classifier(true);
        assert!(quantized.is_quantized());

        let bytes = sample_png();
        let a = full.predict_bytes(Some("wall.png"), &bytes).unwrap();
        let b = quantized.predict_bytes(Some("wall.png"), &bytes).unwrap();

        assert!((a.probabilities.crack - b.probabilities.crack).abs() < 0.05);
        assert!((a.probabilities.no_crack - b.probabilities.no_crack).abs() < 0.05);
    }

    #[test]
    fn wrong_input_shape_is_an_inference_error() {
        let classifier = zeros_classifier(false);
        let bad = Tensor::zeros((1, 3, 224, 224), DType::F32, &Device::Cpu).unwrap();
        let err = classifier.infer(&bad).unwrap_err();
        assert!(matches!(err, Error::Inference(_)), "{err:?}");
    }

    #[test]
    fn pipeline_validates_before_decoding() {
        let classifier = zeros_classifier(false);

        let err = classifier.predict_bytes(None, &[]).unwrap_err();
        assert!(matches!(
            err,
            Error::Validation(ValidationError::NoFile)
        ));

        let err = classifier
            .predict_bytes(Some("clip.gif"), &sample_png())
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Validation(ValidationError::UnsupportedFormat)
        ));
    }

    #[test]
    fn garbage_bytes_with_valid_name_fail_as_decode() {
        let classifier = zeros_classifier(false);
        let err = classifier
            .predict_bytes(Some("wall.png"), b"not an image")
            .unwrap_err();
        assert!(matches!(err, Error::Decode(_)), "{err:?}");
    }

    #[test]
    fn missing_weight_file_is_a_model_load_error() {
        let err = CrackClassifier::load(Path::new("/nonexistent/resnet18_trained.pth"), false)
            .map(|_| ())
            .unwrap_err();
        assert!(matches!(err, Error::ModelLoad(_)), "{err:?}");
    }
}
