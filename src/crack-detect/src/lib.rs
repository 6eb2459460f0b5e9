//! Concrete crack detection pipeline.
//!
//! Takes the raw bytes of an uploaded photograph, validates them, normalizes
//! them into the tensor shape the classifier was trained on and runs a frozen
//! ResNet-18 with a binary head over the result. The crate knows nothing
//! about HTTP; frontends feed it bytes and get a [`Prediction`] back.

use chrono::{DateTime, Duration, Utc};
use log::{debug, info};

pub use candle_core::{Device, Tensor};

mod classifier;
mod error;
mod prediction;
mod preprocess;
mod validate;

pub use classifier::{device_name, select_device, CrackClassifier, CLASS_CRACK, CLASS_NO_CRACK};
pub use error::{Error, ValidationError};
pub use prediction::{Label, Prediction, Probabilities};
pub use preprocess::{preprocess, IMAGENET_MEAN, IMAGENET_STD, INPUT_HEIGHT, INPUT_WIDTH};
pub use validate::{validate_filename, validate_size, validate_upload, MAX_UPLOAD_BYTES};

pub struct Timer {
    name: String,
    tstamp: Option<DateTime<Utc>>,
}

impl Timer {
    /// Create a new timer
    pub fn new(name: &str) -> Self {
        Timer {
            name: name.to_owned(),
            tstamp: None,
        }
    }

    pub fn new_start(name: &str) -> Self {
        let mut t = Timer::new(name);
        t.start();
        t
    }

    /// Start the timer
    pub fn start(&mut self) {
        debug!("{}: starting", self.name);

        self.tstamp = Some(Utc::now());
    }

    /// Stop the timer, logging the elapsed time
    pub fn stop(&mut self) {
        match self.tstamp.take() {
            None => debug!("{}: not running!", self.name),
            Some(tstamp) => {
                let d: Duration = Utc::now() - tstamp;
                info!("{} duration: {} msec", self.name, d.num_milliseconds());
            }
        }
    }
}
