//! Exponentially weighted moving averages.

/// Age of the simple variant.
const SIMPLE_AGE: u32 = 30;

/// Samples averaged before a variable-age average starts reporting.
const WARMUP_SAMPLES: u8 = 10;

/// A time-decayed moving average over samples added at a fixed rate.
///
/// `age` is the number of samples the average roughly spans. Age zero and
/// age 30 give a simple average over 30 samples that adopts its first
/// sample as the value. Any other age warms up over [`WARMUP_SAMPLES`]
/// samples, reporting zero until then.
#[derive(Debug, Clone)]
pub struct Ewma {
    decay: f64,
    value: f64,
    /// `None` for the simple variant.
    warmup: Option<u8>,
}

impl Ewma {
    pub fn new(age: u32) -> Self {
        if age == 0 || age == SIMPLE_AGE {
            Self {
                decay: decay_for(SIMPLE_AGE as f64),
                value: 0.0,
                warmup: None,
            }
        } else {
            Self {
                decay: decay_for(age as f64),
                value: 0.0,
                warmup: Some(0),
            }
        }
    }

    pub fn add(&mut self, sample: f64) {
        match self.warmup {
            None => {
                if self.value == 0.0 {
                    self.value = sample;
                } else {
                    self.blend(sample);
                }
            }
            Some(count) if count < WARMUP_SAMPLES => {
                self.warmup = Some(count + 1);
                self.value += sample;
            }
            Some(count) if count == WARMUP_SAMPLES => {
                self.warmup = Some(count + 1);
                self.value /= WARMUP_SAMPLES as f64;
                self.blend(sample);
            }
            Some(_) => self.blend(sample),
        }
    }

    pub fn value(&self) -> f64 {
        match self.warmup {
            Some(count) if count <= WARMUP_SAMPLES => 0.0,
            _ => self.value,
        }
    }

    fn blend(&mut self, sample: f64) {
        self.value = sample * self.decay + self.value * (1.0 - self.decay);
    }
}

fn decay_for(age: f64) -> f64 {
    2.0 / (age + 1.0)
}
