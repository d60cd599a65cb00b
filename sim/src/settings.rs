use binutils::clap;

use crate::fixed::{bandpass_coefficients, Coefficients};

/// Configuration of one demodulator build.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub sample_rate: f64,
    pub upper_frequency: f64,
    pub lower_frequency: f64,
    pub filter_width: f64,
    pub baud_rate: f64,
    /// Fraction of the envelope level left after one bit time.
    pub decay_per_bit: f64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            sample_rate: 48000.0,
            upper_frequency: 1270.0,
            lower_frequency: 1070.0,
            filter_width: 100.0,
            baud_rate: 300.0,
            decay_per_bit: 0.5,
        }
    }
}

impl Settings {
    pub fn set_sample_rate(mut self, sample_rate: f64) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    pub fn set_upper_frequency(mut self, frequency: f64) -> Self {
        self.upper_frequency = frequency;
        self
    }

    pub fn set_lower_frequency(mut self, frequency: f64) -> Self {
        self.lower_frequency = frequency;
        self
    }

    pub fn set_filter_width(mut self, width: f64) -> Self {
        self.filter_width = width;
        self
    }

    pub fn set_baud_rate(mut self, baud_rate: f64) -> Self {
        self.baud_rate = baud_rate;
        self
    }

    pub fn set_decay_per_bit(mut self, decay: f64) -> Self {
        self.decay_per_bit = decay;
        self
    }

    pub fn samples_per_bit(&self) -> f64 {
        self.sample_rate / self.baud_rate
    }

    /// Per-sample envelope multiplier.
    pub fn decay(&self) -> f64 {
        (self.decay_per_bit.ln() / self.samples_per_bit()).exp()
    }

    pub fn upper_filter(&self) -> Coefficients {
        bandpass_coefficients(self.sample_rate, self.upper_frequency, self.filter_width)
    }

    pub fn lower_filter(&self) -> Coefficients {
        bandpass_coefficients(self.sample_rate, self.lower_frequency, self.filter_width)
    }
}

/// Command line overrides of [`Settings`], shared by the binaries.
#[derive(clap::Args, Debug, Clone, Default)]
pub struct SettingsArgs {
    /// Sample rate in Hz [default: 48000]
    #[arg(long)]
    pub sample_rate: Option<f64>,

    /// Upper (mark) tone in Hz [default: 1270]
    #[arg(long)]
    pub upper: Option<f64>,

    /// Lower (space) tone in Hz [default: 1070]
    #[arg(long)]
    pub lower: Option<f64>,

    /// Bandpass filter width in Hz [default: 100]
    #[arg(long)]
    pub width: Option<f64>,

    /// Bit rate [default: 300]
    #[arg(long)]
    pub baud: Option<f64>,

    /// Envelope level left after one bit time [default: 0.5]
    #[arg(long)]
    pub decay_per_bit: Option<f64>,
}

impl SettingsArgs {
    pub fn settings(&self) -> Settings {
        let mut settings = Settings::default();
        if let Some(v) = self.sample_rate {
            settings = settings.set_sample_rate(v);
        }
        if let Some(v) = self.upper {
            settings = settings.set_upper_frequency(v);
        }
        if let Some(v) = self.lower {
            settings = settings.set_lower_frequency(v);
        }
        if let Some(v) = self.width {
            settings = settings.set_filter_width(v);
        }
        if let Some(v) = self.baud {
            settings = settings.set_baud_rate(v);
        }
        if let Some(v) = self.decay_per_bit {
            settings = settings.set_decay_per_bit(v);
        }
        settings
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decay() {
        let settings = Settings::default();
        assert_eq!(settings.samples_per_bit(), 160.0);
        let per_bit = settings.decay().powf(settings.samples_per_bit());
        assert!((per_bit - 0.5).abs() < 1e-12);
        assert!(settings.decay() < 1.0);
    }

    #[test]
    fn test_builder() {
        let settings = Settings::default()
            .set_baud_rate(1200.0)
            .set_upper_frequency(2200.0)
            .set_lower_frequency(1200.0);
        assert_eq!(settings.samples_per_bit(), 40.0);
        assert!(settings.upper_filter().a1 != settings.lower_filter().a1);
    }

    #[test]
    fn test_args_override() {
        let args = SettingsArgs {
            baud: Some(600.0),
            ..Default::default()
        };
        let settings = args.settings();
        assert_eq!(settings.baud_rate, 600.0);
        assert_eq!(settings.sample_rate, 48000.0);
        assert_eq!(SettingsArgs::default().settings(), Settings::default());
    }
}
