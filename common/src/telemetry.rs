use serde::{Deserialize, Serialize};

/// Linear sensor calibration: `t = ref_t - (v - ref_v) / slope`, where `v` is
/// the raw sample scaled by `vref / 2^bits`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TemperatureCalibration {
    pub vref_volts: f32,
    pub adc_bits: u8,
    pub reference_temp_c: f32,
    pub reference_volts: f32,
    pub slope_volts_per_c: f32,
}

impl Default for TemperatureCalibration {
    fn default() -> Self {
        Self {
            vref_volts: 3.3,
            adc_bits: 12,
            reference_temp_c: 27.0,
            reference_volts: 0.706,
            slope_volts_per_c: 0.001721,
        }
    }
}

impl TemperatureCalibration {
    pub fn linear_10mv_per_c(vref_volts: f32, adc_bits: u8) -> Self {
        Self {
            vref_volts,
            adc_bits,
            reference_temp_c: 0.0,
            reference_volts: 0.0,
            slope_volts_per_c: -0.010,
        }
    }

    pub fn volts_from_raw(&self, raw: u16) -> f32 {
        let full_scale = (1_u32 << self.adc_bits) as f32;
        raw as f32 * (self.vref_volts / full_scale)
    }

    pub fn celsius_from_raw(&self, raw: u16) -> f32 {
        let volts = self.volts_from_raw(raw);
        self.reference_temp_c - (volts - self.reference_volts) / self.slope_volts_per_c
    }

    pub fn sanitize(&mut self) {
        let defaults = Self::default();
        self.adc_bits = self.adc_bits.clamp(8, 16);
        if !self.vref_volts.is_finite() || self.vref_volts <= 0.0 {
            self.vref_volts = defaults.vref_volts;
        }
        if !self.slope_volts_per_c.is_finite() || self.slope_volts_per_c == 0.0 {
            self.slope_volts_per_c = defaults.slope_volts_per_c;
        }
        if !self.reference_temp_c.is_finite() {
            self.reference_temp_c = defaults.reference_temp_c;
        }
        if !self.reference_volts.is_finite() {
            self.reference_volts = defaults.reference_volts;
        }
    }
}

pub trait AnalogSource {
    type Error;

    fn read_raw(&mut self) -> Result<u16, Self::Error>;
}

pub struct TelemetryReader<A> {
    source: A,
    calibration: TemperatureCalibration,
}

impl<A: AnalogSource> TelemetryReader<A> {
    pub fn new(source: A, calibration: TemperatureCalibration) -> Self {
        Self {
            source,
            calibration,
        }
    }

    pub fn read_celsius(&mut self) -> Result<f32, A::Error> {
        let raw = self.source.read_raw()?;
        Ok(self.calibration.celsius_from_raw(raw))
    }
}
