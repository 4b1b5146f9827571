use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::telemetry::TemperatureCalibration;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid runtime config json: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub proximity_threshold_cm: f32,
    pub echo_timeout_us: u64,
    pub display_dwell_ms: u64,
    pub loop_interval_ms: u64,
    pub ldr_dark_when_low: bool,
    pub temperature: TemperatureCalibration,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            proximity_threshold_cm: 15.0,
            echo_timeout_us: 30_000,
            display_dwell_ms: 2_000,
            loop_interval_ms: 100,
            ldr_dark_when_low: true,
            temperature: TemperatureCalibration::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct HardwareConfig {
    pub matrix_pin: i32,
    pub rmt_channel: u8,
    pub trigger_pin: i32,
    pub echo_pin: i32,
    pub ldr_pin: i32,
    pub front_red_pin: i32,
    pub front_green_pin: i32,
    pub front_blue_pin: i32,
    pub indicator_pin: i32,
    pub i2c_sda_pin: i32,
    pub i2c_scl_pin: i32,
    pub i2c_baudrate_khz: u32,
    pub display_address: u8,
}

impl Default for HardwareConfig {
    fn default() -> Self {
        Self {
            matrix_pin: 7,
            rmt_channel: 0,
            trigger_pin: 8,
            echo_pin: 9,
            ldr_pin: 16,
            front_red_pin: 13,
            front_green_pin: 11,
            front_blue_pin: 12,
            indicator_pin: 2,
            i2c_sda_pin: 14,
            i2c_scl_pin: 15,
            i2c_baudrate_khz: 400,
            display_address: 0x3C,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub wifi_ssid: String,
    pub wifi_pass: String,
    pub wifi_connect_timeout_ms: u64,
    pub http_port: u16,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            wifi_ssid: String::new(),
            wifi_pass: String::new(),
            wifi_connect_timeout_ms: 20_000,
            http_port: 80,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default)]
    pub node: NodeConfig,
    #[serde(default)]
    pub hardware: HardwareConfig,
    #[serde(default)]
    pub network: NetworkConfig,
}

impl RuntimeConfig {
    pub fn from_json(raw: &[u8]) -> Result<Self, ConfigError> {
        let mut config: RuntimeConfig = serde_json::from_slice(raw)?;
        config.sanitize();
        Ok(config)
    }

    pub fn sanitize(&mut self) {
        self.node.sanitize();
        self.hardware.sanitize();
        self.network.sanitize();
    }
}

impl NodeConfig {
    pub fn sanitize(&mut self) {
        if !self.proximity_threshold_cm.is_finite() {
            self.proximity_threshold_cm = 15.0;
        }
        self.proximity_threshold_cm = self.proximity_threshold_cm.clamp(2.0, 400.0);
        self.echo_timeout_us = self.echo_timeout_us.clamp(1_000, 60_000);
        self.display_dwell_ms = self.display_dwell_ms.min(30_000);
        self.loop_interval_ms = self.loop_interval_ms.clamp(10, 5_000);
        self.temperature.sanitize();
    }
}

impl HardwareConfig {
    pub fn sanitize(&mut self) {
        let defaults = Self::default();
        let pins = [
            (&mut self.matrix_pin, defaults.matrix_pin),
            (&mut self.trigger_pin, defaults.trigger_pin),
            (&mut self.echo_pin, defaults.echo_pin),
            (&mut self.ldr_pin, defaults.ldr_pin),
            (&mut self.front_red_pin, defaults.front_red_pin),
            (&mut self.front_green_pin, defaults.front_green_pin),
            (&mut self.front_blue_pin, defaults.front_blue_pin),
            (&mut self.indicator_pin, defaults.indicator_pin),
            (&mut self.i2c_sda_pin, defaults.i2c_sda_pin),
            (&mut self.i2c_scl_pin, defaults.i2c_scl_pin),
        ];
        for (pin, default) in pins {
            if *pin < 0 {
                *pin = default;
            }
        }

        if self.rmt_channel > 7 {
            self.rmt_channel = 0;
        }

        self.i2c_baudrate_khz = self.i2c_baudrate_khz.clamp(100, 1_000);
        if !(0x08..=0x77).contains(&self.display_address) {
            self.display_address = defaults.display_address;
        }
    }
}

impl NetworkConfig {
    pub fn sanitize(&mut self) {
        if self.http_port == 0 {
            self.http_port = 80;
        }
        self.wifi_connect_timeout_ms = self.wifi_connect_timeout_ms.clamp(1_000, 120_000);
    }
}
