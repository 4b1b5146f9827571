pub mod config;
pub mod node;
pub mod page;
pub mod render;
pub mod routes;
pub mod sensor;
pub mod state;
pub mod telemetry;
pub mod types;

pub use config::{ConfigError, HardwareConfig, NetworkConfig, NodeConfig, RuntimeConfig};
pub use node::{NodeAction, NodeEngine};
pub use page::{render_status_page, STATUS_PAGE_CONTENT_TYPE};
pub use render::{DisplayFrame, DisplayRenderer, MatrixFrame};
pub use routes::*;
pub use sensor::{
    MicrosClock, MonotonicClock, ProximitySample, RangingError, RangingMonitor, RangingTransition,
};
pub use state::DeviceState;
pub use telemetry::{AnalogSource, TelemetryReader, TemperatureCalibration};
pub use types::{Command, Flag, NodeStatus};
