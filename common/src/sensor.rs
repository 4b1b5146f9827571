use std::time::Instant;

use embedded_hal::{
    delay::DelayNs,
    digital::{Error as _, ErrorKind, InputPin, OutputPin},
};
use thiserror::Error;

pub const TRIGGER_PULSE_US: u32 = 10;
pub const US_PER_CM: f32 = 58.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RangingError {
    #[error("echo line never rose within {0} us")]
    EchoStartTimeout(u64),
    #[error("echo line never fell within {0} us")]
    EchoEndTimeout(u64),
    #[error("ranging pin error: {0:?}")]
    Pin(ErrorKind),
}

pub trait MicrosClock {
    fn now_us(&self) -> u64;
}

#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl MicrosClock for MonotonicClock {
    fn now_us(&self) -> u64 {
        self.origin
            .elapsed()
            .as_micros()
            .try_into()
            .unwrap_or(u64::MAX)
    }
}

pub fn pulse_to_cm(pulse_us: u64) -> f32 {
    pulse_us as f32 / US_PER_CM
}

pub fn measure_distance_cm<T, E, D, C>(
    trigger: &mut T,
    echo: &mut E,
    delay: &mut D,
    clock: &C,
    timeout_us: u64,
) -> Result<f32, RangingError>
where
    T: OutputPin,
    E: InputPin,
    D: DelayNs,
    C: MicrosClock,
{
    trigger.set_high().map_err(|err| RangingError::Pin(err.kind()))?;
    delay.delay_us(TRIGGER_PULSE_US);
    trigger.set_low().map_err(|err| RangingError::Pin(err.kind()))?;

    let armed_us = clock.now_us();
    while !echo.is_high().map_err(|err| RangingError::Pin(err.kind()))? {
        if clock.now_us().saturating_sub(armed_us) > timeout_us {
            return Err(RangingError::EchoStartTimeout(timeout_us));
        }
    }

    let start_us = clock.now_us();
    while echo.is_high().map_err(|err| RangingError::Pin(err.kind()))? {
        if clock.now_us().saturating_sub(start_us) > timeout_us {
            return Err(RangingError::EchoEndTimeout(timeout_us));
        }
    }
    let end_us = clock.now_us();

    Ok(pulse_to_cm(end_us.saturating_sub(start_us)))
}

pub fn read_dark<P: InputPin>(ldr: &mut P, dark_when_low: bool) -> Result<bool, RangingError> {
    let high = ldr.is_high().map_err(|err| RangingError::Pin(err.kind()))?;
    Ok(high != dark_when_low)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProximitySample {
    pub distance_cm: Option<f32>,
    pub dark: bool,
}

impl ProximitySample {
    pub fn new(distance_cm: Option<f32>, dark: bool) -> Self {
        Self { distance_cm, dark }
    }
}

pub fn should_illuminate(sample: ProximitySample, threshold_cm: f32) -> bool {
    match sample.distance_cm {
        Some(distance) => distance < threshold_cm && sample.dark,
        None => false,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangingTransition {
    Lost,
    Recovered,
}

/// An empty field reads as an end-edge timeout every cycle, so callers log
/// the edges between working and failing rather than every failure.
#[derive(Debug, Default)]
pub struct RangingMonitor {
    consecutive_failures: u64,
}

impl RangingMonitor {
    pub fn observe(&mut self, ok: bool) -> Option<RangingTransition> {
        let was_failing = self.consecutive_failures > 0;
        if ok {
            self.consecutive_failures = 0;
            was_failing.then_some(RangingTransition::Recovered)
        } else {
            self.consecutive_failures = self.consecutive_failures.saturating_add(1);
            (!was_failing).then_some(RangingTransition::Lost)
        }
    }

    pub fn consecutive_failures(&self) -> u64 {
        self.consecutive_failures
    }
}

#[cfg(test)]
mod tests {
    use std::{cell::Cell, convert::Infallible, rc::Rc};

    use embedded_hal::digital::ErrorType;
    use pretty_assertions::assert_eq;

    use super::*;

    struct SteppingClock {
        time: Rc<Cell<u64>>,
        step: u64,
    }

    impl MicrosClock for SteppingClock {
        fn now_us(&self) -> u64 {
            let now = self.time.get();
            self.time.set(now + self.step);
            now
        }
    }

    struct ScriptedEcho {
        time: Rc<Cell<u64>>,
        rise_at: Option<u64>,
        fall_at: Option<u64>,
    }

    impl ErrorType for ScriptedEcho {
        type Error = Infallible;
    }

    impl InputPin for ScriptedEcho {
        fn is_high(&mut self) -> Result<bool, Self::Error> {
            let now = self.time.get();
            let risen = self.rise_at.is_some_and(|rise| now >= rise);
            let fallen = self.fall_at.is_some_and(|fall| now >= fall);
            Ok(risen && !fallen)
        }

        fn is_low(&mut self) -> Result<bool, Self::Error> {
            self.is_high().map(|high| !high)
        }
    }

    #[derive(Default)]
    struct RecordingTrigger {
        edges: Vec<bool>,
    }

    impl ErrorType for RecordingTrigger {
        type Error = Infallible;
    }

    impl OutputPin for RecordingTrigger {
        fn set_low(&mut self) -> Result<(), Self::Error> {
            self.edges.push(false);
            Ok(())
        }

        fn set_high(&mut self) -> Result<(), Self::Error> {
            self.edges.push(true);
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingDelay {
        total_ns: u64,
    }

    impl DelayNs for RecordingDelay {
        fn delay_ns(&mut self, ns: u32) {
            self.total_ns += u64::from(ns);
        }
    }

    struct FixedLevel(bool);

    impl ErrorType for FixedLevel {
        type Error = Infallible;
    }

    impl InputPin for FixedLevel {
        fn is_high(&mut self) -> Result<bool, Self::Error> {
            Ok(self.0)
        }

        fn is_low(&mut self) -> Result<bool, Self::Error> {
            Ok(!self.0)
        }
    }

    fn rig(rise_at: Option<u64>, fall_at: Option<u64>, step: u64) -> (ScriptedEcho, SteppingClock) {
        let time = Rc::new(Cell::new(0));
        (
            ScriptedEcho {
                time: time.clone(),
                rise_at,
                fall_at,
            },
            SteppingClock { time, step },
        )
    }

    #[test]
    fn converts_pulse_width_to_centimeters() {
        let (mut echo, clock) = rig(Some(200), Some(200 + 580), 1);
        let mut trigger = RecordingTrigger::default();
        let mut delay = RecordingDelay::default();

        let distance =
            measure_distance_cm(&mut trigger, &mut echo, &mut delay, &clock, 30_000).unwrap();

        assert!((distance - 10.0).abs() < 0.1, "distance {distance}");
        assert_eq!(trigger.edges, vec![true, false]);
        assert_eq!(delay.total_ns, u64::from(TRIGGER_PULSE_US) * 1_000);
    }

    #[test]
    fn missing_echo_times_out_instead_of_blocking() {
        let (mut echo, clock) = rig(None, None, 10);
        let result = measure_distance_cm(
            &mut RecordingTrigger::default(),
            &mut echo,
            &mut RecordingDelay::default(),
            &clock,
            30_000,
        );

        assert_eq!(result, Err(RangingError::EchoStartTimeout(30_000)));
    }

    #[test]
    fn stuck_high_echo_times_out() {
        let (mut echo, clock) = rig(Some(50), None, 10);
        let result = measure_distance_cm(
            &mut RecordingTrigger::default(),
            &mut echo,
            &mut RecordingDelay::default(),
            &clock,
            30_000,
        );

        assert_eq!(result, Err(RangingError::EchoEndTimeout(30_000)));
    }

    #[test]
    fn ldr_polarity() {
        assert!(read_dark(&mut FixedLevel(false), true).unwrap());
        assert!(!read_dark(&mut FixedLevel(true), true).unwrap());
        assert!(read_dark(&mut FixedLevel(true), false).unwrap());
    }

    #[test]
    fn proximity_decision_table() {
        assert!(should_illuminate(ProximitySample::new(Some(10.0), true), 15.0));
        assert!(!should_illuminate(ProximitySample::new(Some(20.0), true), 15.0));
        assert!(!should_illuminate(ProximitySample::new(Some(10.0), false), 15.0));
        assert!(!should_illuminate(ProximitySample::new(Some(15.0), true), 15.0));
        assert!(!should_illuminate(ProximitySample::new(None, true), 15.0));
    }

    #[test]
    fn ranging_monitor_reports_edges_only() {
        let mut monitor = RangingMonitor::default();

        assert_eq!(monitor.observe(true), None);
        assert_eq!(monitor.observe(false), Some(RangingTransition::Lost));
        for _ in 0..50 {
            assert_eq!(monitor.observe(false), None);
        }
        assert_eq!(monitor.consecutive_failures(), 51);

        assert_eq!(monitor.observe(true), Some(RangingTransition::Recovered));
        assert_eq!(monitor.observe(true), None);
        assert_eq!(monitor.consecutive_failures(), 0);
    }

    #[test]
    fn failing_from_boot_is_reported_once() {
        let mut monitor = RangingMonitor::default();

        assert_eq!(monitor.observe(false), Some(RangingTransition::Lost));
        assert_eq!(monitor.observe(false), None);
    }
}
