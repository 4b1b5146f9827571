use core::convert::TryInto;
use std::{
    sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError},
    thread,
    time::{Duration, Instant},
};

use anyhow::{anyhow, Context};
use embedded_svc::{
    http::Method,
    io::Write,
    wifi::{AuthMethod, ClientConfiguration, Configuration},
};
use esp_idf_hal::{
    adc::{
        attenuation::DB_11,
        oneshot::{config::AdcChannelConfig, AdcChannelDriver, AdcDriver},
        ADC1,
    },
    delay::Ets,
    gpio::{AnyIOPin, AnyInputPin, AnyOutputPin, Gpio34, Input, Output, PinDriver},
    i2c::{I2cConfig, I2cDriver, I2C0},
    units::FromValueType,
};
use esp_idf_svc::{
    eventloop::EspSystemEventLoop,
    hal::{modem::Modem, prelude::Peripherals, rmt::RMT},
    http::server::{Configuration as HttpConfiguration, EspHttpServer},
    log::EspLogger,
    nvs::EspDefaultNvsPartition,
    sys::EspError,
    wifi::{BlockingWifi, EspWifi},
};
use log::{debug, info, warn};

use homenode_common::{
    config::{HardwareConfig, NetworkConfig},
    render_status_page,
    sensor::{measure_distance_cm, read_dark, RangingMonitor, RangingTransition},
    AnalogSource, MonotonicClock, NodeAction, NodeEngine, ProximitySample,
    RuntimeConfig, TelemetryReader, TemperatureCalibration, STATUS_PAGE_CONTENT_TYPE,
};

use crate::{matrix::LedMatrix, oled::StatusDisplay};

const WATCHDOG_TIMEOUT_SEC: u32 = 30;
const WIFI_RETRY_DELAY_MS: u64 = 3_000;
const DIAGNOSTICS_EVERY_TICKS: u64 = 600;
const ADC_DB11_FULL_SCALE_VOLTS: f32 = 3.1;

type TemperatureChannel = AdcChannelDriver<'static, Gpio34, AdcDriver<'static, ADC1>>;

struct TemperatureAdc {
    channel: TemperatureChannel,
}

impl AnalogSource for TemperatureAdc {
    type Error = EspError;

    fn read_raw(&mut self) -> Result<u16, Self::Error> {
        self.channel.read_raw()
    }
}

struct FrontLights {
    red: PinDriver<'static, AnyOutputPin, Output>,
    green: PinDriver<'static, AnyOutputPin, Output>,
    blue: PinDriver<'static, AnyOutputPin, Output>,
}

impl FrontLights {
    fn set(&mut self, on: bool) -> Result<(), EspError> {
        for pin in [&mut self.red, &mut self.green, &mut self.blue] {
            if on {
                pin.set_high()?;
            } else {
                pin.set_low()?;
            }
        }
        Ok(())
    }
}

struct Outputs {
    front: FrontLights,
    indicator: PinDriver<'static, AnyOutputPin, Output>,
    matrix: LedMatrix,
    display: Option<StatusDisplay>,
}

struct ProximitySensors {
    trigger: PinDriver<'static, AnyOutputPin, Output>,
    echo: PinDriver<'static, AnyInputPin, Input>,
    ldr: PinDriver<'static, AnyInputPin, Input>,
    delay: Ets,
    clock: MonotonicClock,
}

#[derive(Clone)]
struct SharedState {
    engine: Arc<Mutex<NodeEngine>>,
    outputs: Arc<Mutex<Outputs>>,
    telemetry: Arc<Mutex<TelemetryReader<TemperatureAdc>>>,
}

pub fn run() -> anyhow::Result<()> {
    esp_idf_svc::sys::link_patches();
    EspLogger::initialize_default();

    let sys_loop = EspSystemEventLoop::take()?;
    let nvs_partition = EspDefaultNvsPartition::take()?;

    let mut runtime = RuntimeConfig::default();
    apply_board_profile(&mut runtime);
    runtime.sanitize();
    ensure_wifi_defaults(&mut runtime);

    let peripherals = Peripherals::take()?;
    let Peripherals {
        modem,
        rmt,
        i2c0,
        adc1,
        pins,
        ..
    } = peripherals;

    let hardware = &runtime.hardware;
    let outputs = Outputs {
        front: FrontLights {
            red: output_pin(hardware.front_red_pin)?,
            green: output_pin(hardware.front_green_pin)?,
            blue: output_pin(hardware.front_blue_pin)?,
        },
        indicator: output_pin(hardware.indicator_pin)?,
        matrix: match init_led_matrix(rmt, hardware) {
            Ok(matrix) => {
                info!(
                    "LED matrix initialized on RMT channel{} / GPIO{}",
                    hardware.rmt_channel, hardware.matrix_pin
                );
                matrix
            }
            Err(err) => {
                warn!("failed to initialize LED matrix, running disabled: {err:#}");
                LedMatrix::disabled()
            }
        },
        display: match init_status_display(i2c0, hardware) {
            Ok(display) => Some(display),
            Err(err) => {
                warn!("status display unavailable: {err:#}");
                None
            }
        },
    };

    let mut sensors = ProximitySensors {
        trigger: output_pin(hardware.trigger_pin)?,
        echo: input_pin(hardware.echo_pin)?,
        ldr: input_pin(hardware.ldr_pin)?,
        delay: Ets,
        clock: MonotonicClock::new(),
    };

    let adc = AdcDriver::new(adc1)?;
    let adc_config = AdcChannelConfig {
        attenuation: DB_11,
        ..Default::default()
    };
    let channel = AdcChannelDriver::new(adc, pins.gpio34, &adc_config)?;

    let engine = NodeEngine::new(runtime.node.clone());
    let boot_actions = engine.boot_actions();
    let shared_state = SharedState {
        engine: Arc::new(Mutex::new(engine)),
        outputs: Arc::new(Mutex::new(outputs)),
        telemetry: Arc::new(Mutex::new(TelemetryReader::new(
            TemperatureAdc { channel },
            runtime.node.temperature,
        ))),
    };
    execute_node_actions(&shared_state, boot_actions);

    let wifi = connect_wifi(modem, sys_loop, nvs_partition, &runtime.network)
        .context("wifi startup failed")?;

    init_watchdog(WATCHDOG_TIMEOUT_SEC)?;

    let server = create_http_server(shared_state.clone(), &runtime.network)?;
    info!("HTTP server listening on port {}", runtime.network.http_port);

    // Keep services alive for the program lifetime.
    let _wifi = wifi;
    let _server = server;

    run_control_loop(&shared_state, &mut sensors, &runtime)
}

/// GPIO6..=11 carry the SPI flash on ESP32 modules, so the ranging and
/// matrix lines move to free pins. I2C follows the Arduino-style 21/22 pair.
/// The ESP32 has no ADC-readable die sensor; temperature comes from an
/// LM35 on GPIO34, read at 11 dB attenuation.
fn apply_board_profile(runtime: &mut RuntimeConfig) {
    runtime.node.temperature =
        TemperatureCalibration::linear_10mv_per_c(ADC_DB11_FULL_SCALE_VOLTS, 12);

    let hardware = &mut runtime.hardware;
    hardware.matrix_pin = 18;
    hardware.trigger_pin = 25;
    hardware.echo_pin = 26;
    hardware.ldr_pin = 27;
    hardware.front_red_pin = 13;
    hardware.front_green_pin = 32;
    hardware.front_blue_pin = 33;
    hardware.i2c_sda_pin = 21;
    hardware.i2c_scl_pin = 22;
}

fn ensure_wifi_defaults(runtime: &mut RuntimeConfig) {
    if runtime.network.wifi_ssid.is_empty() {
        if let Some(ssid) = option_env!("WIFI_SSID") {
            runtime.network.wifi_ssid = ssid.to_string();
        }
    }

    if runtime.network.wifi_pass.is_empty() {
        if let Some(pass) = option_env!("WIFI_PASS") {
            runtime.network.wifi_pass = pass.to_string();
        }
    }
}

fn create_http_server(
    state: SharedState,
    network: &NetworkConfig,
) -> anyhow::Result<EspHttpServer<'static>> {
    let conf = HttpConfiguration {
        stack_size: 10 * 1024,
        http_port: network.http_port,
        uri_match_wildcard: true,
        ..Default::default()
    };

    let mut server = EspHttpServer::new(&conf)?;

    for (method, method_name) in [(Method::Get, "GET"), (Method::Post, "POST")] {
        let state = state.clone();
        server.fn_handler::<anyhow::Error, _>("/*", method, move |req| {
            let uri = req.uri().to_string();
            let command = {
                let mut engine = lock(&state.engine);
                let (command, actions) = engine.handle_request(method_name, &uri);
                execute_node_actions(&state, actions);
                command
            };
            info!("request {method_name} {uri} -> {}", command.as_str());

            let temperature_c = match lock(&state.telemetry).read_celsius() {
                Ok(celsius) => Some(celsius),
                Err(err) => {
                    warn!("temperature read failed: {err}");
                    None
                }
            };
            let page = render_status_page(temperature_c);

            req.into_response(200, Some("OK"), &[("Content-Type", STATUS_PAGE_CONTENT_TYPE)])?
                .write_all(page.as_bytes())?;
            Ok(())
        })?;
    }

    Ok(server)
}

fn run_control_loop(
    state: &SharedState,
    sensors: &mut ProximitySensors,
    runtime: &RuntimeConfig,
) -> anyhow::Result<()> {
    if let Err(err) = add_current_task_to_watchdog() {
        warn!("failed to register control loop with watchdog: {err:#}");
    }

    let node = &runtime.node;
    let interval = Duration::from_millis(node.loop_interval_ms);
    let mut ticks: u64 = 0;
    let mut ranging = RangingMonitor::default();

    loop {
        feed_watchdog();
        ticks = ticks.wrapping_add(1);

        let reading = measure_distance_cm(
            &mut sensors.trigger,
            &mut sensors.echo,
            &mut sensors.delay,
            &sensors.clock,
            node.echo_timeout_us,
        );
        let failures = ranging.consecutive_failures();
        match (ranging.observe(reading.is_ok()), &reading) {
            (Some(RangingTransition::Lost), Err(err)) => {
                warn!("ultrasonic ranging lost: {err}");
            }
            (Some(RangingTransition::Recovered), _) => {
                info!("ultrasonic ranging recovered after {failures} failed reads");
            }
            (_, Err(err)) => debug!("ultrasonic ranging: {err}"),
            _ => {}
        }
        let distance_cm = reading.ok();
        let dark = read_dark(&mut sensors.ldr, node.ldr_dark_when_low).unwrap_or_else(|err| {
            warn!("LDR read failed: {err}");
            false
        });

        let sample = ProximitySample::new(distance_cm, dark);
        {
            let mut engine = lock(&state.engine);
            let actions = engine.tick(monotonic_ms(), sample);
            execute_node_actions(state, actions);
        }

        if ticks % DIAGNOSTICS_EVERY_TICKS == 0 {
            log_diagnostics(state);
        }

        thread::sleep(interval);
    }
}

fn log_diagnostics(state: &SharedState) {
    let status = lock(&state.engine).status();
    match serde_json::to_string(&status) {
        Ok(body) => info!("node status {body}"),
        Err(err) => warn!("node status serialization failed: {err}"),
    }

    let outputs = lock(&state.outputs);
    let matrix = &outputs.matrix;
    info!(
        "matrix frames written={} failed={} last_error={:?}",
        matrix.written_frames(),
        matrix.failed_frames(),
        matrix.last_error()
    );
}

fn execute_node_actions(state: &SharedState, actions: Vec<NodeAction>) {
    let mut outputs = lock(&state.outputs);
    for action in actions {
        let result = match action {
            NodeAction::SetFrontLights(on) => outputs
                .front
                .set(on)
                .context("failed to drive front lights"),
            NodeAction::SetIndicator(on) => {
                info!("indicator LED {}", if on { "on" } else { "off" });
                let result = if on {
                    outputs.indicator.set_high()
                } else {
                    outputs.indicator.set_low()
                };
                result.context("failed to drive indicator LED")
            }
            NodeAction::WriteMatrix(frame) => outputs.matrix.write_frame(&frame),
            NodeAction::DrawDisplay(frame) => match outputs.display.as_mut() {
                Some(display) => display.draw(frame),
                None => Ok(()),
            },
        };

        if let Err(err) = result {
            warn!("output action failed: {err:#}");
        }
    }
}

fn output_pin(pin: i32) -> anyhow::Result<PinDriver<'static, AnyOutputPin, Output>> {
    let mut driver = unsafe { PinDriver::output(AnyOutputPin::new(pin)) }
        .with_context(|| format!("failed to claim GPIO{pin} as output"))?;
    driver.set_low()?;
    Ok(driver)
}

fn input_pin(pin: i32) -> anyhow::Result<PinDriver<'static, AnyInputPin, Input>> {
    unsafe { PinDriver::input(AnyInputPin::new(pin)) }
        .with_context(|| format!("failed to claim GPIO{pin} as input"))
}

fn init_led_matrix(rmt: RMT, hardware: &HardwareConfig) -> anyhow::Result<LedMatrix> {
    let pin = hardware.matrix_pin;

    match hardware.rmt_channel {
        0 => unsafe { LedMatrix::new(rmt.channel0, AnyOutputPin::new(pin)) },
        1 => unsafe { LedMatrix::new(rmt.channel1, AnyOutputPin::new(pin)) },
        2 => unsafe { LedMatrix::new(rmt.channel2, AnyOutputPin::new(pin)) },
        3 => unsafe { LedMatrix::new(rmt.channel3, AnyOutputPin::new(pin)) },
        #[cfg(any(esp32, esp32s3))]
        4 => unsafe { LedMatrix::new(rmt.channel4, AnyOutputPin::new(pin)) },
        #[cfg(any(esp32, esp32s3))]
        5 => unsafe { LedMatrix::new(rmt.channel5, AnyOutputPin::new(pin)) },
        #[cfg(any(esp32, esp32s3))]
        6 => unsafe { LedMatrix::new(rmt.channel6, AnyOutputPin::new(pin)) },
        #[cfg(any(esp32, esp32s3))]
        7 => unsafe { LedMatrix::new(rmt.channel7, AnyOutputPin::new(pin)) },
        _ => Err(anyhow!("unsupported RMT channel: {}", hardware.rmt_channel)),
    }
}

fn init_status_display(i2c0: I2C0, hardware: &HardwareConfig) -> anyhow::Result<StatusDisplay> {
    let i2c_config = I2cConfig::new().baudrate(hardware.i2c_baudrate_khz.kHz().into());
    let i2c = unsafe {
        I2cDriver::new(
            i2c0,
            AnyIOPin::new(hardware.i2c_sda_pin),
            AnyIOPin::new(hardware.i2c_scl_pin),
            &i2c_config,
        )
    }
    .context("failed to init I2C bus")?;

    let display = StatusDisplay::new(i2c, hardware.display_address)?;
    info!(
        "status display initialized at I2C address {:#04x}",
        hardware.display_address
    );
    Ok(display)
}

fn connect_wifi(
    modem: Modem,
    sys_loop: EspSystemEventLoop,
    nvs_partition: EspDefaultNvsPartition,
    network: &NetworkConfig,
) -> anyhow::Result<Box<EspWifi<'static>>> {
    let mut esp_wifi = Box::new(EspWifi::new(modem, sys_loop.clone(), Some(nvs_partition))?);
    let mut wifi = BlockingWifi::wrap(esp_wifi.as_mut(), sys_loop)?;

    if network.wifi_ssid.trim().is_empty() {
        return Err(anyhow!("wifi credentials missing"));
    }

    let auth_method = if network.wifi_pass.is_empty() {
        AuthMethod::None
    } else {
        AuthMethod::WPAWPA2Personal
    };

    wifi.set_configuration(&Configuration::Client(ClientConfiguration {
        ssid: network
            .wifi_ssid
            .as_str()
            .try_into()
            .map_err(|_| anyhow!("wifi ssid too long"))?,
        password: network
            .wifi_pass
            .as_str()
            .try_into()
            .map_err(|_| anyhow!("wifi password too long"))?,
        auth_method,
        ..Default::default()
    }))?;

    wifi.start()?;
    info!("wifi started, connecting to `{}`", network.wifi_ssid);

    let started_ms = monotonic_ms();
    let mut attempt = 0_u32;
    loop {
        attempt += 1;
        info!("wifi connect attempt {attempt}");
        let result = wifi.connect().and_then(|()| wifi.wait_netif_up());
        match result {
            Ok(()) => break,
            Err(err) => warn!("wifi connect failed on attempt {attempt}: {err:#}"),
        }

        let elapsed_ms = monotonic_ms().saturating_sub(started_ms);
        if elapsed_ms + WIFI_RETRY_DELAY_MS >= network.wifi_connect_timeout_ms {
            let _ = wifi.disconnect();
            let _ = wifi.stop();
            return Err(anyhow!(
                "wifi did not connect within {} ms",
                network.wifi_connect_timeout_ms
            ));
        }

        let _ = wifi.disconnect();
        thread::sleep(Duration::from_millis(WIFI_RETRY_DELAY_MS));
    }

    let ip_info = wifi.wifi().sta_netif().get_ip_info()?;
    info!("wifi connected, node reachable at http://{}/", ip_info.ip);

    drop(wifi);
    Ok(esp_wifi)
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn init_watchdog(timeout_sec: u32) -> anyhow::Result<()> {
    let config = esp_idf_svc::sys::esp_task_wdt_config_t {
        timeout_ms: timeout_sec.saturating_mul(1000),
        idle_core_mask: 0,
        trigger_panic: true,
    };
    let rc = unsafe { esp_idf_svc::sys::esp_task_wdt_init(&config) };
    if rc == esp_idf_svc::sys::ESP_OK || rc == esp_idf_svc::sys::ESP_ERR_INVALID_STATE {
        return Ok(());
    }
    Err(anyhow!("esp_task_wdt_init failed with code {}", rc))
}

fn add_current_task_to_watchdog() -> anyhow::Result<()> {
    let rc = unsafe { esp_idf_svc::sys::esp_task_wdt_add(core::ptr::null_mut()) };
    if rc == esp_idf_svc::sys::ESP_OK || rc == esp_idf_svc::sys::ESP_ERR_INVALID_STATE {
        return Ok(());
    }
    Err(anyhow!("esp_task_wdt_add failed with code {}", rc))
}

fn feed_watchdog() {
    let _ = unsafe { esp_idf_svc::sys::esp_task_wdt_reset() };
}

fn monotonic_ms() -> u64 {
    static START: OnceLock<Instant> = OnceLock::new();
    START
        .get_or_init(Instant::now)
        .elapsed()
        .as_millis()
        .try_into()
        .unwrap_or(u64::MAX)
}
