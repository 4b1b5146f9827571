use anyhow::Context;
use esp_idf_hal::{
    gpio::OutputPin,
    peripheral::Peripheral,
    rmt::{
        config::TransmitConfig, PinState, Pulse, PulseTicks, RmtChannel, TxRmtDriver,
        VariableLengthSignal,
    },
};
use log::warn;

use homenode_common::MatrixFrame;

// 80 MHz APB / 2 gives 25 ns ticks.
const WS2812_TICK_DIVIDER: u8 = 2;
const T0H_TICKS: u16 = 14;
const T0L_TICKS: u16 = 32;
const T1H_TICKS: u16 = 28;
const T1L_TICKS: u16 = 24;
const BITS_PER_PIXEL: usize = 24;

enum MatrixBackend {
    Rmt(TxRmtDriver<'static>),
    Disabled,
}

pub struct LedMatrix {
    backend: MatrixBackend,
    written_frames: u64,
    failed_frames: u64,
    last_error: Option<String>,
}

impl LedMatrix {
    pub fn new<C, P>(
        channel: impl Peripheral<P = C> + 'static,
        pin: impl Peripheral<P = P> + 'static,
    ) -> anyhow::Result<Self>
    where
        C: RmtChannel,
        P: OutputPin,
    {
        let config = TransmitConfig::new()
            .clock_divider(WS2812_TICK_DIVIDER)
            .carrier(None)
            .idle(Some(PinState::Low));

        let tx =
            TxRmtDriver::new(channel, pin, &config).context("failed to init RMT matrix driver")?;

        Ok(Self {
            backend: MatrixBackend::Rmt(tx),
            written_frames: 0,
            failed_frames: 0,
            last_error: None,
        })
    }

    pub fn disabled() -> Self {
        Self {
            backend: MatrixBackend::Disabled,
            written_frames: 0,
            failed_frames: 0,
            last_error: None,
        }
    }

    pub fn written_frames(&self) -> u64 {
        self.written_frames
    }

    pub fn failed_frames(&self) -> u64 {
        self.failed_frames
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn write_frame(&mut self, frame: &MatrixFrame) -> anyhow::Result<()> {
        let result = self.transmit(frame);

        if let Err(err) = &result {
            self.failed_frames = self.failed_frames.saturating_add(1);
            self.last_error = Some(format!("{err:#}"));
        } else {
            self.written_frames = self.written_frames.saturating_add(1);
            self.last_error = None;
        }

        result
    }

    fn transmit(&mut self, frame: &MatrixFrame) -> anyhow::Result<()> {
        let MatrixBackend::Rmt(tx) = &mut self.backend else {
            warn!("matrix disabled, dropping frame");
            return Ok(());
        };

        let zero = [
            Pulse::new(
                PinState::High,
                PulseTicks::new(T0H_TICKS).context("invalid T0H duration")?,
            ),
            Pulse::new(
                PinState::Low,
                PulseTicks::new(T0L_TICKS).context("invalid T0L duration")?,
            ),
        ];
        let one = [
            Pulse::new(
                PinState::High,
                PulseTicks::new(T1H_TICKS).context("invalid T1H duration")?,
            ),
            Pulse::new(
                PinState::Low,
                PulseTicks::new(T1L_TICKS).context("invalid T1L duration")?,
            ),
        ];

        let mut signal = VariableLengthSignal::with_capacity(frame.len() * BITS_PER_PIXEL * 2);
        for word in frame {
            for bit in (32 - BITS_PER_PIXEL..32).rev() {
                let pulses = if (word >> bit) & 1 == 1 { &one } else { &zero };
                signal
                    .push(pulses.iter())
                    .context("failed to convert matrix frame to RMT signal")?;
            }
        }

        tx.start_blocking(&signal)
            .context("failed to transmit matrix frame over RMT")?;
        Ok(())
    }
}
