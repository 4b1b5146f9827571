use anyhow::anyhow;
use embedded_graphics::{
    mono_font::{ascii::FONT_6X10, MonoTextStyle},
    pixelcolor::BinaryColor,
    prelude::*,
    primitives::{PrimitiveStyle, Rectangle},
    text::{Baseline, Text},
};
use esp_idf_hal::i2c::I2cDriver;
use ssd1306::{
    mode::BufferedGraphicsMode, prelude::*, size::DisplaySize128x64, I2CDisplayInterface,
    Ssd1306,
};

use homenode_common::DisplayFrame;

type Panel = Ssd1306<
    I2CInterface<I2cDriver<'static>>,
    DisplaySize128x64,
    BufferedGraphicsMode<DisplaySize128x64>,
>;

pub struct StatusDisplay {
    panel: Panel,
}

impl StatusDisplay {
    pub fn new(i2c: I2cDriver<'static>, address: u8) -> anyhow::Result<Self> {
        let interface = I2CDisplayInterface::new_custom_address(i2c, address);
        let mut panel = Ssd1306::new(interface, DisplaySize128x64, DisplayRotation::Rotate0)
            .into_buffered_graphics_mode();
        panel
            .init()
            .map_err(|err| anyhow!("ssd1306 init failed: {err:?}"))?;
        Ok(Self { panel })
    }

    pub fn draw(&mut self, frame: DisplayFrame) -> anyhow::Result<()> {
        self.panel
            .clear(BinaryColor::Off)
            .map_err(|err| anyhow!("ssd1306 clear failed: {err:?}"))?;

        let stroke = PrimitiveStyle::with_stroke(BinaryColor::On, 1);
        for rect in frame.borders() {
            Rectangle::new(
                Point::new(rect.x, rect.y),
                Size::new(rect.width, rect.height),
            )
            .into_styled(stroke)
            .draw(&mut self.panel)
            .map_err(|err| anyhow!("ssd1306 border draw failed: {err:?}"))?;
        }

        let text_style = MonoTextStyle::new(&FONT_6X10, BinaryColor::On);
        for line in frame.lines() {
            Text::with_baseline(
                line.text,
                Point::new(line.x, line.y),
                text_style,
                Baseline::Top,
            )
            .draw(&mut self.panel)
            .map_err(|err| anyhow!("ssd1306 text draw failed: {err:?}"))?;
        }

        self.panel
            .flush()
            .map_err(|err| anyhow!("ssd1306 flush failed: {err:?}"))
    }
}
