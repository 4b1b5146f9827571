use crate::{state::DeviceState, types::Flag};

pub const MATRIX_SIDE: usize = 5;
pub const MATRIX_PIXELS: usize = MATRIX_SIDE * MATRIX_SIDE;

/// GRB color word, left-aligned in 32 bits as the WS2812 shifter expects.
pub const MATRIX_ON_COLOR: u32 = 0xFFFF_FF00;
pub const MATRIX_OFF_COLOR: u32 = 0x0000_0000;

pub const ROOM_ROWS: [Flag; MATRIX_SIDE] = [
    Flag::Quintal,
    Flag::Banheiro,
    Flag::Quarto,
    Flag::Cozinha,
    Flag::Sala,
];

pub type MatrixFrame = [u32; MATRIX_PIXELS];

pub fn matrix_frame(state: &DeviceState) -> MatrixFrame {
    let mut frame = [MATRIX_OFF_COLOR; MATRIX_PIXELS];
    for (index, pixel) in frame.iter_mut().enumerate() {
        let room = ROOM_ROWS[index / MATRIX_SIDE];
        if state.get(room) {
            *pixel = MATRIX_ON_COLOR;
        }
    }
    frame
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextLine {
    pub text: &'static str,
    pub x: i32,
    pub y: i32,
}

const FRAME_BORDERS: [Rect; 2] = [
    Rect {
        x: 0,
        y: 0,
        width: 127,
        height: 63,
    },
    Rect {
        x: 3,
        y: 3,
        width: 122,
        height: 60,
    },
];

const ON_LINES: [TextLine; 2] = [
    TextLine {
        text: "TELEVISAO",
        x: 35,
        y: 30,
    },
    TextLine {
        text: "LIGADA",
        x: 38,
        y: 40,
    },
];

const OFF_LINES: [TextLine; 2] = [
    TextLine {
        text: "TELEVISAO",
        x: 30,
        y: 30,
    },
    TextLine {
        text: "DESLIGADA",
        x: 28,
        y: 40,
    },
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayFrame {
    On,
    OffTransient,
    Blank,
}

impl DisplayFrame {
    pub fn borders(self) -> &'static [Rect] {
        match self {
            Self::On | Self::OffTransient => &FRAME_BORDERS,
            Self::Blank => &[],
        }
    }

    pub fn lines(self) -> &'static [TextLine] {
        match self {
            Self::On => &ON_LINES,
            Self::OffTransient => &OFF_LINES,
            Self::Blank => &[],
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::On => "ON",
            Self::OffTransient => "OFF_TRANSIENT",
            Self::Blank => "BLANK",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayPhase {
    Blank,
    ShowingOn,
    ShowingOffTransient { since_ms: u64 },
}

impl DisplayPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Blank => "BLANK",
            Self::ShowingOn => "SHOWING_ON",
            Self::ShowingOffTransient { .. } => "SHOWING_OFF_TRANSIENT",
        }
    }
}

#[derive(Debug, Clone)]
pub struct DisplayRenderer {
    phase: DisplayPhase,
    dwell_ms: u64,
}

impl DisplayRenderer {
    pub fn new(dwell_ms: u64) -> Self {
        Self {
            phase: DisplayPhase::Blank,
            dwell_ms,
        }
    }

    pub fn phase(&self) -> DisplayPhase {
        self.phase
    }

    /// Advances one render cycle and returns the frame to push, if any.
    ///
    /// While the flag is set the ON frame is re-emitted every cycle. The OFF
    /// frame stays up for the dwell time without blocking the caller; the
    /// blank frame follows on the first cycle past it.
    pub fn step(&mut self, display_on: bool, now_ms: u64) -> Option<DisplayFrame> {
        if display_on {
            self.phase = DisplayPhase::ShowingOn;
            return Some(DisplayFrame::On);
        }

        match self.phase {
            DisplayPhase::ShowingOn => {
                self.phase = DisplayPhase::ShowingOffTransient { since_ms: now_ms };
                Some(DisplayFrame::OffTransient)
            }
            DisplayPhase::ShowingOffTransient { since_ms } => {
                if now_ms.saturating_sub(since_ms) >= self.dwell_ms {
                    self.phase = DisplayPhase::Blank;
                    Some(DisplayFrame::Blank)
                } else {
                    None
                }
            }
            DisplayPhase::Blank => None,
        }
    }
}
