use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Flag {
    Sala,
    Cozinha,
    Quarto,
    Banheiro,
    Quintal,
    Display,
}

impl Flag {
    pub const ALL: [Flag; 6] = [
        Flag::Sala,
        Flag::Cozinha,
        Flag::Quarto,
        Flag::Banheiro,
        Flag::Quintal,
        Flag::Display,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sala => "sala",
            Self::Cozinha => "cozinha",
            Self::Quarto => "quarto",
            Self::Banheiro => "banheiro",
            Self::Quintal => "quintal",
            Self::Display => "display",
        }
    }

    pub(crate) fn index(self) -> usize {
        match self {
            Self::Sala => 0,
            Self::Cozinha => 1,
            Self::Quarto => 2,
            Self::Banheiro => 3,
            Self::Quintal => 4,
            Self::Display => 5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Toggle(Flag),
    SetIndicator(bool),
    NoOp,
}

impl Command {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Toggle(Flag::Sala) => "TOGGLE_SALA",
            Self::Toggle(Flag::Cozinha) => "TOGGLE_COZINHA",
            Self::Toggle(Flag::Quarto) => "TOGGLE_QUARTO",
            Self::Toggle(Flag::Banheiro) => "TOGGLE_BANHEIRO",
            Self::Toggle(Flag::Quintal) => "TOGGLE_QUINTAL",
            Self::Toggle(Flag::Display) => "TOGGLE_DISPLAY",
            Self::SetIndicator(true) => "INDICATOR_ON",
            Self::SetIndicator(false) => "INDICATOR_OFF",
            Self::NoOp => "NOOP",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct NodeStatus {
    pub sala: bool,
    pub cozinha: bool,
    pub quarto: bool,
    pub banheiro: bool,
    pub quintal: bool,
    pub display: bool,
    #[serde(rename = "indicatorOn")]
    pub indicator_on: bool,
    #[serde(rename = "frontLightsOn")]
    pub front_lights_on: bool,
    #[serde(rename = "lastDistanceCm")]
    pub last_distance_cm: Option<f32>,
    #[serde(rename = "displayPhase")]
    pub display_phase: &'static str,
}
