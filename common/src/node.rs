use crate::{
    config::NodeConfig,
    render::{matrix_frame, DisplayFrame, DisplayRenderer, MatrixFrame},
    routes::route_request,
    sensor::{should_illuminate, ProximitySample},
    state::DeviceState,
    types::{Command, Flag, NodeStatus},
};

#[derive(Debug, Clone, PartialEq)]
pub enum NodeAction {
    SetFrontLights(bool),
    SetIndicator(bool),
    WriteMatrix(MatrixFrame),
    DrawDisplay(DisplayFrame),
}

#[derive(Debug, Clone)]
pub struct NodeEngine {
    pub config: NodeConfig,
    state: DeviceState,
    display: DisplayRenderer,
    indicator_on: bool,
    front_lights_on: bool,
    last_distance_cm: Option<f32>,
}

impl NodeEngine {
    pub fn new(mut config: NodeConfig) -> Self {
        config.sanitize();
        let display = DisplayRenderer::new(config.display_dwell_ms);
        Self {
            config,
            state: DeviceState::new(),
            display,
            indicator_on: false,
            front_lights_on: false,
            last_distance_cm: None,
        }
    }

    pub fn state(&self) -> &DeviceState {
        &self.state
    }

    pub fn handle_request(&mut self, method: &str, target: &str) -> (Command, Vec<NodeAction>) {
        let command = route_request(method, target);
        (command, self.apply_command(command))
    }

    /// Flag toggles only touch state; the renderer picks them up on the next
    /// tick. Indicator commands bypass state and act on hardware directly.
    pub fn apply_command(&mut self, command: Command) -> Vec<NodeAction> {
        match command {
            Command::Toggle(flag) => {
                self.state.toggle(flag);
                Vec::new()
            }
            Command::SetIndicator(on) => {
                self.indicator_on = on;
                vec![NodeAction::SetIndicator(on)]
            }
            Command::NoOp => Vec::new(),
        }
    }

    pub fn tick(&mut self, now_ms: u64, sample: ProximitySample) -> Vec<NodeAction> {
        let mut actions = Vec::with_capacity(3);

        self.last_distance_cm = sample.distance_cm;
        self.front_lights_on = should_illuminate(sample, self.config.proximity_threshold_cm);
        actions.push(NodeAction::SetFrontLights(self.front_lights_on));

        actions.push(NodeAction::WriteMatrix(matrix_frame(&self.state)));

        if let Some(frame) = self.display.step(self.state.get(Flag::Display), now_ms) {
            actions.push(NodeAction::DrawDisplay(frame));
        }

        actions
    }

    pub fn boot_actions(&self) -> Vec<NodeAction> {
        vec![
            NodeAction::SetIndicator(false),
            NodeAction::SetFrontLights(false),
            NodeAction::WriteMatrix(matrix_frame(&self.state)),
            NodeAction::DrawDisplay(DisplayFrame::Blank),
        ]
    }

    pub fn status(&self) -> NodeStatus {
        NodeStatus {
            sala: self.state.get(Flag::Sala),
            cozinha: self.state.get(Flag::Cozinha),
            quarto: self.state.get(Flag::Quarto),
            banheiro: self.state.get(Flag::Banheiro),
            quintal: self.state.get(Flag::Quintal),
            display: self.state.get(Flag::Display),
            indicator_on: self.indicator_on,
            front_lights_on: self.front_lights_on,
            last_distance_cm: self.last_distance_cm,
            display_phase: self.display.phase().as_str(),
        }
    }
}
