use crate::types::{Command, Flag};

pub const PATH_TOGGLE_SALA: &str = "/mudar_estado_luz_sala";
pub const PATH_TOGGLE_COZINHA: &str = "/mudar_estado_luz_cozinha";
pub const PATH_TOGGLE_QUARTO: &str = "/mudar_estado_luz_quarto";
pub const PATH_TOGGLE_BANHEIRO: &str = "/mudar_estado_luz_banheiro";
pub const PATH_TOGGLE_QUINTAL: &str = "/mudar_estado_luz_quintal";
pub const PATH_TOGGLE_DISPLAY: &str = "/mudar_estado_display";

pub const PATH_INDICATOR_ON: &str = "/on";
pub const PATH_INDICATOR_OFF: &str = "/off";

pub const ROUTES: [(&str, Command); 8] = [
    (PATH_TOGGLE_SALA, Command::Toggle(Flag::Sala)),
    (PATH_TOGGLE_COZINHA, Command::Toggle(Flag::Cozinha)),
    (PATH_TOGGLE_QUARTO, Command::Toggle(Flag::Quarto)),
    (PATH_TOGGLE_BANHEIRO, Command::Toggle(Flag::Banheiro)),
    (PATH_TOGGLE_QUINTAL, Command::Toggle(Flag::Quintal)),
    (PATH_TOGGLE_DISPLAY, Command::Toggle(Flag::Display)),
    (PATH_INDICATOR_ON, Command::SetIndicator(true)),
    (PATH_INDICATOR_OFF, Command::SetIndicator(false)),
];

/// Resolves a request target to a command. The query string and fragment are
/// ignored; anything outside [`ROUTES`] is a no-op.
pub fn route(target: &str) -> Command {
    let path = strip_query(target);
    ROUTES
        .iter()
        .find(|(candidate, _)| *candidate == path)
        .map(|(_, command)| *command)
        .unwrap_or(Command::NoOp)
}

pub fn route_request(method: &str, target: &str) -> Command {
    if method == "GET" {
        route(target)
    } else {
        Command::NoOp
    }
}

fn strip_query(target: &str) -> &str {
    let end = target.find(['?', '#']).unwrap_or(target.len());
    &target[..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn routes_every_known_path() {
        assert_eq!(route(PATH_TOGGLE_SALA), Command::Toggle(Flag::Sala));
        assert_eq!(route(PATH_TOGGLE_COZINHA), Command::Toggle(Flag::Cozinha));
        assert_eq!(route(PATH_TOGGLE_QUARTO), Command::Toggle(Flag::Quarto));
        assert_eq!(route(PATH_TOGGLE_BANHEIRO), Command::Toggle(Flag::Banheiro));
        assert_eq!(route(PATH_TOGGLE_QUINTAL), Command::Toggle(Flag::Quintal));
        assert_eq!(route(PATH_TOGGLE_DISPLAY), Command::Toggle(Flag::Display));
        assert_eq!(route(PATH_INDICATOR_ON), Command::SetIndicator(true));
        assert_eq!(route(PATH_INDICATOR_OFF), Command::SetIndicator(false));
    }

    #[test]
    fn form_submit_query_string_is_ignored() {
        assert_eq!(
            route("/mudar_estado_luz_quarto?"),
            Command::Toggle(Flag::Quarto)
        );
        assert_eq!(route("/on?x=1#top"), Command::SetIndicator(true));
    }

    #[test]
    fn suffixes_and_prefixes_do_not_match() {
        for target in [
            "/",
            "/favicon.ico",
            "/mudar_estado_luz_sala_extra",
            "/mudar_estado_luz_salaoff",
            "/online",
            "/offline",
            "/x/on",
            "/mudar_estado",
            "mudar_estado_luz_sala",
            "",
        ] {
            assert_eq!(route(target), Command::NoOp, "target {target:?}");
        }
    }

    #[test]
    fn only_get_is_routed() {
        assert_eq!(
            route_request("GET", PATH_TOGGLE_DISPLAY),
            Command::Toggle(Flag::Display)
        );
        for method in ["POST", "PUT", "HEAD", "get", ""] {
            assert_eq!(
                route_request(method, PATH_TOGGLE_SALA),
                Command::NoOp,
                "method {method:?}"
            );
        }
    }

    #[test]
    fn command_text_outside_the_path_is_ignored() {
        assert_eq!(route("/?next=/mudar_estado_luz_sala"), Command::NoOp);
        assert_eq!(route("/#/on"), Command::NoOp);
        assert_eq!(route("GET /mudar_estado_luz_sala HTTP/1.1"), Command::NoOp);
    }
}
