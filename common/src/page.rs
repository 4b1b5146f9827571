use std::fmt::Write;

use crate::routes::{
    PATH_TOGGLE_BANHEIRO, PATH_TOGGLE_COZINHA, PATH_TOGGLE_DISPLAY, PATH_TOGGLE_QUARTO,
    PATH_TOGGLE_QUINTAL, PATH_TOGGLE_SALA,
};

pub const STATUS_PAGE_CONTENT_TYPE: &str = "text/html";

const PAGE_HEAD: &str = r#"<!DOCTYPE html>
<html>
<head>
<title>Controle Residencial</title>
<style>
body { background-color:rgb(188, 251, 181); font-family: Arial, sans-serif; text-align: center; margin-top: 50px; }
h1 { font-size: 64px; margin-bottom: 30px; }
button { background-color: LightBlue; font-size: 36px; margin: 10px; padding: 20px 40px; border-radius: 10px; }
.temperature { font-size: 48px; margin-top: 30px; color: #333; }
</style>
</head>
<body>
<h1>Controle Residencial</h1>
"#;

const PAGE_TAIL: &str = "</body>\n</html>\n";

const BUTTONS: [(&str, &str); 6] = [
    (PATH_TOGGLE_SALA, "Luz da Sala"),
    (PATH_TOGGLE_COZINHA, "Luz da Cozinha"),
    (PATH_TOGGLE_QUARTO, "Luz do Quarto"),
    (PATH_TOGGLE_BANHEIRO, "Luz do Banheiro"),
    (PATH_TOGGLE_QUINTAL, "Luz do Quintal"),
    (PATH_TOGGLE_DISPLAY, "Televisão"),
];

pub fn render_status_page(temperature_c: Option<f32>) -> String {
    let mut html = String::with_capacity(1_536);
    html.push_str(PAGE_HEAD);

    for (path, label) in BUTTONS {
        let _ = writeln!(
            html,
            "<form action=\".{path}\"><button>{label}</button></form>"
        );
    }

    match temperature_c {
        Some(celsius) => {
            let _ = writeln!(
                html,
                "<p class=\"temperature\">Temperatura Interna: {celsius:.2} &deg;C</p>"
            );
        }
        None => {
            html.push_str("<p class=\"temperature\">Temperatura Interna: -- &deg;C</p>\n");
        }
    }

    html.push_str(PAGE_TAIL);
    html
}
