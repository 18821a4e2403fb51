use owo_colors::{AnsiColors, OwoColorize};
use std::sync::OnceLock;
use supports_color::Stream;
use tracing_subscriber::EnvFilter;

static ANSI_ENABLED: OnceLock<bool> = OnceLock::new();

pub fn init() -> Result<(), Box<dyn std::error::Error>> {
    let ansi = *ANSI_ENABLED.get_or_init(detect_ansi);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(ansi)
        .with_target(false)
        .compact()
        .try_init()
        .map_err(|err| std::io::Error::other(err.to_string()))?;
    Ok(())
}

pub fn category_access() -> String {
    paint("ACCESS", AnsiColors::BrightCyan, true)
}

pub fn category_control() -> String {
    paint("CONTROL", AnsiColors::BrightGreen, true)
}

pub fn category_tapes() -> String {
    paint("TAPES", AnsiColors::BrightYellow, true)
}

pub fn category_sequence() -> String {
    paint("SEQUENCE", AnsiColors::BrightMagenta, true)
}

pub fn method_label(method: &str) -> String {
    paint(method, method_color(method), false)
}

pub fn status_label(status: u16) -> String {
    paint(&status.to_string(), status_color(status), false)
}

fn method_color(method: &str) -> AnsiColors {
    match method {
        "GET" => AnsiColors::BrightBlue,
        "POST" => AnsiColors::BrightGreen,
        "PUT" => AnsiColors::BrightYellow,
        "DELETE" => AnsiColors::BrightRed,
        "PATCH" => AnsiColors::BrightMagenta,
        _ => AnsiColors::BrightWhite,
    }
}

fn status_color(status: u16) -> AnsiColors {
    match status {
        100..=199 => AnsiColors::BrightBlue,
        200..=299 => AnsiColors::BrightGreen,
        300..=399 => AnsiColors::BrightCyan,
        400..=499 => AnsiColors::BrightYellow,
        _ => AnsiColors::BrightRed,
    }
}

fn paint(text: &str, color: AnsiColors, bold: bool) -> String {
    if !*ANSI_ENABLED.get_or_init(detect_ansi) {
        return text.to_string();
    }
    if bold {
        format!("{}", text.color(color).bold())
    } else {
        format!("{}", text.color(color))
    }
}

fn detect_ansi() -> bool {
    if std::env::var_os("NO_COLOR").is_some() {
        return false;
    }
    if std::env::var_os("FORCE_COLOR").is_some() {
        return true;
    }
    supports_color::on_cached(Stream::Stdout).is_some()
}
