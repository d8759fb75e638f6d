use crate::prediction::PredictedClass;
use crate::ui::{theme, Icons};
use owo_colors::OwoColorize;

pub fn header(text: &str) {
    println!("{} {}", Icons::CORAL, text.style(theme().header.clone()));
}

pub fn success(label: &str) {
    println!("{} {}", Icons::CHECK, label.style(theme().success.clone()));
}

pub fn warn(label: &str) {
    eprintln!("{} {}", Icons::WARN, label.style(theme().warn.clone()));
}

pub fn info(label: &str, value: &str) {
    println!(
        "{} {}: {}",
        Icons::INFO.style(theme().info.clone()),
        label.style(theme().dim.clone()),
        value
    );
}

pub fn section(title: &str) {
    println!();
    println!("━{}━", title.style(theme().header.clone()));
}

/// Icon plus colored class name
pub fn class_badge(class: PredictedClass) -> String {
    match class {
        PredictedClass::Healthy => format!("{} {}", Icons::HEALTHY, class.style(theme().healthy.clone())),
        PredictedClass::Bleached => format!("{} {}", Icons::BLEACHED, class.style(theme().bleached.clone())),
        PredictedClass::Pending => format!("{} {}", Icons::HOURGLASS, class.style(theme().muted.clone())),
    }
}

pub fn summary_row(label: &str, value: &str) {
    println!("  {} {}", label.style(theme().dim.clone()), value);
}
