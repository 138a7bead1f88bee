use std::io::IsTerminal;
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use imgwire_peer::Reply;
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

/// Print one JSON document per line.
pub fn print_json<T: Serialize>(value: &T) {
    println!(
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
    );
}

/// Two-column FIELD/VALUE table.
pub fn print_fields(rows: &[(&str, String)]) {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["FIELD", "VALUE"]);
    for (field, value) in rows {
        table.add_row(vec![field.to_string(), value.clone()]);
    }
    println!("{table}");
}

/// `key=value` pairs on one line.
pub fn print_pretty(rows: &[(&str, String)]) {
    let line = rows
        .iter()
        .map(|(field, value)| format!("{field}={value}"))
        .collect::<Vec<_>>()
        .join(" ");
    println!("{line}");
}

pub fn print_rows(rows: &[(&str, String)], format: OutputFormat) {
    match format {
        OutputFormat::Table => print_fields(rows),
        OutputFormat::Pretty | OutputFormat::Json => print_pretty(rows),
    }
}

/// Reply rendered for tables: the JSON, or `-` when there is none.
pub fn reply_text(reply: Option<&Reply>) -> String {
    reply.map_or_else(|| "-".to_string(), Reply::to_string)
}

pub fn round_ms(millis: f64) -> f64 {
    (millis * 100.0).round() / 100.0
}

pub fn now_unix_seconds() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reply_text_handles_missing_reply() {
        assert_eq!(reply_text(None), "-");
        let reply = Reply::new().with("pred", 1);
        assert_eq!(reply_text(Some(&reply)), r#"{"pred":1}"#);
    }

    #[test]
    fn round_ms_keeps_two_decimals() {
        assert_eq!(round_ms(1.23456), 1.23);
    }
}
