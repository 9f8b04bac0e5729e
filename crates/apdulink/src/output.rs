use std::io::{IsTerminal, Write};

use apdulink_frame::{status, Response};
use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;

use crate::hex;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
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

#[derive(Serialize)]
struct ResponseOutput<'a> {
    status: String,
    status_name: Option<&'a str>,
    data_size: usize,
    data: String,
}

#[derive(Serialize)]
struct StatusOutput<'a> {
    code: String,
    name: Option<&'a str>,
    success: bool,
}

pub fn print_response(response: &Response, format: OutputFormat) {
    let name = status::status_name(response.status);
    match format {
        OutputFormat::Json => {
            let out = ResponseOutput {
                status: format!("{:04x}", response.status),
                status_name: name,
                data_size: response.data.len(),
                data: hex::encode(&response.data),
            };
            print_json(&out);
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["STATUS", "NAME", "SIZE", "DATA"])
                .add_row(vec![
                    format!("{:04x}", response.status),
                    name.unwrap_or("-").to_string(),
                    response.data.len().to_string(),
                    hex::encode(&response.data),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "status={} size={} data={}",
                status::describe(response.status),
                response.data.len(),
                hex::encode(&response.data)
            );
        }
        OutputFormat::Raw => print_raw(&response.data),
    }
}

pub fn print_status(code: u16, format: OutputFormat) {
    let name = status::status_name(code);
    match format {
        OutputFormat::Json => print_json(&StatusOutput {
            code: format!("{code:04x}"),
            name,
            success: status::is_success(code),
        }),
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_header(vec!["CODE", "NAME"])
                .add_row(vec![format!("{code:04x}"), name.unwrap_or("-").to_string()]);
            println!("{table}");
        }
        OutputFormat::Pretty | OutputFormat::Raw => println!("{}", status::describe(code)),
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

fn print_json<T: Serialize>(value: &T) {
    println!(
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
    );
}
