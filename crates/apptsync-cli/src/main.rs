//! # apptsync CLI
//!
//! Offline utilities for inspecting saved change-feed responses.

use anyhow::{Context, Result};
use apptsync_adapter_athena::ChangesResponse;
use apptsync_core::{normalize_record, AppointmentStatus, ChangeEvent, NormalizationDrop};
use chrono::Local;
use std::env;
use std::fs;
use std::io::Read;

fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        print_help();
        return Ok(());
    }

    match args[1].as_str() {
        "normalize" => {
            if args.len() < 3 {
                eprintln!("Usage: apptsync normalize <file|->");
                std::process::exit(1);
            }
            let body = read_input(&args[2])?;
            let report = normalize_body(&body)?;

            println!(
                "{}",
                serde_json::to_string_pretty(&report.batch).context("Failed to encode batch")?
            );
            for (index, reason) in &report.dropped {
                eprintln!("dropped record {index}: {reason}");
            }
            eprintln!(
                "{} records, {} forwarded, {} dropped, cursor -> {}",
                report.seen,
                report.batch.len(),
                report.dropped.len(),
                report.next_cursor.as_deref().unwrap_or("unchanged")
            );
        }
        "status" => {
            if args.len() < 3 {
                eprintln!("Usage: apptsync status <code>");
                std::process::exit(1);
            }
            let status = AppointmentStatus::from_code(&args[2]);
            if status.is_accepted() {
                println!("{} -> {}", args[2].trim(), status.as_str());
            } else {
                println!("{} -> dropped (not forwarded)", args[2].trim());
            }
        }
        "help" | "--help" | "-h" => {
            print_help();
        }
        cmd => {
            eprintln!("Unknown command: {cmd}");
            print_help();
            std::process::exit(1);
        }
    }

    Ok(())
}

struct Report {
    seen: usize,
    batch: Vec<ChangeEvent>,
    dropped: Vec<(usize, NormalizationDrop)>,
    next_cursor: Option<String>,
}

fn read_input(path: &str) -> Result<String> {
    if path == "-" {
        let mut body = String::new();
        std::io::stdin()
            .read_to_string(&mut body)
            .context("Failed to read stdin")?;
        Ok(body)
    } else {
        fs::read_to_string(path).with_context(|| format!("Failed to read {path}"))
    }
}

fn normalize_body(body: &str) -> Result<Report> {
    let response: ChangesResponse =
        serde_json::from_str(body).context("Not a changed-appointments response")?;
    let page = response.into_page();

    let mut batch = Vec::new();
    let mut dropped = Vec::new();
    for (index, record) in page.records.iter().enumerate() {
        match normalize_record(record, &Local) {
            Ok(event) => batch.push(event),
            Err(reason) => dropped.push((index, reason)),
        }
    }

    Ok(Report {
        seen: page.records.len(),
        batch,
        dropped,
        next_cursor: page.last_event_id().map(str::to_string),
    })
}

fn print_help() {
    println!(
        r#"apptsync CLI

USAGE:
    apptsync <COMMAND> [OPTIONS]

COMMANDS:
    normalize <file|->  Normalize a saved changed-appointments response and
                        print the batch that would be forwarded
    status <code>       Show how an upstream status code is mapped
    help                Show this help message

STATUS CODES:
    o   booked
    x   cancelled
    f   filled
    *   anything else is dropped

EXAMPLES:
    apptsync normalize changes.json
    curl -s ... | apptsync normalize -
    apptsync status x
"#
    );
}
