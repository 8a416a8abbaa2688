//! Releng Lane CLI
//!
//! Entry point for the `releng` command-line tool.

use std::process;

use releng_lane::{harness, script};

fn main() {
    let script = match script::standard() {
        Ok(script) => script,
        Err(e) => {
            eprintln!("releng: {}", e);
            process::exit(1);
        }
    };

    let argv: Vec<String> = std::env::args_os()
        .map(|arg| arg.to_string_lossy().into_owned())
        .collect();
    process::exit(harness::run(script, argv));
}
