//! Run one upload rule against a Base64 payload stored in a file

use anyhow::{Context, Result};
use b64rules::config::Settings;
use b64rules::rules::Base64Validator;
use b64rules::util::init_tracing;
use std::io::Read;
use std::path::PathBuf;
use std::{env, fs, io, process};
use tracing::info;

const USAGE: &str = "usage: ./b64rules <rule> <payload file | -> [params...]";

/// Points at an alternative config file
const CONFIG_VAR: &str = "B64RULES_CONFIG";

fn get_args() -> (String, String, Vec<String>) {
    let args: Vec<String> = env::args().collect();
    if args.len() < 3 {
        eprintln!("{USAGE}");
        process::exit(2);
    }

    (args[1].clone(), args[2].clone(), args[3..].to_vec())
}

fn read_payload(source: &str) -> Result<String> {
    if source == "-" {
        let mut payload = String::new();
        io::stdin()
            .read_to_string(&mut payload)
            .context("failed to read payload from stdin")?;
        return Ok(payload);
    }
    fs::read_to_string(source).with_context(|| format!("failed to read payload from {source}"))
}

fn run(rule: &str, source: &str, params: &[String]) -> Result<bool> {
    let config_path = env::var_os(CONFIG_VAR).map(PathBuf::from);
    let settings = Settings::load(config_path.as_deref())?;
    init_tracing(&settings.log);

    let payload = read_payload(source)?;
    let params: Vec<&str> = params.iter().map(String::as_str).collect();

    let validator = Base64Validator::new(&settings);
    let passed = validator.validate_rule(rule, source, payload.trim(), &params)?;
    info!("{rule} on {source}: passed = {passed}");
    Ok(passed)
}

fn main() {
    let (rule, source, params) = get_args();

    match run(&rule, &source, &params) {
        Ok(true) => println!("pass"),
        Ok(false) => {
            println!("fail");
            process::exit(1);
        }
        Err(e) => {
            eprintln!("error: {e:#}");
            process::exit(2);
        }
    }
}
