//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::Parser;
use serde_json::{Value, json};

use cloudsea_core::{ConfigOverrides, Method, RequestError, RequestOptions};

/// Issue a single request through the cloudsea request engine.
///
/// The response payload is printed as JSON on stdout. Failures are printed as
/// a classified JSON error on stderr and exit with status 1.
#[derive(Parser, Debug)]
#[command(name = "cloudsea")]
#[command(author, version, about)]
pub struct Args {
    /// Target URL, absolute or relative to --base-url
    pub url: String,

    /// HTTP method
    #[arg(short = 'X', long, default_value = "GET")]
    pub method: Method,

    /// Request data as JSON (query string for GET/HEAD/DELETE, body otherwise)
    #[arg(short, long, value_parser = parse_json_data)]
    pub data: Option<Value>,

    /// Extra header as `name:value` (repeatable)
    #[arg(short = 'H', long = "header", value_parser = parse_header)]
    pub headers: Vec<(String, String)>,

    /// Prefix for relative URLs
    #[arg(long)]
    pub base_url: Option<String>,

    /// Per-attempt timeout in milliseconds (0 disables, max 3600000)
    #[arg(long, value_parser = clap::value_parser!(u64).range(0..=3_600_000))]
    pub timeout: Option<u64>,

    /// Retry budget for server and transport failures (0-10)
    #[arg(short = 'r', long, value_parser = clap::value_parser!(u32).range(0..=10))]
    pub retries: Option<u32>,

    /// JSON configuration file (camelCase option names)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Do not attach an X-Request-Id header
    #[arg(long)]
    pub no_request_id: bool,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,
}

impl Args {
    /// Overlays the command-line flags onto a configuration layer.
    #[must_use]
    pub fn config_layer(&self, base: ConfigOverrides) -> ConfigOverrides {
        ConfigOverrides {
            base_url: self.base_url.clone().or(base.base_url),
            timeout: self.timeout.or(base.timeout),
            repeat_num: self.retries.or(base.repeat_num),
            x_request_id: if self.no_request_id {
                Some(false)
            } else {
                base.x_request_id
            },
            ..base
        }
    }

    /// Builds the request described by the arguments.
    #[must_use]
    pub fn request_options(&self) -> RequestOptions {
        let mut options = RequestOptions::new(self.url.clone()).method(self.method);
        if let Some(data) = &self.data {
            options = options.data(data.clone());
        }
        for (name, value) in &self.headers {
            options = options.header(name.clone(), value.clone());
        }
        options
    }
}

fn parse_json_data(raw: &str) -> Result<Value, String> {
    serde_json::from_str(raw).map_err(|e| format!("invalid JSON data: {e}"))
}

fn parse_header(raw: &str) -> Result<(String, String), String> {
    let (name, value) = raw
        .split_once(':')
        .ok_or_else(|| format!("expected `name:value`, got `{raw}`"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("header name is empty in `{raw}`"));
    }
    Ok((name.to_string(), value.trim().to_string()))
}

/// Renders a request error as the JSON object printed on failure.
#[must_use]
pub fn error_report(error: &RequestError) -> Value {
    let mut report = json!({
        "type": error.kind().as_str(),
        "message": error.to_string(),
    });
    if let Some(status_code) = error.status_code() {
        report["statusCode"] = json!(status_code);
    }
    if let Some(retcode) = error.retcode() {
        report["retcode"] = retcode.clone();
    }
    report
}
