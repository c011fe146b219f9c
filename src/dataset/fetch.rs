//! Paginated CSV download from the open-data portal.
//!
//! Pages are requested with `$offset` / `$limit` until a short or empty page
//! comes back. A failure after at least one good page keeps what was fetched.

use std::time::Duration;

use color_eyre::{Result, eyre::{WrapErr, eyre}};
use reqwest::blocking::Client;
use tracing::{debug, info, warn};

use crate::config::Config;

const MAX_PAGES: usize = 200;

#[derive(Debug, Clone)]
pub struct FetchOptions {
    pub url: String,
    pub batch_size: usize,
    pub timeout: Duration,
}

impl FetchOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            url: config.data_url.clone(),
            batch_size: config.fetch_batch_size.max(1),
            timeout: Duration::from_secs(config.request_timeout_secs.max(1)),
        }
    }
}

fn build_client(opts: &FetchOptions) -> Result<Client> {
    Client::builder()
        .user_agent("incident_qa_fetcher/0.1")
        .timeout(opts.timeout)
        .build()
        .wrap_err("building reqwest client for open-data fetch")
}

fn fetch_page(client: &Client, opts: &FetchOptions, offset: usize) -> Result<String> {
    let resp = client
        .get(&opts.url)
        .query(&[("$offset", offset.to_string()), ("$limit", opts.batch_size.to_string())])
        .send()
        .wrap_err_with(|| format!("requesting page at offset {offset}"))?;
    let status = resp.status();
    let text = resp.text().wrap_err("reading page body")?;
    debug!(target: "dataset", status = %status, offset, len = text.len(), "page_response_raw");
    if !status.is_success() {
        return Err(eyre!("status {}: {}", status.as_u16(), text));
    }
    Ok(text)
}

/// Split a page into its header line and data rows (as raw text), plus the row count.
fn split_page(text: &str) -> Option<(&str, &str, usize)> {
    let text = text.trim_end();
    let (header, body) = match text.split_once('\n') {
        Some((h, b)) => (h.trim_end_matches('\r'), b),
        None => (text, ""),
    };
    if header.is_empty() {
        return None;
    }
    let rows = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(body.as_bytes())
        .records()
        .filter(|r| r.is_ok())
        .count();
    Some((header, body, rows))
}

/// Fetch every page and return one CSV document with a single header.
pub fn fetch_all_csv(opts: &FetchOptions) -> Result<String> {
    let client = build_client(opts)?;
    let mut out = String::new();
    let mut total_rows = 0usize;

    for page in 0..MAX_PAGES {
        let offset = page * opts.batch_size;
        let text = match fetch_page(&client, opts, offset) {
            Ok(t) => t,
            Err(e) if total_rows > 0 => {
                warn!(target: "dataset", error = %e, rows = total_rows, "fetch_incomplete_keeping_partial");
                break;
            }
            Err(e) => return Err(e),
        };
        let Some((header, body, rows)) = split_page(&text) else { break };
        if out.is_empty() {
            out.push_str(header);
            out.push('\n');
        }
        if rows == 0 {
            break;
        }
        out.push_str(body.trim_end());
        out.push('\n');
        total_rows += rows;
        info!(target: "dataset", offset, rows, total_rows, "page_fetched");
        if rows < opts.batch_size {
            break;
        }
    }

    if total_rows == 0 {
        return Err(eyre!("no rows returned from {}", opts.url));
    }
    Ok(out)
}
