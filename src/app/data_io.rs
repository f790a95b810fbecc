use std::collections::{BTreeMap, HashSet};
use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

use serde::Serialize;

use crate::model::{Request, Source};
use crate::task::CrawlResult;

use super::types::OutputMode;

pub const MISSION_COMPLETE_MARKER: &str = "--[Mission Complete]--";

/// Scanner-facing report: found requests keyed by `METHOD URL [DATA]`, plus
/// every parameter assignment seen in them.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    #[serde(rename = "requestsFound")]
    pub requests_found: BTreeMap<String, ReportRequest>,
    #[serde(rename = "inputSet")]
    pub input_set: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportRequest {
    pub url: String,
    pub method: String,
    pub headers: BTreeMap<String, String>,
    pub data: String,
    pub source: Source,
}

impl Report {
    pub fn from_requests(req_list: &[Request]) -> Self {
        let mut requests_found = BTreeMap::new();
        let mut seen_inputs = HashSet::new();
        let mut input_set = Vec::new();

        for req in req_list {
            for input in request_inputs(req) {
                if seen_inputs.insert(input.clone()) {
                    input_set.push(input);
                }
            }
            requests_found.insert(
                req.summary_key(),
                ReportRequest {
                    url: req.url.to_string(),
                    method: req.method.to_string(),
                    headers: req.headers.clone(),
                    data: req.post_data.clone(),
                    source: req.source,
                },
            );
        }

        Self {
            requests_found,
            input_set,
        }
    }

    pub fn to_json(&self) -> io::Result<String> {
        let mut buf = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
        self.serialize(&mut serializer).map_err(io::Error::other)?;
        String::from_utf8(buf).map_err(io::Error::other)
    }
}

/// `k=v` for the first value of each query key, then the raw body pairs.
fn request_inputs(req: &Request) -> Vec<String> {
    let mut keys = HashSet::new();
    let mut inputs = req
        .url
        .query_pairs()
        .into_iter()
        .filter(|(key, _)| keys.insert(key.clone()))
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>();
    if !req.post_data.is_empty() {
        inputs.extend(
            req.post_data
                .split('&')
                .filter(|pair| !pair.is_empty())
                .map(str::to_string),
        );
    }
    inputs
}

/// Writes the crawl outcome to stdout per `mode`, and the JSON report to
/// `output_json` when given.
pub fn emit_result(
    result: &CrawlResult,
    mode: OutputMode,
    output_json: Option<&Path>,
) -> io::Result<()> {
    let report = Report::from_requests(&result.req_list);
    let stdout = io::stdout();
    let mut out = stdout.lock();
    match mode {
        OutputMode::Json => {
            writeln!(out, "{MISSION_COMPLETE_MARKER}")?;
            writeln!(out, "{}", report.to_json()?)?;
        }
        OutputMode::Console => write_console(&mut out, &result.req_list)?,
        OutputMode::None => {}
    }
    out.flush()?;

    if let Some(path) = output_json {
        write_report(path, &report)?;
    }
    Ok(())
}

pub fn write_console<W: Write>(out: &mut W, req_list: &[Request]) -> io::Result<()> {
    for req in req_list {
        writeln!(out, "{req}")?;
    }
    Ok(())
}

pub fn write_report(path: &Path, report: &Report) -> io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(report.to_json()?.as_bytes())?;
    file.write_all(b"\n")?;
    file.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Method, RequestOptions};

    fn sample() -> Vec<Request> {
        let mut form = Request::with_options(
            Method::Post,
            "http://h/login",
            RequestOptions {
                headers: BTreeMap::from([("Referer".to_string(), "http://h/".to_string())]),
                post_data: "user=reqhound&pass=reqhound".into(),
            },
        )
        .unwrap();
        form.source = Source::Dom;
        vec![
            Request::new(Method::Get, "http://h/list?page=1&sort=asc&page=2")
                .unwrap()
                .with_source(Source::Target),
            form,
            Request::new(Method::Get, "http://h/list?page=1")
                .unwrap()
                .with_source(Source::Xhr),
        ]
    }

    #[test]
    fn test_report_keys_and_input_set() {
        let report = Report::from_requests(&sample());
        let keys = report.requests_found.keys().cloned().collect::<Vec<_>>();
        assert_eq!(
            keys,
            vec![
                "GET http://h/list?page=1",
                "GET http://h/list?page=1&sort=asc&page=2",
                "POST http://h/login user=reqhound&pass=reqhound",
            ]
        );
        assert_eq!(
            report.input_set,
            vec!["page=1", "sort=asc", "user=reqhound", "pass=reqhound"]
        );
        let login = &report.requests_found["POST http://h/login user=reqhound&pass=reqhound"];
        assert_eq!(login.headers["Referer"], "http://h/");
        assert_eq!(login.source, Source::Dom);
    }

    #[test]
    fn test_json_shape() {
        let json = Report::from_requests(&sample()).to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        let found = &value["requestsFound"]["GET http://h/list?page=1"];
        assert_eq!(found["method"], "GET");
        assert_eq!(found["url"], "http://h/list?page=1");
        assert_eq!(found["data"], "");
        assert_eq!(found["source"], "XHR");
        assert!(value["inputSet"].is_array());
        assert!(json.contains("\n    \"inputSet\""));
        assert!(!json.contains("\\u0026"));
    }

    #[test]
    fn test_write_report_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.json");
        write_report(&path, &Report::from_requests(&sample())).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("requestsFound"));
        assert!(text.ends_with("}\n"));
    }

    #[test]
    fn test_console_blocks() {
        let mut out = Vec::new();
        write_console(&mut out, &sample()[1..2]).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("POST http://h/login\n"));
        assert!(text.contains("Referer: http://h/\n"));
        assert!(text.contains("\nuser=reqhound&pass=reqhound\n"));
    }
}
