//! 📡 SplunkRestService: the search contract, spoken over the Splunk management REST API.
//!
//! Everything here asks for `output_mode=json`. Jobs are polled through their status entity,
//! results and previews are paged with `offset`/`count`, exports arrive as newline-delimited
//! JSON and get split with memchr. Multi-value fields come back as arrays and leave as
//! comma-joined strings.
//!
//! ⚠️ No session negotiation lives here. Bring a token; we put it in a header and hope.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Url};
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, trace};

use super::{RawRow, SavedSearch, SearchArgs, SearchJob, SearchService};

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// 🔧 Where the management port lives and how to knock on it.
#[derive(Debug, Deserialize, Clone)]
pub struct SearchServiceConfig {
    /// 📡 Base URL of the management port, e.g. `https://splunk:8089`.
    pub url: String,
    /// 🔒 Pre-provisioned token. Sent as `Authorization: <auth_scheme> <token>`.
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default = "default_auth_scheme")]
    pub auth_scheme: String,
    /// ⚠️ Management ports love self-signed certs. This says "fine, whatever".
    #[serde(default)]
    pub accept_invalid_certs: bool,
    /// 🔌 How long to wait for the connection to the management port.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

fn default_auth_scheme() -> String {
    "Bearer".to_string()
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}

impl SearchServiceConfig {
    pub fn for_url(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            token: None,
            auth_scheme: default_auth_scheme(),
            accept_invalid_certs: false,
            connect_timeout_ms: default_connect_timeout_ms(),
        }
    }
}

#[derive(Debug)]
struct RestClient {
    http: Client,
    base: Url,
    auth: Option<String>,
}

impl RestClient {
    fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| anyhow::anyhow!("💀 '{}' cannot be used as a base URL", self.base))?
            .pop_if_empty()
            .extend(segments);
        url.query_pairs_mut().append_pair("output_mode", "json");
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let request = self.http.request(method, url);
        match &self.auth {
            Some(auth) => request.header("Authorization", auth),
            None => request,
        }
    }

    async fn get(&self, segments: &[&str], params: &[(&str, String)]) -> Result<String> {
        let mut url = self.url(segments)?;
        {
            let mut query = url.query_pairs_mut();
            for (key, value) in params {
                query.append_pair(key, value);
            }
        }
        trace!("📡 GET {url}");
        send(self.request(Method::GET, url)).await
    }

    async fn post(&self, segments: &[&str], form: &[(&str, String)]) -> Result<String> {
        let url = self.url(segments)?;
        trace!("📡 POST {url}");
        let request = self
            .request(Method::POST, url)
            .header("Content-Type", FORM_CONTENT_TYPE)
            .body(encode_form(form));
        send(request).await
    }
}

async fn send(request: RequestBuilder) -> Result<String> {
    let response = request
        .send()
        .await
        .context("💀 The search service did not answer. Check the URL, the port, and the firewall's mood.")?;
    let status = response.status();
    let body = response
        .text()
        .await
        .context("💀 The search service answered, then trailed off mid-sentence")?;
    if !status.is_success() {
        bail!("💀 The search service said '{status}'. It also said: '{body}'");
    }
    Ok(body)
}

/// 📝 `application/x-www-form-urlencoded`, built with the same encoder URLs use for queries.
fn encode_form(pairs: &[(&str, String)]) -> String {
    let Ok(mut scratch) = Url::parse("http://form.invalid/") else {
        return String::new();
    };
    scratch
        .query_pairs_mut()
        .extend_pairs(pairs.iter().map(|(key, value)| (*key, value.as_str())));
    scratch.query().unwrap_or_default().to_string()
}

/// 🏗️ The real thing. Cheap to clone jobs off of: every handle shares one HTTP client.
#[derive(Debug, Clone)]
pub struct SplunkRestService {
    client: Arc<RestClient>,
}

impl SplunkRestService {
    pub fn new(config: &SearchServiceConfig) -> Result<Self> {
        let base = Url::parse(&config.url)
            .with_context(|| format!("💀 '{}' is not a URL we can talk to", config.url))?;
        let http = Client::builder()
            .connect_timeout(Duration::from_millis(config.connect_timeout_ms))
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .build()
            .context("💀 The HTTP client for the search service refused to be born")?;
        let auth = config
            .token
            .as_deref()
            .filter(|token| !token.trim().is_empty())
            .map(|token| format!("{} {}", config.auth_scheme, token));
        Ok(Self {
            client: Arc::new(RestClient { http, base, auth }),
        })
    }

    fn job(&self, sid: String) -> RestJob {
        RestJob {
            sid,
            client: Arc::clone(&self.client),
        }
    }
}

#[derive(Debug, Deserialize)]
struct SidResponse {
    sid: String,
}

#[derive(Debug, Deserialize)]
struct Feed<T> {
    #[serde(default)]
    entry: Vec<T>,
}

#[derive(Debug, Deserialize, Default)]
struct JobEntry {
    content: JobContent,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct JobContent {
    #[serde(default)]
    dispatch_state: String,
    #[serde(default)]
    is_done: bool,
    #[serde(default)]
    is_failed: bool,
    #[serde(default)]
    result_count: u64,
    #[serde(default)]
    result_preview_count: u64,
}

#[derive(Debug, Deserialize, Default)]
struct NamedEntry {
    name: String,
}

#[derive(Debug, Deserialize)]
struct FieldName {
    name: String,
}

#[derive(Debug, Deserialize)]
struct ResultsPage {
    #[serde(default)]
    fields: Vec<FieldName>,
    #[serde(default)]
    results: Vec<Map<String, Value>>,
}

#[derive(Debug, Deserialize)]
struct ExportLine {
    #[serde(default)]
    preview: bool,
    #[serde(default)]
    result: Option<Map<String, Value>>,
}

fn parse<'a, T: Deserialize<'a>>(body: &'a str, what: &str) -> Result<T> {
    serde_json::from_str(body)
        .with_context(|| format!("💀 Could not make sense of the {what} the search service sent back"))
}

fn field_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        Value::Array(items) => items.iter().map(field_value).collect::<Vec<_>>().join(","),
        other => other.to_string(),
    }
}

/// 🧹 One JSON result object into ordered pairs. Declared field order first, leftovers after,
/// in the order the service sent them.
fn to_row(result: Map<String, Value>, fields: &[FieldName]) -> RawRow {
    let declared = |key: &str| fields.iter().any(|field| field.name == key);
    let mut row = Vec::with_capacity(result.len());
    for field in fields {
        if let Some(value) = result.get(&field.name) {
            row.push((field.name.clone(), field_value(value)));
        }
    }
    row.extend(
        result
            .iter()
            .filter(|(key, _)| !declared(key.as_str()))
            .map(|(key, value)| (key.clone(), field_value(value))),
    );
    row
}

fn parse_results(body: &str) -> Result<Vec<RawRow>> {
    let page: ResultsPage = parse(body, "results page")?;
    let ResultsPage { fields, results } = page;
    Ok(results
        .into_iter()
        .map(|result| to_row(result, &fields))
        .collect())
}

/// 🌊 Export bodies are one JSON object per line. Preview lines are dropped; final ones kept.
fn parse_export(body: &[u8]) -> Result<Vec<RawRow>> {
    let mut rows = Vec::new();
    let mut start = 0;
    for end in memchr::memchr_iter(b'\n', body).chain(std::iter::once(body.len())) {
        let line = &body[start..end];
        start = end + 1;
        let line = line.trim_ascii();
        if line.is_empty() {
            continue;
        }
        let parsed: ExportLine = serde_json::from_slice(line)
            .context("💀 An export line was not the JSON it promised to be")?;
        if parsed.preview {
            continue;
        }
        if let Some(result) = parsed.result {
            rows.push(to_row(result, &[]));
        }
    }
    Ok(rows)
}

#[async_trait]
impl SearchService for SplunkRestService {
    async fn create_job(&self, query: &str, args: &SearchArgs) -> Result<Box<dyn SearchJob>> {
        let mut form = vec![("search", query.to_string())];
        form.extend(args.to_params());
        let body = self
            .client
            .post(&["services", "search", "jobs"], &form)
            .await
            .context("💀 Creating the search job failed")?;
        let SidResponse { sid } = parse(&body, "job creation response")?;
        debug!("🎫 search job created with sid '{sid}'");
        Ok(Box::new(self.job(sid)))
    }

    async fn export(&self, query: &str, args: &SearchArgs) -> Result<Vec<RawRow>> {
        let mut form = vec![("search", query.to_string())];
        form.extend(args.to_params());
        let body = self
            .client
            .post(&["services", "search", "jobs", "export"], &form)
            .await
            .context("💀 The export request failed")?;
        parse_export(body.as_bytes())
    }

    async fn saved_searches(
        &self,
        owner: Option<&str>,
        app: &str,
    ) -> Result<Vec<Box<dyn SavedSearch>>> {
        let owner = owner.unwrap_or("-").to_string();
        let body = self
            .client
            .get(
                &["servicesNS", &owner, app, "saved", "searches"],
                &[("count", "0".to_string())],
            )
            .await
            .with_context(|| format!("💀 Listing saved searches for '{owner}/{app}' failed"))?;
        let feed: Feed<NamedEntry> = parse(&body, "saved search listing")?;
        Ok(feed
            .entry
            .into_iter()
            .map(|entry| {
                Box::new(RestSavedSearch {
                    name: entry.name,
                    owner: owner.clone(),
                    app: app.to_string(),
                    service: self.clone(),
                }) as Box<dyn SavedSearch>
            })
            .collect())
    }
}

#[derive(Debug)]
pub struct RestJob {
    sid: String,
    client: Arc<RestClient>,
}

impl RestJob {
    async fn status(&self) -> Result<JobContent> {
        let body = self
            .client
            .get(&["services", "search", "jobs", &self.sid], &[])
            .await
            .with_context(|| format!("💀 Reading the status of job '{}' failed", self.sid))?;
        let feed: Feed<JobEntry> = parse(&body, "job status")?;
        feed.entry
            .into_iter()
            .next()
            .map(|entry| entry.content)
            .with_context(|| format!("💀 Job '{}' has no status entry. Did it expire?", self.sid))
    }

    async fn page(&self, endpoint: &str, offset: u64, count: u64) -> Result<Vec<RawRow>> {
        let body = self
            .client
            .get(
                &["services", "search", "jobs", &self.sid, endpoint],
                &[("offset", offset.to_string()), ("count", count.to_string())],
            )
            .await
            .with_context(|| format!("💀 Fetching {endpoint} of job '{}' failed", self.sid))?;
        parse_results(&body)
    }
}

#[async_trait]
impl SearchJob for RestJob {
    fn sid(&self) -> &str {
        &self.sid
    }

    async fn is_done(&self) -> Result<bool> {
        Ok(self.status().await?.is_done)
    }

    async fn is_failed(&self) -> Result<bool> {
        Ok(self.status().await?.is_failed)
    }

    async fn is_ready(&self) -> Result<bool> {
        let state = self.status().await?.dispatch_state;
        Ok(!matches!(state.as_str(), "" | "QUEUED" | "PARSING"))
    }

    async fn result_count(&self) -> Result<u64> {
        Ok(self.status().await?.result_count)
    }

    async fn results(&self, offset: u64, count: u64) -> Result<Vec<RawRow>> {
        self.page("results", offset, count).await
    }

    async fn preview_count(&self) -> Result<u64> {
        Ok(self.status().await?.result_preview_count)
    }

    async fn preview(&self, offset: u64, count: u64) -> Result<Vec<RawRow>> {
        self.page("results_preview", offset, count).await
    }

    async fn finish(&self) -> Result<()> {
        self.client
            .post(
                &["services", "search", "jobs", &self.sid, "control"],
                &[("action", "finalize".to_string())],
            )
            .await
            .with_context(|| format!("💀 Finalizing job '{}' failed", self.sid))?;
        Ok(())
    }
}

#[derive(Debug)]
pub struct RestSavedSearch {
    name: String,
    owner: String,
    app: String,
    service: SplunkRestService,
}

#[async_trait]
impl SavedSearch for RestSavedSearch {
    fn name(&self) -> &str {
        &self.name
    }

    async fn dispatch(
        &self,
        earliest_time: &str,
        latest_time: &str,
        force_dispatch: bool,
    ) -> Result<Box<dyn SearchJob>> {
        let form = [
            ("force_dispatch", if force_dispatch { "1" } else { "0" }.to_string()),
            ("dispatch.earliest_time", earliest_time.to_string()),
            ("dispatch.latest_time", latest_time.to_string()),
        ];
        let body = self
            .service
            .client
            .post(
                &["servicesNS", &self.owner, &self.app, "saved", "searches", &self.name, "dispatch"],
                &form,
            )
            .await
            .with_context(|| format!("💀 Dispatching saved search '{}' failed", self.name))?;
        let SidResponse { sid } = parse(&body, "dispatch response")?;
        debug!("📼 saved search '{}' dispatched as '{sid}'", self.name);
        Ok(Box::new(self.service.job(sid)))
    }
}
