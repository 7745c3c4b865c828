//! 📦 EventRecord: the humble envelope that every search row and every outbound message rides in.
//!
//! 🎬 COLD OPEN: INT. SEARCH HEAD, 2:13 AM
//!
//! A result row arrives. It has fields. It has values. It has no idea where it is going.
//! We give it an `EventRecord`, a pen, and a one-way ticket to the collector.
//!
//! 🧠 Knowledge graph:
//! - Built by `search::pager`, `search::realtime` and `search::executor` from raw rows
//! - Consumed exactly once by `collector::hec_writer` (or the stdout sink)
//! - Ordered, append-only, duplicates welcome. Audit trails do not dedupe. 🦆

use std::fmt;

use chrono::Local;

// ⏰ The pattern for the optional internal timestamp. The tab is load-bearing, do not "fix" it.
const INTERNAL_TIMESTAMP_FORMAT: &str = "%Y-%m-%d\t%H:%M:%S:%3f%z";

const NAME_KEY: &str = "name";
const EVENT_ID_KEY: &str = "event_id";
const TIMESTAMP_KEY: &str = "timestamp";
const ERROR_MESSAGE_KEY: &str = "error_message";
const ERROR_CAUSES_KEY: &str = "error_causes";

/// 📦 An ordered bag of `"key":"value"` pairs that serializes to a single-line JSON object.
///
/// Keys are `&str` on the way in, so a missing key simply cannot be expressed.
/// Duplicate keys are each kept, in the order they were added.
///
/// An empty record serializes to `""`, not `{}`. The collector envelope knows how to cope.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventRecord {
    pairs: Vec<(String, String)>,
    internal_timestamp: bool,
}

impl EventRecord {
    /// 🚀 A blank record, full of potential, empty of pairs.
    pub fn new() -> Self {
        Self::default()
    }

    /// 🏷️ A record that introduces itself: seeds `name` and `event_id` before anything else.
    pub fn named(event_name: &str, event_id: &str) -> Self {
        let mut record = Self::new();
        record.add_pair(NAME_KEY, event_name);
        record.add_pair(EVENT_ID_KEY, event_id);
        record
    }

    /// 🔄 Builds a record from a raw field map, preserving the row's field order.
    pub fn from_pairs<K, V, I>(pairs: I) -> Self
    where
        K: Into<String>,
        V: Into<String>,
        I: IntoIterator<Item = (K, V)>,
    {
        Self {
            pairs: pairs
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
            internal_timestamp: false,
        }
    }

    /// ⏰ When set, serialization appends a `timestamp` pair stamped at render time.
    pub fn with_internal_timestamp(mut self, enabled: bool) -> Self {
        self.internal_timestamp = enabled;
        self
    }

    /// ➕ Appends one pair. Anything `Display` is welcome: strings, chars, bools, numbers.
    pub fn add_pair(&mut self, key: &str, value: impl fmt::Display) -> &mut Self {
        self.pairs.push((key.to_string(), value.to_string()));
        self
    }

    /// 💀 Flattens an error chain into two pairs, `error_message` and `error_causes`.
    ///
    /// `max_depth` bounds how many causes land in `error_causes`; `None` keeps the whole onion.
    /// Each cause is followed by a comma, trailing one included.
    pub fn add_error(&mut self, error: &anyhow::Error, max_depth: Option<usize>) -> &mut Self {
        let causes: String = error
            .chain()
            .skip(1)
            .take(max_depth.unwrap_or(usize::MAX))
            .map(|cause| format!("{cause},"))
            .collect();
        self.add_pair(ERROR_MESSAGE_KEY, error);
        self.add_pair(ERROR_CAUSES_KEY, causes);
        self
    }

    /// 📏 How many pairs have piled up so far.
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty() && !self.internal_timestamp
    }

    /// 🔍 Borrowing view of the pairs, in insertion order.
    pub fn pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// 📡 Renders the single-line JSON-ish form.
    ///
    /// One `{`, one `}`, pairs in between separated by commas. Empty in, empty out.
    /// Rendering never touches `self`, so calling it twice gives you the same string twice.
    pub fn to_json(&self) -> String {
        let timestamp = self
            .internal_timestamp
            .then(|| Local::now().format(INTERNAL_TIMESTAMP_FORMAT).to_string());
        let rendered_pairs = self
            .pairs
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .chain(timestamp.as_deref().map(|ts| (TIMESTAMP_KEY, ts)));

        let mut json = String::new();
        for (key, value) in rendered_pairs {
            json.push(if json.is_empty() { '{' } else { ',' });
            push_json_string(&mut json, key);
            json.push(':');
            push_json_string(&mut json, value);
        }
        if !json.is_empty() {
            json.push('}');
        }
        json
    }
}

impl fmt::Display for EventRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_json())
    }
}

// 🔧 serde_json does the escaping so a stray quote in a log line doesn't shatter the object.
fn push_json_string(out: &mut String, raw: &str) {
    match serde_json::to_string(raw) {
        Ok(quoted) => out.push_str(&quoted),
        // -- serializing a &str cannot fail, but we still refuse to panic about it
        Err(_) => {
            out.push('"');
            out.push_str(raw);
            out.push('"');
        }
    }
}
