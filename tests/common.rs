#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, Once};

use color_eyre::eyre::eyre;
use incident_qa::dataset::{AdvancedQuery, Dataset, IncidentQueries, QueryResult, Record};
use incident_qa::llm::{ChatMessage, CompletionBackend};
use incident_qa::QaError;
use once_cell::sync::Lazy;
use tracing_appender::rolling;
use tracing_subscriber::{fmt, EnvFilter, prelude::*};

static START: Once = Once::new();
static _GUARD: Lazy<Mutex<Option<tracing_appender::non_blocking::WorkerGuard>>> = Lazy::new(|| Mutex::new(None));

/// Initialize test environment: dotenv and tracing (stderr + file).
/// Idempotent: safe to call multiple times.
pub fn init() {
    START.call_once(|| {
        let _ = dotenvy::dotenv();
        let filter = EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new("info"))
            .expect("env filter");

        // Daily rotating log file separate from app runtime logs
        let file_appender = rolling::daily("logs", "tests.log");
        let (file_nb, guard) = tracing_appender::non_blocking(file_appender);
        *_GUARD.lock().unwrap() = Some(guard);

        let stderr_layer = fmt::layer().with_target(true).with_writer(std::io::stderr);
        let file_layer = fmt::layer().with_ansi(false).with_target(true).with_writer(file_nb);

        tracing_subscriber::registry()
            .with(filter)
            .with(stderr_layer)
            .with(file_layer)
            .init();

        tracing::info!(target = "test_init", "Test tracing initialized (stderr + rotating file)");
    });
}

/// Completion backend that replays canned replies in order and records what it was sent.
/// `Err` entries simulate transport failures.
pub struct ScriptedBackend {
    replies: Mutex<VecDeque<Result<String, String>>>,
    pub sent: Arc<Mutex<Vec<Vec<ChatMessage>>>>,
}

impl ScriptedBackend {
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = Result<S, S>>,
        S: Into<String>,
    {
        Self {
            replies: Mutex::new(replies.into_iter().map(|r| r.map(Into::into).map_err(Into::into)).collect()),
            sent: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn ok<S: Into<String>>(replies: impl IntoIterator<Item = S>) -> Self {
        Self::new(replies.into_iter().map(|s| Ok::<String, String>(s.into())))
    }

    /// Shared handle on the sent-message log, usable after the backend is boxed.
    pub fn log(&self) -> Arc<Mutex<Vec<Vec<ChatMessage>>>> {
        Arc::clone(&self.sent)
    }
}

impl CompletionBackend for ScriptedBackend {
    fn name(&self) -> &str {
        "scripted"
    }

    fn complete(&self, messages: &[ChatMessage]) -> color_eyre::Result<String> {
        self.sent.lock().unwrap().push(messages.to_vec());
        match self.replies.lock().unwrap().pop_front() {
            Some(Ok(text)) => Ok(text),
            Some(Err(e)) => Err(eyre!(e)),
            None => Err(eyre!("script exhausted")),
        }
    }
}

/// Query surface that counts calls before delegating.
pub struct CountingQueries<'a> {
    pub inner: &'a dyn IncidentQueries,
    pub calls: Mutex<usize>,
}

impl<'a> CountingQueries<'a> {
    pub fn new(inner: &'a dyn IncidentQueries) -> Self {
        Self { inner, calls: Mutex::new(0) }
    }

    pub fn count(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

impl IncidentQueries for CountingQueries<'_> {
    fn advanced_query(&self, query: &AdvancedQuery) -> Result<QueryResult, QaError> {
        *self.calls.lock().unwrap() += 1;
        self.inner.advanced_query(query)
    }

    fn lookup_classification_code(&self, code: Option<&str>) -> Result<QueryResult, QaError> {
        *self.calls.lock().unwrap() += 1;
        self.inner.lookup_classification_code(code)
    }
}

fn record(n: usize, year: i32, ward: &str, arrest: bool) -> Record {
    Record {
        id: n.to_string(),
        case_number: format!("JG{n:06}"),
        year: Some(year),
        ward: ward.to_string(),
        district: format!("{:03}", n % 3 + 1),
        community_area: format!("{}", n % 5 + 20),
        block: format!("{:03}XX S STATE ST", n % 4),
        location_description: if n % 2 == 0 { "STREET".into() } else { "APARTMENT".into() },
        arrest,
        domestic: n % 10 == 0,
        iucr: if n % 3 == 0 { "0130".into() } else { "0110".into() },
        primary_type: "HOMICIDE".into(),
        description: if n % 3 == 0 { "SECOND DEGREE MURDER".into() } else { "FIRST DEGREE MURDER".into() },
        ..Record::default()
    }
}

/// `total` records in 2023, the first `arrests` of them with an arrest.
pub fn year_dataset(total: usize, arrests: usize) -> Dataset {
    let records = (0..total).map(|n| record(n + 1, 2023, "1", n < arrests)).collect();
    Dataset::new(records, "synthetic")
}

/// Records in 2023 laid out ward by ward in the given order.
pub fn ward_dataset(wards: &[(&str, usize)]) -> Dataset {
    let mut records = Vec::new();
    for (ward, count) in wards {
        for _ in 0..*count {
            let n = records.len() + 1;
            records.push(record(n, 2023, ward, n % 2 == 0));
        }
    }
    Dataset::new(records, "synthetic")
}
