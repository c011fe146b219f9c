//! Filter / aggregate queries over a [`Dataset`].
//!
//! Results are a closed set of shapes ([`QueryResult`]). Each query either
//! yields a complete result or an `{"error": ...}` value, never a panic.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::{debug, instrument, warn};

use super::{Dataset, IncidentStore, Record};
use crate::error::QaError;

pub const IUCR_EXPLANATION: &str = "IUCR stands for Illinois Uniform Crime Reporting. It's a standardized system used by law enforcement agencies in Illinois to classify and report crimes.";

pub const DEFAULT_TOP_N: usize = 10;
pub const DEFAULT_LIMIT: usize = 100;
const TOP_LOCATIONS: usize = 5;
const SAMPLE_CODES: usize = 5;

/// The read-only query surface the dispatcher routes tool calls to.
///
/// `Err` is reserved for the surface itself being unusable (nothing loaded);
/// query-level failures are `Ok(QueryResult::Error(..))`.
pub trait IncidentQueries {
    fn advanced_query(&self, query: &AdvancedQuery) -> Result<QueryResult, QaError>;
    fn lookup_classification_code(&self, code: Option<&str>) -> Result<QueryResult, QaError>;
}

/// Independent predicates, combined with AND. `None` means unconstrained.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryFilters {
    pub start_year: Option<i64>,
    pub end_year: Option<i64>,
    pub ward: Option<i64>,
    pub district: Option<i64>,
    pub community_area: Option<i64>,
    pub arrest_status: Option<bool>,
    pub domestic: Option<bool>,
    pub location_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AdvancedQuery {
    pub filters: QueryFilters,
    pub group_by: Option<String>,
    pub top_n: usize,
    pub limit: usize,
}

impl Default for AdvancedQuery {
    fn default() -> Self {
        Self { filters: QueryFilters::default(), group_by: None, top_n: DEFAULT_TOP_N, limit: DEFAULT_LIMIT }
    }
}

/// Grouping selected by `group_by`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupBy {
    Ward,
    District,
    CommunityArea,
    Location,
}

impl GroupBy {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "ward" | "wards" => Some(GroupBy::Ward),
            "district" | "districts" => Some(GroupBy::District),
            "community_area" | "community_areas" | "community area" | "community areas" => {
                Some(GroupBy::CommunityArea)
            }
            "location" | "locations" | "block" | "blocks" => Some(GroupBy::Location),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            GroupBy::Ward => "ward",
            GroupBy::District => "district",
            GroupBy::CommunityArea => "community_area",
            GroupBy::Location => "location",
        }
    }

    /// Human label; empty for locations, whose keys already read as places.
    pub fn label(&self) -> &'static str {
        match self {
            GroupBy::Ward => "Ward",
            GroupBy::District => "District",
            GroupBy::CommunityArea => "Community Area",
            GroupBy::Location => "",
        }
    }

    pub fn plural_label(&self) -> &'static str {
        match self {
            GroupBy::Ward => "Wards",
            GroupBy::District => "Districts",
            GroupBy::CommunityArea => "Community Areas",
            GroupBy::Location => "Locations",
        }
    }
}

/// Key → count mapping that keeps its entry order.
///
/// Built by [`Breakdown::count`], entries are ordered by count descending with
/// ties left in first-seen order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Breakdown {
    entries: Vec<(String, u64)>,
}

impl Breakdown {
    pub fn from_entries(entries: Vec<(String, u64)>) -> Self {
        Self { entries }
    }

    pub fn count<'a, I>(keys: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut index: HashMap<&'a str, usize> = HashMap::new();
        let mut entries: Vec<(String, u64)> = Vec::new();
        for key in keys {
            let key = key.trim();
            if is_missing(key) {
                continue;
            }
            match index.get(key) {
                Some(&i) => entries[i].1 += 1,
                None => {
                    index.insert(key, entries.len());
                    entries.push((key.to_string(), 1));
                }
            }
        }
        // sort_by is stable, so equal counts keep insertion order
        entries.sort_by(|a, b| b.1.cmp(&a.1));
        Self { entries }
    }

    pub fn entries(&self) -> &[(String, u64)] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn top(&self) -> Option<(&str, u64)> {
        self.entries.first().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn truncated(&self, n: usize) -> Self {
        Self { entries: self.entries.iter().take(n).cloned().collect() }
    }

    /// Entries re-sorted by count descending (stable).
    pub fn by_count_desc(&self) -> Vec<(&str, u64)> {
        let mut v: Vec<(&str, u64)> = self.entries.iter().map(|(k, c)| (k.as_str(), *c)).collect();
        v.sort_by(|a, b| b.1.cmp(&a.1));
        v
    }
}

impl Serialize for Breakdown {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (k, v) in &self.entries {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Breakdown {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct BreakdownVisitor;

        impl<'de> Visitor<'de> for BreakdownVisitor {
            type Value = Breakdown;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of key to count")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Breakdown, A::Error> {
                let mut entries = Vec::new();
                while let Some((k, v)) = access.next_entry::<String, u64>()? {
                    entries.push((k, v));
                }
                Ok(Breakdown { entries })
            }
        }

        deserializer.deserialize_map(BreakdownVisitor)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FocusedBreakdown {
    #[serde(rename = "type")]
    pub kind: GroupBy,
    pub data: Breakdown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleRecord {
    pub id: String,
    pub case_number: String,
    pub date: Option<String>,
    pub year: Option<i32>,
    pub block: String,
    pub ward: String,
    pub district: String,
    pub community_area: String,
    pub location_description: String,
    pub arrest: bool,
    pub domestic: bool,
}

impl From<&Record> for SampleRecord {
    fn from(r: &Record) -> Self {
        Self {
            id: r.id.clone(),
            case_number: r.case_number.clone(),
            date: r.date.map(|d| d.format("%Y-%m-%d %H:%M:%S").to_string()),
            year: r.year,
            block: r.block.clone(),
            ward: r.ward.clone(),
            district: r.district.clone(),
            community_area: r.community_area.clone(),
            location_description: r.location_description.clone(),
            arrest: r.arrest,
            domestic: r.domestic,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdvancedQueryResult {
    pub total_matches: usize,
    pub filters_applied: Vec<String>,
    pub arrest_count: usize,
    pub arrest_rate: String,
    pub domestic_count: usize,
    pub domestic_rate: String,
    pub year_breakdown: Breakdown,
    pub ward_breakdown: Breakdown,
    pub district_breakdown: Breakdown,
    pub community_area_breakdown: Breakdown,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_breakdown: Option<FocusedBreakdown>,
    pub top_locations: Breakdown,
    pub top_n: usize,
    pub sample_records_count: usize,
    pub sample_records: Vec<SampleRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeDetail {
    pub iucr_code: String,
    pub primary_type: String,
    pub description: String,
    pub total_cases: usize,
    pub explanation: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeOverview {
    pub explanation: String,
    pub most_common_code: String,
    pub unique_codes_count: usize,
    pub sample_codes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResult {
    pub error: String,
}

/// Every shape a query can produce.
///
/// Serialized untagged so the JSON matches the key sets callers already know;
/// `Error` is tried first when decoding, so any payload with an `error` key is
/// an error regardless of what else it carries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QueryResult {
    Error(ErrorResult),
    Advanced(Box<AdvancedQueryResult>),
    CodeDetail(CodeDetail),
    CodeOverview(CodeOverview),
}

impl QueryResult {
    pub fn error(message: impl Into<String>) -> Self {
        QueryResult::Error(ErrorResult { error: message.into() })
    }

    pub fn error_message(&self) -> Option<&str> {
        match self {
            QueryResult::Error(e) => Some(&e.error),
            _ => None,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, QueryResult::Error(_))
    }
}

impl From<QaError> for QueryResult {
    fn from(e: QaError) -> Self {
        QueryResult::error(e.to_string())
    }
}

fn is_missing(key: &str) -> bool {
    key.is_empty() || key.eq_ignore_ascii_case("nan")
}

/// Best-effort numeric coercion of a raw column value.
pub(crate) fn coerce_number(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

fn numeric_eq(raw: &str, wanted: i64) -> bool {
    coerce_number(raw).is_some_and(|v| v == wanted as f64)
}

/// One-decimal percentage string; `0.0%` when there is nothing to divide by.
pub fn percent(part: usize, total: usize) -> String {
    if total == 0 {
        return "0.0%".to_string();
    }
    format!("{:.1}%", part as f64 / total as f64 * 100.0)
}

impl QueryFilters {
    pub fn matches(&self, r: &Record) -> bool {
        if let Some(start) = self.start_year {
            if !r.year.is_some_and(|y| i64::from(y) >= start) {
                return false;
            }
        }
        if let Some(end) = self.end_year {
            if !r.year.is_some_and(|y| i64::from(y) <= end) {
                return false;
            }
        }
        if let Some(w) = self.ward {
            if !numeric_eq(&r.ward, w) {
                return false;
            }
        }
        if let Some(d) = self.district {
            if !numeric_eq(&r.district, d) {
                return false;
            }
        }
        if let Some(ca) = self.community_area {
            if !numeric_eq(&r.community_area, ca) {
                return false;
            }
        }
        if let Some(a) = self.arrest_status {
            if r.arrest != a {
                return false;
            }
        }
        if let Some(d) = self.domestic {
            if r.domestic != d {
                return false;
            }
        }
        if let Some(loc) = &self.location_type {
            let needle = loc.to_lowercase();
            if !r.location_description.to_lowercase().contains(&needle) {
                return false;
            }
        }
        true
    }

    /// `"name: value"` lines for every filter that is set, in declaration order.
    pub fn describe(&self) -> Vec<String> {
        let mut out = Vec::new();
        if let Some(v) = self.start_year {
            out.push(format!("start_year: {v}"));
        }
        if let Some(v) = self.end_year {
            out.push(format!("end_year: {v}"));
        }
        if let Some(v) = self.ward {
            out.push(format!("ward: {v}"));
        }
        if let Some(v) = self.district {
            out.push(format!("district: {v}"));
        }
        if let Some(v) = self.community_area {
            out.push(format!("community_area: {v}"));
        }
        if let Some(v) = self.arrest_status {
            out.push(format!("arrest_status: {v}"));
        }
        if let Some(v) = self.domestic {
            out.push(format!("domestic: {v}"));
        }
        if let Some(v) = &self.location_type {
            out.push(format!("location_type: {v}"));
        }
        out
    }
}

impl Dataset {
    #[instrument(name = "advanced_query", skip(self), fields(records = self.len()))]
    pub fn advanced_query(&self, query: &AdvancedQuery) -> QueryResult {
        let matches: Vec<&Record> = self.records().iter().filter(|r| query.filters.matches(r)).collect();
        let total = matches.len();
        let arrest_count = matches.iter().filter(|r| r.arrest).count();
        let domestic_count = matches.iter().filter(|r| r.domestic).count();

        let mut years: BTreeMap<i32, u64> = BTreeMap::new();
        for y in matches.iter().filter_map(|r| r.year) {
            *years.entry(y).or_default() += 1;
        }
        let year_breakdown = Breakdown::from_entries(years.into_iter().map(|(y, c)| (y.to_string(), c)).collect());

        let ward_breakdown = Breakdown::count(matches.iter().map(|r| r.ward.as_str()));
        let district_breakdown = Breakdown::count(matches.iter().map(|r| r.district.as_str()));
        let community_area_breakdown = Breakdown::count(matches.iter().map(|r| r.community_area.as_str()));
        let block_breakdown = Breakdown::count(matches.iter().map(|r| r.block.as_str()));

        let top_n = query.top_n.max(1);
        let primary_breakdown = match query.group_by.as_deref() {
            Some(raw) if total > 0 => match GroupBy::parse(raw) {
                Some(kind) => {
                    let source = match kind {
                        GroupBy::Ward => &ward_breakdown,
                        GroupBy::District => &district_breakdown,
                        GroupBy::CommunityArea => &community_area_breakdown,
                        GroupBy::Location => &block_breakdown,
                    };
                    Some(FocusedBreakdown { kind, data: source.truncated(top_n) })
                }
                None => {
                    warn!(target: "dataset", group_by = %raw, "unknown_group_by_ignored");
                    None
                }
            },
            _ => None,
        };

        let sample_records: Vec<SampleRecord> =
            matches.iter().take(query.limit).map(|r| SampleRecord::from(*r)).collect();

        debug!(target: "dataset", total, arrest_count, domestic_count, focused = primary_breakdown.is_some(), "advanced_query_done");

        QueryResult::Advanced(Box::new(AdvancedQueryResult {
            total_matches: total,
            filters_applied: query.filters.describe(),
            arrest_count,
            arrest_rate: percent(arrest_count, total),
            domestic_count,
            domestic_rate: percent(domestic_count, total),
            year_breakdown,
            ward_breakdown,
            district_breakdown,
            community_area_breakdown,
            primary_breakdown,
            top_locations: block_breakdown.truncated(TOP_LOCATIONS),
            top_n,
            sample_records_count: sample_records.len(),
            sample_records,
        }))
    }

    #[instrument(name = "lookup_classification_code", skip(self))]
    pub fn lookup_classification_code(&self, code: Option<&str>) -> QueryResult {
        let code = code.map(str::trim).filter(|c| !c.is_empty());
        match code {
            Some(code) => {
                let mut hits = self.records().iter().filter(|r| r.iucr.trim() == code);
                let Some(first) = hits.next() else {
                    return QueryResult::error(format!("IUCR code '{code}' not found"));
                };
                QueryResult::CodeDetail(CodeDetail {
                    iucr_code: code.to_string(),
                    primary_type: first.primary_type.clone(),
                    description: first.description.clone(),
                    total_cases: 1 + hits.count(),
                    explanation: IUCR_EXPLANATION.to_string(),
                })
            }
            None => {
                let codes = Breakdown::count(self.records().iter().map(|r| r.iucr.as_str()));
                QueryResult::CodeOverview(CodeOverview {
                    explanation: IUCR_EXPLANATION.to_string(),
                    most_common_code: codes.top().map(|(k, _)| k.to_string()).unwrap_or_else(|| "Unknown".to_string()),
                    unique_codes_count: codes.len(),
                    sample_codes: codes.entries().iter().take(SAMPLE_CODES).map(|(k, _)| k.clone()).collect(),
                })
            }
        }
    }
}

impl IncidentQueries for Dataset {
    fn advanced_query(&self, query: &AdvancedQuery) -> Result<QueryResult, QaError> {
        Ok(Dataset::advanced_query(self, query))
    }

    fn lookup_classification_code(&self, code: Option<&str>) -> Result<QueryResult, QaError> {
        Ok(Dataset::lookup_classification_code(self, code))
    }
}

impl IncidentQueries for IncidentStore {
    fn advanced_query(&self, query: &AdvancedQuery) -> Result<QueryResult, QaError> {
        Ok(self.snapshot()?.advanced_query(query))
    }

    fn lookup_classification_code(&self, code: Option<&str>) -> Result<QueryResult, QaError> {
        Ok(self.snapshot()?.lookup_classification_code(code))
    }
}
