//! Text rendering of [`QueryResult`]s.
//!
//! Output is plain markdown-ish text, stable for a given result so it can be
//! fed back to the model and compared in tests.

use std::fmt::Write as _;

use serde_json::Value;

use crate::dataset::{AdvancedQueryResult, Breakdown, CodeDetail, CodeOverview, FocusedBreakdown, QueryResult, SampleRecord};

const SAMPLE_RECORDS_SHOWN: usize = 3;

pub fn format_result(result: &QueryResult) -> String {
    match result {
        QueryResult::Error(e) => format_error(&e.error),
        QueryResult::Advanced(r) => format_advanced(r),
        QueryResult::CodeDetail(d) => format_code_detail(d),
        QueryResult::CodeOverview(o) => format_code_overview(o),
    }
}

pub fn format_error(message: &str) -> String {
    format!("❌ {message}")
}

/// Decode an untyped payload by shape; anything unrecognised is pretty-printed.
pub fn format_value(value: &Value) -> String {
    match serde_json::from_value::<QueryResult>(value.clone()) {
        Ok(result) => format_result(&result),
        Err(_) => match value {
            Value::String(s) => s.clone(),
            other => serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
        },
    }
}

fn cases(n: u64) -> &'static str {
    if n == 1 { "case" } else { "cases" }
}

fn push_breakdown(out: &mut String, title: &str, label: &str, data: &Breakdown, limit: Option<usize>) {
    if data.is_empty() {
        return;
    }
    let rows = data.by_count_desc();
    let shown = limit.unwrap_or(rows.len()).min(rows.len());
    let _ = writeln!(out, "\n**{title}**");
    for (key, count) in rows.iter().take(shown) {
        let name = format!("{label} {key}");
        let _ = writeln!(out, "- {}: {} {}", name.trim(), count, cases(*count));
    }
    if rows.len() > shown {
        let _ = writeln!(out, "- ... and {} more", rows.len() - shown);
    }
}

fn push_focused(out: &mut String, focused: &FocusedBreakdown) {
    let label = focused.kind.label();
    push_breakdown(out, &format!("Top {}", focused.kind.plural_label()), label, &focused.data, None);
    if let Some((key, count)) = focused.data.by_count_desc().first() {
        let name = format!("{label} {key}");
        let _ = writeln!(out, "\n➡️ {} had the most with {} {}.", name.trim(), count, cases(*count));
    }
}

fn push_sample(out: &mut String, index: usize, r: &SampleRecord) {
    let year = r.year.map_or_else(|| "unknown year".to_string(), |y| y.to_string());
    let or_na = |s: &str| if s.is_empty() { "N/A".to_string() } else { s.to_string() };
    let _ = writeln!(out, "{}. **Case {}** ({})", index, r.case_number, year);
    let _ = writeln!(out, "   Ward: {} | District: {}", or_na(&r.ward), or_na(&r.district));
    let _ = writeln!(out, "   Location: {}", or_na(&r.block));
    let _ = writeln!(out, "   Arrest: {}", if r.arrest { "Yes" } else { "No" });
}

fn format_advanced(r: &AdvancedQueryResult) -> String {
    let mut out = String::from("📊 **Incident Query Results**\n");
    let filters = if r.filters_applied.is_empty() { "none".to_string() } else { r.filters_applied.join(", ") };
    let _ = writeln!(out, "Filters applied: {filters}");

    let _ = writeln!(out, "\n**Summary**");
    let _ = writeln!(out, "- Total matches: {}", r.total_matches);
    let _ = writeln!(out, "- Arrests: {} ({})", r.arrest_count, r.arrest_rate);
    let _ = writeln!(out, "- Domestic: {} ({})", r.domestic_count, r.domestic_rate);

    match &r.primary_breakdown {
        Some(focused) => push_focused(&mut out, focused),
        None => {
            push_breakdown(&mut out, "By Year", "", &r.year_breakdown, None);
            push_breakdown(&mut out, "By Ward", "Ward", &r.ward_breakdown, Some(r.top_n));
            push_breakdown(&mut out, "By District", "District", &r.district_breakdown, Some(r.top_n));
            push_breakdown(&mut out, "By Community Area", "Community Area", &r.community_area_breakdown, Some(r.top_n));
        }
    }

    push_breakdown(&mut out, "Top Locations", "", &r.top_locations, None);

    if !r.sample_records.is_empty() {
        let _ = writeln!(out, "\n**Sample Records** ({} of {})", r.sample_records.len().min(SAMPLE_RECORDS_SHOWN), r.total_matches);
        for (i, rec) in r.sample_records.iter().take(SAMPLE_RECORDS_SHOWN).enumerate() {
            push_sample(&mut out, i + 1, rec);
        }
    }
    out.trim_end().to_string()
}

fn format_code_detail(d: &CodeDetail) -> String {
    let mut out = format!("🔎 **IUCR Code {}**\n", d.iucr_code);
    let _ = writeln!(out, "- Category: {}", d.primary_type);
    let _ = writeln!(out, "- Description: {}", d.description);
    let _ = writeln!(out, "- Total cases: {}", d.total_cases);
    let _ = write!(out, "\nℹ️ {}", d.explanation);
    out
}

fn format_code_overview(o: &CodeOverview) -> String {
    let mut out = String::from("ℹ️ **About IUCR Codes**\n");
    let _ = writeln!(out, "{}", o.explanation);
    let _ = writeln!(out, "\n- Distinct codes in data: {}", o.unique_codes_count);
    let _ = writeln!(out, "- Most common code: {}", o.most_common_code);
    if !o.sample_codes.is_empty() {
        let _ = writeln!(out, "\n**Most Common Codes**");
        for code in o.sample_codes.iter().take(5) {
            let _ = writeln!(out, "- {code}");
        }
    }
    out.trim_end().to_string()
}
