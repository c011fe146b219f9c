//! CSV → [`Dataset`] with column normalization.
//!
//! Accepts either the portal's display headers (`Case Number`, `Community Area`)
//! or the API's snake_case headers (`case_number`, `community_area`).

use std::io::Read;
use std::path::Path;

use chrono::NaiveDateTime;
use color_eyre::{Result, eyre::{WrapErr, eyre}};
use tracing::{info, warn};

use super::fetch::{FetchOptions, fetch_all_csv};
use super::{Dataset, Record};
use crate::config::Config;

const COLUMN_COUNT: usize = 14;
const DATE_FORMATS: [&str; 3] = ["%m/%d/%Y %I:%M:%S %p", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Column {
    Id,
    CaseNumber,
    Date,
    Block,
    Iucr,
    PrimaryType,
    Description,
    LocationDescription,
    Arrest,
    Domestic,
    District,
    Ward,
    CommunityArea,
    Year,
}

impl Column {
    const ALL: [Column; COLUMN_COUNT] = [
        Column::Id,
        Column::CaseNumber,
        Column::Date,
        Column::Block,
        Column::Iucr,
        Column::PrimaryType,
        Column::Description,
        Column::LocationDescription,
        Column::Arrest,
        Column::Domestic,
        Column::District,
        Column::Ward,
        Column::CommunityArea,
        Column::Year,
    ];

    fn display(&self) -> &'static str {
        match self {
            Column::Id => "ID",
            Column::CaseNumber => "Case Number",
            Column::Date => "Date",
            Column::Block => "Block",
            Column::Iucr => "IUCR",
            Column::PrimaryType => "Primary Type",
            Column::Description => "Description",
            Column::LocationDescription => "Location Description",
            Column::Arrest => "Arrest",
            Column::Domestic => "Domestic",
            Column::District => "District",
            Column::Ward => "Ward",
            Column::CommunityArea => "Community Area",
            Column::Year => "Year",
        }
    }

    fn snake(&self) -> &'static str {
        match self {
            Column::Id => "id",
            Column::CaseNumber => "case_number",
            Column::Date => "date",
            Column::Block => "block",
            Column::Iucr => "iucr",
            Column::PrimaryType => "primary_type",
            Column::Description => "description",
            Column::LocationDescription => "location_description",
            Column::Arrest => "arrest",
            Column::Domestic => "domestic",
            Column::District => "district",
            Column::Ward => "ward",
            Column::CommunityArea => "community_area",
            Column::Year => "year",
        }
    }
}

/// Header position of each known column; display names win over snake_case.
struct ColumnMap {
    positions: [Option<usize>; COLUMN_COUNT],
}

impl ColumnMap {
    fn from_headers(headers: &csv::StringRecord) -> Self {
        let mut positions = [None; COLUMN_COUNT];
        for (slot, col) in positions.iter_mut().zip(Column::ALL) {
            let find = |name: &str| headers.iter().position(|h| h.trim() == name);
            *slot = find(col.display()).or_else(|| find(col.snake()));
        }
        Self { positions }
    }

    fn missing(&self) -> Vec<&'static str> {
        Column::ALL
            .iter()
            .zip(self.positions.iter())
            .filter(|(_, p)| p.is_none())
            .map(|(c, _)| c.display())
            .collect()
    }

    fn get<'r>(&self, row: &'r csv::StringRecord, col: Column) -> &'r str {
        let idx = Column::ALL.iter().position(|c| *c == col).and_then(|i| self.positions[i]);
        idx.and_then(|i| row.get(i)).map(str::trim).unwrap_or("")
    }
}

pub fn parse_date(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    DATE_FORMATS.iter().find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
}

pub fn parse_year(raw: &str) -> Option<i32> {
    let v = raw.trim().parse::<f64>().ok()?;
    (v.is_finite() && v.fract() == 0.0).then_some(v as i32)
}

/// `true` / `1` / `yes` (any case) are true; everything else is false.
pub fn parse_flag(raw: &str) -> bool {
    matches!(raw.trim().to_ascii_lowercase().as_str(), "true" | "1" | "yes")
}

pub fn parse_csv<R: Read>(reader: R) -> Result<Vec<Record>> {
    let mut rdr = csv::ReaderBuilder::new().flexible(true).from_reader(reader);
    let headers = rdr.headers().wrap_err("reading CSV headers")?.clone();
    let columns = ColumnMap::from_headers(&headers);
    let missing = columns.missing();
    if !missing.is_empty() {
        warn!(target: "dataset", ?missing, "csv_columns_missing");
    }

    let mut records = Vec::new();
    for (line, row) in rdr.records().enumerate() {
        let row = row.wrap_err_with(|| format!("reading CSV row {}", line + 2))?;
        records.push(Record {
            id: columns.get(&row, Column::Id).to_string(),
            case_number: columns.get(&row, Column::CaseNumber).to_string(),
            date: parse_date(columns.get(&row, Column::Date)),
            block: columns.get(&row, Column::Block).to_string(),
            location_description: columns.get(&row, Column::LocationDescription).to_string(),
            year: parse_year(columns.get(&row, Column::Year)),
            district: columns.get(&row, Column::District).to_string(),
            ward: columns.get(&row, Column::Ward).to_string(),
            community_area: columns.get(&row, Column::CommunityArea).to_string(),
            arrest: parse_flag(columns.get(&row, Column::Arrest)),
            domestic: parse_flag(columns.get(&row, Column::Domestic)),
            iucr: columns.get(&row, Column::Iucr).to_string(),
            primary_type: columns.get(&row, Column::PrimaryType).to_string(),
            description: columns.get(&row, Column::Description).to_string(),
        });
    }
    Ok(records)
}

pub fn load_csv<P: AsRef<Path>>(path: P) -> Result<Dataset> {
    let path = path.as_ref();
    let file = std::fs::File::open(path).wrap_err_with(|| format!("opening {}", path.display()))?;
    let records = parse_csv(file)?;
    info!(target: "dataset", records = records.len(), path = %path.display(), "csv_loaded");
    Ok(Dataset::new(records, "csv"))
}

/// Load the dataset the way the CLI expects: cached CSV first, the open-data
/// API when refreshing or when no CSV exists, and the CSV again if the fetch fails.
pub fn load_dataset(config: &Config, force_refresh: bool) -> Result<Dataset> {
    let csv_path = &config.csv_path;
    if csv_path.exists() && !force_refresh {
        return load_csv(csv_path);
    }

    let opts = FetchOptions::from_config(config);
    match fetch_all_csv(&opts) {
        Ok(text) => {
            let records = parse_csv(text.as_bytes())?;
            if records.is_empty() {
                return Err(eyre!("open-data API returned no records"));
            }
            persist(csv_path, &text);
            info!(target: "dataset", records = records.len(), "api_loaded");
            Ok(Dataset::new(records, "api"))
        }
        Err(e) if csv_path.exists() => {
            warn!(target: "dataset", error = %e, "api_fetch_failed_using_csv");
            load_csv(csv_path)
        }
        Err(e) => Err(e.wrap_err("no incident data source available")),
    }
}

fn persist(path: &Path, text: &str) {
    let result = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map_or(Ok(()), std::fs::create_dir_all)
        .and_then(|_| std::fs::write(path, text));
    if let Err(e) = result {
        warn!(target: "dataset", error = %e, path = %path.display(), "csv_persist_failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DISPLAY_CSV: &str = "\
ID,Case Number,Date,Block,IUCR,Primary Type,Description,Location Description,Arrest,Domestic,District,Ward,Community Area,Year
1,JA100001,01/02/2023 11:30:00 PM,001XX W MADISON ST,0110,HOMICIDE,FIRST DEGREE MURDER,STREET,true,false,001,42,32,2023
2,JA100002,not a date,002XX S STATE ST,0110,HOMICIDE,FIRST DEGREE MURDER,APARTMENT,No,YES,001,,32,
";

    #[test]
    fn display_headers_are_normalized() -> Result<()> {
        let records = parse_csv(DISPLAY_CSV.as_bytes())?;
        assert_eq!(records.len(), 2);
        let a = &records[0];
        assert_eq!(a.case_number, "JA100001");
        assert_eq!(a.year, Some(2023));
        assert!(a.arrest);
        assert!(!a.domestic);
        assert_eq!(a.date.map(|d| d.format("%H:%M").to_string()).as_deref(), Some("23:30"));
        let b = &records[1];
        assert!(b.date.is_none());
        assert!(b.year.is_none());
        assert!(!b.arrest);
        assert!(b.domestic);
        assert_eq!(b.ward, "");
        Ok(())
    }

    #[test]
    fn snake_case_headers_are_accepted() -> Result<()> {
        let csv = "case_number,year,arrest,ward,community_area,date\nJB1,2021.0,1,7.0,25,2021-03-04T05:06:07.000\n";
        let records = parse_csv(csv.as_bytes())?;
        assert_eq!(records[0].case_number, "JB1");
        assert_eq!(records[0].year, Some(2021));
        assert!(records[0].arrest);
        assert_eq!(records[0].ward, "7.0");
        assert!(records[0].date.is_some());
        Ok(())
    }

    #[test]
    fn load_csv_reads_file() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("incidents.csv");
        std::fs::write(&path, DISPLAY_CSV)?;
        let ds = load_csv(&path)?;
        assert_eq!(ds.len(), 2);
        assert_eq!(ds.source(), "csv");
        Ok(())
    }

    #[test]
    fn existing_csv_is_used_without_refresh() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("cached.csv");
        std::fs::write(&path, DISPLAY_CSV)?;
        let cfg = Config {
            csv_path: path,
            data_url: "http://127.0.0.1:9/unreachable.csv".to_string(),
            ..Config::default()
        };
        assert_eq!(load_dataset(&cfg, false)?.len(), 2);
        // refresh fails against the unreachable URL and falls back to the cache
        assert_eq!(load_dataset(&cfg, true)?.len(), 2);
        Ok(())
    }

    #[test]
    fn flags_follow_token_set() {
        for t in ["true", "TRUE", "1", "Yes"] {
            assert!(parse_flag(t), "{t}");
        }
        for f in ["false", "0", "no", "", "y"] {
            assert!(!parse_flag(f), "{f}");
        }
    }
}
