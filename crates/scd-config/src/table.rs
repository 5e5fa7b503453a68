use anyhow::{Context, Result};
use chrono::NaiveDate;
use scd_calendar::BusinessCalendar;
use scd_canonical::normalize_column_name;
use scd_reconcile::TableOptions;
use scd_schemas::{PresenceMode, ScdError, TableSchema};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Typed view of the merged config.
///
/// ```yaml
/// table:
///   name: securities
///   keys: [security_id]
///   values: [ticker, name]
/// calendar:            # optional; present => business-calendar mode
///   nyse: { from: "2025-01-01", to: "2025-12-31" }
/// presence: inferred   # or explicit
/// reads:
///   allow_unsynced: false
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableConfig {
    pub table: TableSection,
    #[serde(default)]
    pub calendar: Option<CalendarConfig>,
    #[serde(default)]
    pub presence: PresenceMode,
    #[serde(default)]
    pub reads: ReadsConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSection {
    pub name: String,
    pub keys: Vec<String>,
    #[serde(default)]
    pub values: Vec<String>,
}

/// Exactly one source must be set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarConfig {
    #[serde(default)]
    pub dates: Option<Vec<NaiveDate>>,
    /// One date per line; relative paths resolve against the config directory.
    #[serde(default)]
    pub file: Option<PathBuf>,
    #[serde(default)]
    pub nyse: Option<NyseRange>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NyseRange {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadsConfig {
    #[serde(default)]
    pub allow_unsynced: bool,
}

impl TableConfig {
    pub fn from_json(config_json: &Value) -> Result<Self> {
        let cfg: TableConfig = serde_json::from_value(config_json.clone())
            .context("CONFIG_INVALID: table config does not match the expected shape")?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ScdError> {
        let t = &self.table;
        if !is_sql_identifier(&t.name) {
            return Err(ScdError::Config(format!(
                "table.name {:?} is not an identifier ([A-Za-z_][A-Za-z0-9_]*)",
                t.name
            )));
        }
        if t.keys.is_empty() {
            return Err(ScdError::Config("table.keys must not be empty".to_string()));
        }

        let mut seen: BTreeMap<String, &str> = BTreeMap::new();
        for col in t.keys.iter().chain(t.values.iter()) {
            if !is_sql_identifier(col) {
                return Err(ScdError::Config(format!("column {col:?} is not an identifier")));
            }
            if let Some(prev) = seen.insert(normalize_column_name(col), col.as_str()) {
                return Err(ScdError::Config(format!(
                    "columns {prev:?} and {col:?} are the same column after normalization"
                )));
            }
        }

        if let Some(cal) = &self.calendar {
            let sources =
                cal.dates.is_some() as u8 + cal.file.is_some() as u8 + cal.nyse.is_some() as u8;
            if sources != 1 {
                return Err(ScdError::Config(
                    "calendar needs exactly one of dates, file, nyse".to_string(),
                ));
            }
        }
        Ok(())
    }

    pub fn schema(&self) -> TableSchema {
        TableSchema::new(
            self.table.name.clone(),
            self.table.keys.clone(),
            self.table.values.clone(),
        )
    }

    /// `None` selects open-ended mode.
    pub fn business_calendar(&self, base_dir: &Path) -> Result<Option<BusinessCalendar>> {
        let Some(cal) = &self.calendar else {
            return Ok(None);
        };
        let calendar = if let Some(dates) = &cal.dates {
            BusinessCalendar::new(dates.clone())?
        } else if let Some(file) = &cal.file {
            let path = if file.is_absolute() {
                file.clone()
            } else {
                base_dir.join(file)
            };
            let text = fs::read_to_string(&path)
                .with_context(|| format!("failed to read calendar file: {}", path.display()))?;
            BusinessCalendar::from_lines(&text)
                .with_context(|| format!("invalid calendar file: {}", path.display()))?
        } else if let Some(range) = &cal.nyse {
            BusinessCalendar::nyse(range.from, range.to)?
        } else {
            return Err(ScdError::Config("calendar has no source".to_string()).into());
        };
        Ok(Some(calendar))
    }

    pub fn options(&self, base_dir: &Path) -> Result<TableOptions> {
        let mut options = TableOptions::new(self.schema())
            .with_presence(self.presence)
            .with_allow_unsynced(self.reads.allow_unsynced);
        if let Some(cal) = self.business_calendar(base_dir)? {
            options = options.with_calendar(cal);
        }
        Ok(options)
    }
}

pub(crate) fn is_sql_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn identifiers() {
        assert!(is_sql_identifier("security_master"));
        assert!(is_sql_identifier("_t1"));
        assert!(!is_sql_identifier("1t"));
        assert!(!is_sql_identifier("drop table"));
        assert!(!is_sql_identifier(""));
    }

    #[test]
    fn defaults_when_optional_sections_missing() {
        let cfg = TableConfig::from_json(&json!({
            "table": {"name": "t", "keys": ["id"]}
        }))
        .unwrap();
        assert_eq!(cfg.presence, PresenceMode::Inferred);
        assert!(!cfg.reads.allow_unsynced);
        assert!(cfg.calendar.is_none());
        assert!(cfg.table.values.is_empty());
    }

    #[test]
    fn normalized_duplicate_columns_rejected() {
        let err = TableConfig::from_json(&json!({
            "table": {"name": "t", "keys": ["security_id"], "values": ["SecurityID"]}
        }))
        .unwrap_err();
        assert!(matches!(err.downcast_ref::<ScdError>(), Some(ScdError::Config(_))));
    }

    #[test]
    fn calendar_needs_exactly_one_source() {
        let err = TableConfig::from_json(&json!({
            "table": {"name": "t", "keys": ["id"]},
            "calendar": {"dates": ["2025-01-02"], "nyse": {"from": "2025-01-01", "to": "2025-01-31"}}
        }))
        .unwrap_err();
        assert!(err.to_string().contains("exactly one"));
    }

    #[test]
    fn inline_dates_build_a_calendar() {
        let cfg = TableConfig::from_json(&json!({
            "table": {"name": "t", "keys": ["id"], "values": ["v"]},
            "calendar": {"dates": ["2025-01-02", "2025-01-03", "2025-01-06"]},
            "presence": "explicit"
        }))
        .unwrap();
        let cal = cfg.business_calendar(Path::new(".")).unwrap().unwrap();
        assert_eq!(cal.len(), 3);
        let opts = cfg.options(Path::new(".")).unwrap();
        assert_eq!(opts.presence, PresenceMode::Explicit);
        assert!(opts.calendar.is_some());
    }
}
