use crate::utils::error::{HarvestError, Result};
use crate::utils::validation::validate_iso_date;
use chrono::{Months, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Ordered field map shared by nested and flattened records.
pub type Fields = serde_json::Map<String, serde_json::Value>;

/// One message or report line as received from the API.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record {
    pub data: Fields,
}

impl Record {
    pub fn new(data: Fields) -> Self {
        Self { data }
    }

    /// 只接受 JSON 物件，其餘回傳 None
    pub fn from_value(value: serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Object(data) => Some(Self { data }),
            _ => None,
        }
    }
}

/// A record after flattening: delimiter-joined keys, no nested objects.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FlatRecord {
    pub data: Fields,
}

impl FlatRecord {
    pub fn new(data: Fields) -> Self {
        Self { data }
    }

    pub fn get(&self, column: &str) -> Option<&serde_json::Value> {
        self.data.get(column)
    }

    pub fn columns(&self) -> impl Iterator<Item = &String> {
        self.data.keys()
    }
}

/// Body of `GET /messages?startrow=&maxrows=`.
#[derive(Debug, Clone, Deserialize)]
pub struct MessagePage {
    pub total: u64,
    pub messages: Vec<Record>,
}

#[derive(Debug, Clone)]
pub struct TransformResult {
    pub records: Vec<Record>,
    pub flat_records: Vec<FlatRecord>,
    pub csv_output: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    Json,
    Excel,
}

impl ReportFormat {
    pub fn query_value(&self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Excel => "excel",
        }
    }

    pub fn accept_header(&self) -> &'static str {
        match self {
            Self::Json => "application/json",
            Self::Excel => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Excel => "xlsx",
        }
    }

    /// Structured formats get a derived CSV next to the download.
    pub fn is_structured(&self) -> bool {
        matches!(self, Self::Json)
    }
}

impl fmt::Display for ReportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.query_value())
    }
}

/// Inclusive report filter `{from, to}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

impl DateRange {
    pub fn new(from: NaiveDate, to: NaiveDate) -> Result<Self> {
        if from > to {
            return Err(HarvestError::precondition(format!(
                "start date {} is after end date {}",
                from, to
            )));
        }
        Ok(Self { from, to })
    }

    /// Both dates or neither; each must be `YYYY-MM-DD`.
    pub fn parse(from: Option<&str>, to: Option<&str>) -> Result<Option<Self>> {
        match (from, to) {
            (None, None) => Ok(None),
            (Some(from), Some(to)) => {
                let from = validate_iso_date("from", from)?;
                let to = validate_iso_date("to", to)?;
                Self::new(from, to).map(Some)
            }
            (Some(_), None) | (None, Some(_)) => Err(HarvestError::precondition(
                "start date and end date must be given together",
            )),
        }
    }

    /// Splits `[start, end]` into consecutive calendar-month ranges.
    ///
    /// Boundaries are `start`, `start + 1 month`, ... up to `end`; each range
    /// ends on the date the next one starts. A span shorter than one month
    /// yields no ranges.
    pub fn monthly(start: NaiveDate, end: NaiveDate) -> Result<Vec<Self>> {
        if start > end {
            return Err(HarvestError::precondition(format!(
                "start month {} is after end month {}",
                start, end
            )));
        }

        let mut boundaries = vec![start];
        for step in 1u32.. {
            let next = start.checked_add_months(Months::new(step)).ok_or_else(|| {
                HarvestError::precondition(format!("month arithmetic overflow after {}", start))
            })?;
            if next > end {
                break;
            }
            boundaries.push(next);
        }

        Ok(boundaries
            .windows(2)
            .map(|pair| Self {
                from: pair[0],
                to: pair[1],
            })
            .collect())
    }

    pub fn filename_suffix(&self) -> String {
        format!("_{}_{}", self.from.format("%Y-%m-%d"), self.to.format("%Y-%m-%d"))
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.from.format("%Y-%m-%d"), self.to.format("%Y-%m-%d"))
    }
}
