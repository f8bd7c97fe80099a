//! Query-string grammar.
//!
//! # Responsibility
//! - Turn `key:value[,value...]` tokens into a strongly-typed [`Query`].
//! - Report recoverable oddities as warnings instead of failing.
//!
//! # Invariants
//! - Parsing is pure: no I/O, and the clock is an explicit input.
//! - Only a malformed `from`/`to` value rejects the whole query.
//! - Repeated `source:`/`tag:` keys extend the set; repeated `from:`/`to:`
//!   keys keep the last value.

use super::filter::Query;
use crate::model::item::normalize_tag;
use crate::model::source::Source;
use chrono::{Duration, Local, NaiveDate, NaiveDateTime, NaiveTime};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};

static ABSOLUTE_DATE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").expect("valid absolute date regex"));
static RELATIVE_DATE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([+-]?)(\d{1,6})([dwmy])$").expect("valid relative date regex"));

const DATE_FORMAT_HINT: &str = "expected YYYY-MM-DD, [+-]N(d|w|m|y) or now";

/// Recognized query keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum QueryKey {
    Source,
    Tag,
    From,
    To,
}

impl QueryKey {
    pub fn parse(value: &str) -> Option<QueryKey> {
        match value {
            "source" => Some(Self::Source),
            "tag" => Some(Self::Tag),
            "from" => Some(Self::From),
            "to" => Some(Self::To),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Source => "source",
            Self::Tag => "tag",
            Self::From => "from",
            Self::To => "to",
        }
    }
}

/// Fatal parse failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryParseError {
    /// `from`/`to` value is not a usable date. `token` is the full input token.
    MalformedDate { token: String, reason: String },
}

impl Display for QueryParseError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MalformedDate { token, reason } => {
                write!(f, "malformed date in `{token}`: {reason}")
            }
        }
    }
}

impl Error for QueryParseError {}

/// Non-fatal parse findings, surfaced to the caller for observability.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryWarning {
    /// Source name did not match any known source and was dropped.
    UnknownSource(String),
    /// Token without `key:` shape or with an unknown key; ignored.
    UnrecognizedToken(String),
    /// `from` is after `to`; the query can match nothing.
    InvertedDateRange,
}

impl Display for QueryWarning {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownSource(name) => write!(f, "unknown source `{name}` ignored"),
            Self::UnrecognizedToken(token) => write!(f, "unrecognized token `{token}` ignored"),
            Self::InvertedDateRange => f.write_str("`from` is after `to`; nothing can match"),
        }
    }
}

/// Successful parse result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedQuery {
    pub query: Query,
    pub warnings: Vec<QueryWarning>,
}

/// One `key:values` occurrence as written by the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawField {
    pub token: String,
    pub values: Vec<String>,
}

/// Intermediate parse state: recognized key to raw value lists.
///
/// Tokenizing never fails; typing the values happens in [`RawQuery::resolve`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawQuery {
    pub fields: BTreeMap<QueryKey, Vec<RawField>>,
    pub ignored: Vec<String>,
}

impl RawQuery {
    pub fn tokenize(raw: &str) -> RawQuery {
        let mut parsed = RawQuery::default();
        for token in raw.split_whitespace() {
            let Some((key, value)) = token.split_once(':') else {
                parsed.ignored.push(token.to_string());
                continue;
            };
            let Some(key) = QueryKey::parse(key.trim().to_ascii_lowercase().as_str()) else {
                parsed.ignored.push(token.to_string());
                continue;
            };
            let values = value
                .split(',')
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(str::to_string)
                .collect();
            parsed.fields.entry(key).or_default().push(RawField {
                token: token.to_string(),
                values,
            });
        }
        parsed
    }

    fn values(&self, key: QueryKey) -> impl Iterator<Item = &String> + '_ {
        self.fields
            .get(&key)
            .into_iter()
            .flatten()
            .flat_map(|field| field.values.iter())
    }

    /// Types the raw values against `now` (used by relative dates).
    pub fn resolve(&self, now: NaiveDateTime) -> Result<ParsedQuery, QueryParseError> {
        let mut query = Query::all();
        let mut warnings: Vec<QueryWarning> = self
            .ignored
            .iter()
            .map(|token| QueryWarning::UnrecognizedToken(token.clone()))
            .collect();

        for name in self.values(QueryKey::Source) {
            match Source::parse(name) {
                Some(source) => {
                    query.sources.insert(source);
                }
                None => warnings.push(QueryWarning::UnknownSource(name.clone())),
            }
        }

        query
            .tags
            .extend(self.values(QueryKey::Tag).filter_map(|tag| normalize_tag(tag)));

        for field in self.fields.get(&QueryKey::From).into_iter().flatten() {
            query.from_date = Some(resolve_bound(field, now, BoundKind::Start)?);
        }
        for field in self.fields.get(&QueryKey::To).into_iter().flatten() {
            query.to_date = Some(resolve_bound(field, now, BoundKind::End)?);
        }

        if let (Some(from), Some(to)) = (query.from_date, query.to_date) {
            if from > to {
                warnings.push(QueryWarning::InvertedDateRange);
            }
        }

        Ok(ParsedQuery { query, warnings })
    }
}

/// Parses `raw` using the local clock for relative dates.
pub fn parse_query(raw: &str) -> Result<ParsedQuery, QueryParseError> {
    parse_query_at(raw, Local::now().naive_local())
}

/// Parses `raw` with an explicit `now`. Pure.
///
/// An empty or whitespace-only input yields the query matching everything.
pub fn parse_query_at(raw: &str, now: NaiveDateTime) -> Result<ParsedQuery, QueryParseError> {
    RawQuery::tokenize(raw).resolve(now)
}

#[derive(Clone, Copy)]
enum BoundKind {
    Start,
    End,
}

fn resolve_bound(
    field: &RawField,
    now: NaiveDateTime,
    kind: BoundKind,
) -> Result<NaiveDateTime, QueryParseError> {
    let malformed = |reason: String| QueryParseError::MalformedDate {
        token: field.token.clone(),
        reason,
    };

    let [value] = field.values.as_slice() else {
        return Err(malformed(format!(
            "expected exactly one value, {DATE_FORMAT_HINT}"
        )));
    };

    let instant = parse_date_value(value, now).ok_or_else(|| malformed(DATE_FORMAT_HINT.into()))?;
    let is_absolute = ABSOLUTE_DATE_RE.is_match(value);

    Ok(match kind {
        // Relative `from` values are instants; absolute ones start the day.
        BoundKind::Start if is_absolute => instant.date().and_time(NaiveTime::MIN),
        BoundKind::Start => instant,
        // `to` always covers its whole calendar day.
        BoundKind::End => end_of_day(instant.date())
            .ok_or_else(|| malformed("date is out of the supported range".into()))?,
    })
}

fn parse_date_value(value: &str, now: NaiveDateTime) -> Option<NaiveDateTime> {
    let lowered = value.to_ascii_lowercase();
    if lowered == "now" {
        return Some(now);
    }

    if ABSOLUTE_DATE_RE.is_match(&lowered) {
        return NaiveDate::parse_from_str(&lowered, "%Y-%m-%d")
            .ok()
            .map(|date| date.and_time(NaiveTime::MIN));
    }

    let caps = RELATIVE_DATE_RE.captures(&lowered)?;
    let amount: i64 = caps.get(2)?.as_str().parse().ok()?;
    let signed = if caps.get(1).map(|m| m.as_str()) == Some("-") {
        -amount
    } else {
        amount
    };
    let offset = match caps.get(3)?.as_str() {
        "d" => Duration::try_days(signed)?,
        "w" => Duration::try_weeks(signed)?,
        "m" => Duration::try_days(signed * 30)?,
        "y" => Duration::try_days(signed * 365)?,
        _ => return None,
    };
    now.checked_add_signed(offset)
}

/// Last representable instant of `date`; never overflows, even on `NaiveDate::MAX`.
fn end_of_day(date: NaiveDate) -> Option<NaiveDateTime> {
    date.and_hms_nano_opt(23, 59, 59, 999_999_999)
}

#[cfg(test)]
mod tests {
    use super::{end_of_day, parse_date_value, QueryKey, RawQuery};
    use chrono::NaiveDate;

    fn now() -> chrono::NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 6, 15)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    #[test]
    fn tokenize_groups_values_by_key_and_keeps_tokens() {
        let raw = RawQuery::tokenize("tag:a,b bogus source:notes tag:c color:red");
        let tags = &raw.fields[&QueryKey::Tag];
        assert_eq!(tags.len(), 2);
        assert_eq!(tags[0].token, "tag:a,b");
        assert_eq!(tags[0].values, vec!["a", "b"]);
        assert_eq!(tags[1].values, vec!["c"]);
        assert_eq!(raw.ignored, vec!["bogus", "color:red"]);
    }

    #[test]
    fn tokenize_drops_empty_comma_segments() {
        let raw = RawQuery::tokenize("tag:a,,b,");
        assert_eq!(raw.fields[&QueryKey::Tag][0].values, vec!["a", "b"]);
    }

    #[test]
    fn relative_dates_resolve_against_now() {
        let base = now();
        assert_eq!(parse_date_value("now", base), Some(base));
        assert_eq!(
            parse_date_value("-7d", base),
            Some(base - chrono::Duration::days(7))
        );
        assert_eq!(
            parse_date_value("+2w", base),
            Some(base + chrono::Duration::days(14))
        );
        assert_eq!(
            parse_date_value("1m", base),
            Some(base + chrono::Duration::days(30))
        );
        assert_eq!(
            parse_date_value("-1y", base),
            Some(base - chrono::Duration::days(365))
        );
    }

    #[test]
    fn end_of_day_holds_on_the_last_representable_date() {
        let last = end_of_day(NaiveDate::MAX).unwrap();
        assert_eq!(last.date(), NaiveDate::MAX);
        assert_eq!(last, NaiveDate::MAX.and_hms_nano_opt(23, 59, 59, 999_999_999).unwrap());
    }

    #[test]
    fn rejects_non_calendar_and_loose_dates() {
        assert!(parse_date_value("2024-13-01", now()).is_none());
        assert!(parse_date_value("2024-02-30", now()).is_none());
        assert!(parse_date_value("2024-1-1", now()).is_none());
        assert!(parse_date_value("yesterday", now()).is_none());
        assert!(parse_date_value("-7x", now()).is_none());
    }
}
