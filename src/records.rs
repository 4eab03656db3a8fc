use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Utc};
use serde_json::{Map, Value};

use crate::models::{StudySessionRecord, DEFAULT_DURATION_SECONDS, DEFAULT_HOUR};

// Lookup order per field: the first key present (and non-null) wins.
const USER_ID: &[&str] = &["userId", "user_id"];
const COURSE_ID: &[&str] = &["courseId", "course_id"];
const METHOD: &[&str] = &["methodUsed", "method_used", "method"];
const DURATION: &[&str] = &["durationSeconds", "duration_seconds", "duration"];
const TAB_SWITCHES: &[&str] = &["tabSwitchCount", "tab_switch_count"];
const COMPLETED: &[&str] = &["completed"];
const STARTED_AT: &[&str] = &["startedAt", "started_at"];
const SOURCE_KEY: &[&str] = &["sourceKey", "source_key", "id"];

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

fn first_present<'a>(object: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .find_map(|key| object.get(*key).filter(|value| !value.is_null()))
}

fn text_field(object: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    match first_present(object, keys)? {
        Value::String(value) => Some(value.clone()),
        Value::Number(value) => Some(value.to_string()),
        _ => None,
    }
}

fn number_field(object: &Map<String, Value>, keys: &[&str]) -> Option<f64> {
    let number = match first_present(object, keys)? {
        Value::Number(value) => value.as_f64(),
        Value::String(value) => value.trim().parse::<f64>().ok(),
        _ => None,
    };
    number.filter(|value| value.is_finite())
}

fn bool_field(object: &Map<String, Value>, keys: &[&str]) -> Option<bool> {
    match first_present(object, keys)? {
        Value::Bool(value) => Some(*value),
        Value::Number(value) => value.as_f64().map(|n| n != 0.0),
        Value::String(value) => match value.trim().to_ascii_lowercase().as_str() {
            "true" | "t" | "1" | "yes" => Some(true),
            "false" | "f" | "0" | "no" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

impl StudySessionRecord {
    /// Builds a record from a loosely-typed JSON object, accepting camelCase
    /// or snake_case keys. Missing or unparsable fields take their defaults.
    pub fn from_json(value: &Value) -> Self {
        let Some(object) = value.as_object() else {
            return Self::default();
        };
        let defaults = Self::default();

        Self {
            user_id: text_field(object, USER_ID),
            course_id: text_field(object, COURSE_ID),
            method: text_field(object, METHOD).unwrap_or(defaults.method),
            duration_seconds: number_field(object, DURATION).unwrap_or(DEFAULT_DURATION_SECONDS),
            tab_switch_count: number_field(object, TAB_SWITCHES)
                .map(|count| count.max(0.0).round() as u32)
                .unwrap_or(0),
            completed: bool_field(object, COMPLETED).unwrap_or(false),
            started_at: text_field(object, STARTED_AT),
        }
    }

    /// Dedup key of an exported session object, if it carries one.
    pub fn source_key(value: &Value) -> Option<String> {
        text_field(value.as_object()?, SOURCE_KEY)
    }

    /// Start time as UTC. Offset-less timestamps are taken to be UTC.
    pub fn started_at_utc(&self) -> Option<DateTime<Utc>> {
        let raw = self.started_at.as_deref()?.trim();
        if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
            return Some(parsed.with_timezone(&Utc));
        }
        NAIVE_FORMATS
            .iter()
            .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
            .map(|naive| naive.and_utc())
    }

    /// Hour of day when the timestamp is long enough to carry one.
    pub fn parsed_hour(&self) -> Option<u32> {
        let started_at = self.started_at.as_deref()?;
        if started_at.len() < 14 {
            return None;
        }
        started_at
            .get(11..13)?
            .parse::<u32>()
            .ok()
            .filter(|hour| *hour < 24)
    }

    pub fn hour(&self) -> u32 {
        self.parsed_hour().unwrap_or(DEFAULT_HOUR)
    }

    /// Day of week, Monday = 0. Defaults to 0 when the timestamp cannot be parsed.
    pub fn weekday(&self) -> u32 {
        self.started_at
            .as_deref()
            .and_then(parse_date)
            .map(|date| date.weekday().num_days_from_monday())
            .unwrap_or(0)
    }
}

fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.date_naive());
    }
    for format in NAIVE_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(parsed.date());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok()
}
