//! Parsing and formatting helpers shared by the SCPI-style drivers

use std::fmt;
use crate::error::{ Error, Result };

/// An on/off setting as it is written on the wire (`1`/`0`)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Switch(pub bool);

impl fmt::Display for Switch
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        f.write_str(if self.0 { "1" } else { "0" })
    }
}

/// Interprets the many ways instruments report a boolean
///
/// Accepts `1`/`0`, `1.0`/`0.0`, `on`/`off` and `true`/`false` in any case.
pub fn parse_bool(reply: &str) -> Result<bool>
{
    let cleaned = clean_reply(reply).to_ascii_lowercase();

    match cleaned.as_str() {
        "1" | "on" | "true" => Ok(true),
        "0" | "off" | "false" => Ok(false),
        other => match other.parse::<f64>() {
            Ok(value) if value == 1.0 => Ok(true),
            Ok(value) if value == 0.0 => Ok(false),
            _ => Err(Error::parse(reply, "a boolean (1/0, ON/OFF)")),
        },
    }
}

/// Strips whitespace and quotes from a reply and expands Keithley's abbreviations
pub fn clean_reply(reply: &str) -> String
{
    let mut cleaned = reply.trim();

    if cleaned.len() >= 2 {
        let first = cleaned.as_bytes()[0];
        let last = cleaned.as_bytes()[cleaned.len() - 1];
        if first == last && (first == b'"' || first == b'\'') {
            cleaned = &cleaned[1..cleaned.len() - 1];
        }
    }

    let cleaned = match cleaned.to_ascii_lowercase().as_str() {
        "mov" => "moving",
        "rep" => "repeat",
        _ => cleaned,
    };

    cleaned.strip_suffix(":DC").unwrap_or(cleaned).to_owned()
}

pub fn parse_f64(reply: &str) -> Result<f64>
{
    clean_reply(reply)
        .parse::<f64>()
        .map_err(|_| Error::parse(reply, "a number"))
}

/// Parses an integer, tolerating instruments which report integers as `1.000000E+00`
pub fn parse_i64(reply: &str) -> Result<i64>
{
    let cleaned = clean_reply(reply);

    match cleaned.parse::<i64>() {
        Ok(value) => Ok(value),
        Err(_) => match cleaned.parse::<f64>() {
            Ok(value) if value.fract() == 0.0 && value.abs() < i64::MAX as f64 => Ok(value as i64),
            _ => Err(Error::parse(reply, "an integer")),
        },
    }
}

/// Rejects `value` unless it lies in `[min, max]`
pub fn check_range(name: &'static str, value: f64, min: f64, max: f64) -> Result<f64>
{
    if value >= min && value <= max {
        Ok(value)
    }
    else {
        Err(Error::OutOfRange {
            name: name,
            value: value,
            min: min,
            max: max,
        })
    }
}

/// Rounds to a fixed number of decimal places, as some front panels only take so many digits
pub fn round_to(value: f64, decimals: i32) -> f64
{
    let scale = 10f64.powi(decimals);
    (value * scale).round() / scale
}

/// The identification block returned by `*IDN?`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Idn
{
    pub vendor: Option<String>,
    pub model: Option<String>,
    pub serial: Option<String>,
    pub firmware: Option<String>,
}

impl Idn
{
    /// Splits an identification string into its four fields
    ///
    /// The fields are supposed to be comma separated but some instruments use `;` or `:`. The
    /// first separator which splits the string is used, into at most four parts so nothing is
    /// lost from the firmware field.
    pub fn parse(reply: &str) -> Self
    {
        let reply = reply.trim();
        let mut parts: Vec<String> = vec![reply.to_owned()];

        for separator in [',', ';', ':'] {
            let split: Vec<String> = reply.splitn(4, separator).map(|part| part.trim().to_owned()).collect();
            if split.len() > 1 {
                parts = split;
                break;
            }
        }

        let mut parts = parts.into_iter().map(|part| if part.is_empty() { None } else { Some(part) });
        let vendor = parts.next().flatten();
        let model = parts.next().flatten().map(|model| {
            if model.to_ascii_lowercase().starts_with("model") {
                model[5..].trim().to_owned()
            }
            else {
                model
            }
        });

        Self {
            vendor: vendor,
            model: model,
            serial: parts.next().flatten(),
            firmware: parts.next().flatten(),
        }
    }
}

impl fmt::Display for Idn
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        let field = |field: &Option<String>| field.clone().unwrap_or_else(|| "?".to_owned());
        write!(
            f,
            "{}, {}, {}, {}",
            field(&self.vendor),
            field(&self.model),
            field(&self.serial),
            field(&self.firmware)
        )
    }
}
