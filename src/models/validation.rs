//! Record and memory set validation.
//!
//! Every save runs these checks before anything is written, so a rejected
//! set never reaches a backend. Loads run them too: a stored item that breaks
//! an invariant is reported rather than handed to the caller.

use super::history::{LongTermRecord, ShortTermRecord};
use crate::{Error, Result};
use std::collections::HashSet;

/// Converts a loosely typed numeric access counter into a count.
///
/// # Errors
///
/// Returns [`Error::SerializationMismatch`] if the value is not finite, is
/// negative, has a fractional part, or does not fit in a `u64`.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
pub fn coerce_access_count(value: f64) -> Result<u64> {
    if !value.is_finite() || value < 0.0 {
        return Err(Error::SerializationMismatch(format!(
            "access count must be a non-negative integer, got {value}"
        )));
    }
    if value.fract() != 0.0 {
        return Err(Error::SerializationMismatch(format!(
            "access count must be integral, got {value}"
        )));
    }
    if value >= u64::MAX as f64 {
        return Err(Error::SerializationMismatch(format!(
            "access count {value} is out of range"
        )));
    }
    Ok(value as u64)
}

/// Validates a short-term and long-term sequence as one memory set.
///
/// Checks, in order: per-record fields, id uniqueness within each sequence,
/// and a single embedding length across the short-term sequence.
///
/// # Errors
///
/// Returns [`Error::SerializationMismatch`] describing the first violation.
pub fn validate_history(short_term: &[ShortTermRecord], long_term: &[LongTermRecord]) -> Result<()> {
    let mut seen = HashSet::with_capacity(short_term.len());
    let mut dimensions = None;
    for record in short_term {
        validate_short_term(record)?;
        if !seen.insert(record.id.as_str()) {
            return Err(duplicate_id("short-term", &record.id));
        }
        match dimensions {
            None => dimensions = Some(record.embedding.len()),
            Some(expected) if expected != record.embedding.len() => {
                return Err(Error::SerializationMismatch(format!(
                    "short-term record '{}' has an embedding of length {}, expected {expected}",
                    record.id,
                    record.embedding.len()
                )));
            },
            Some(_) => {},
        }
    }

    let mut seen = HashSet::with_capacity(long_term.len());
    for record in long_term {
        validate_long_term(record)?;
        if !seen.insert(record.id.as_str()) {
            return Err(duplicate_id("long-term", &record.id));
        }
    }

    Ok(())
}

fn validate_short_term(record: &ShortTermRecord) -> Result<()> {
    check_finite(&record.id, "timestamp", record.timestamp)?;
    check_decay_factor(&record.id, record.decay_factor)?;
    if let Some(position) = record.embedding.iter().position(|v| !v.is_finite()) {
        return Err(Error::SerializationMismatch(format!(
            "record '{}' has a non-finite embedding value at position {position}",
            record.id
        )));
    }
    if record.concepts.iter().any(String::is_empty) {
        return Err(Error::SerializationMismatch(format!(
            "record '{}' has an empty concept",
            record.id
        )));
    }
    Ok(())
}

fn validate_long_term(record: &LongTermRecord) -> Result<()> {
    check_finite(&record.id, "timestamp", record.timestamp)?;
    check_finite(&record.id, "totalScore", record.total_score)?;
    check_decay_factor(&record.id, record.decay_factor)
}

fn check_finite(id: &str, field: &str, value: f64) -> Result<()> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(Error::SerializationMismatch(format!(
            "record '{id}' has a non-finite {field}: {value}"
        )))
    }
}

fn check_decay_factor(id: &str, value: f64) -> Result<()> {
    // NaN fails both comparisons.
    if value > 0.0 && value <= 1.0 {
        Ok(())
    } else {
        Err(Error::SerializationMismatch(format!(
            "record '{id}' has decay factor {value}, expected a value in (0, 1]"
        )))
    }
}

fn duplicate_id(tier: &str, id: &str) -> Error {
    Error::SerializationMismatch(format!("duplicate {tier} record id '{id}'"))
}
