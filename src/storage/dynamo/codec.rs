//! Memory set to `DynamoDB` item conversion.
//!
//! One item per memory set:
//!
//! ```text
//! setId            S                       (hash key)
//! shortTermMemory  L<M{id, prompt, output, timestamp, accessCount,
//!                      decayFactor, embedding: L<N>, concepts: L<S>}>
//! longTermMemory   L<M{id, prompt, output, timestamp, accessCount,
//!                      decayFactor, totalScore}>
//! ```
//!
//! Numbers travel as decimal strings. They are written with Rust's shortest
//! round-trip `f64` formatting, so a reload reproduces every value bit for
//! bit.
//!
//! The service stores numbers that are zero or have a magnitude in
//! `[1e-130, 1e126)`, with at most 38 significant digits, and items of at most
//! [`MAX_ITEM_BYTES`]. [`check_storable`] enforces both limits before a write.

use super::client::Item;
use crate::models::{
    DEFAULT_DECAY_FACTOR, LongTermRecord, MemorySet, SetId, ShortTermRecord, coerce_access_count,
};
use crate::{Error, Result};
use aws_sdk_dynamodb::types::AttributeValue;
use std::collections::HashMap;

/// Hash key attribute.
pub const SET_ID_ATTR: &str = "setId";
/// Short-term record list attribute.
pub const SHORT_TERM_ATTR: &str = "shortTermMemory";
/// Long-term record list attribute.
pub const LONG_TERM_ATTR: &str = "longTermMemory";

/// Largest item the service accepts, in bytes.
pub const MAX_ITEM_BYTES: usize = 400 * 1024;

const MIN_NUMBER_MAGNITUDE: f64 = 1e-130;
const MAX_NUMBER_MAGNITUDE: f64 = 1e126;
const MAX_NUMBER_DIGITS: usize = 38;

const ID: &str = "id";
const PROMPT: &str = "prompt";
const OUTPUT: &str = "output";
const TIMESTAMP: &str = "timestamp";
const ACCESS_COUNT: &str = "accessCount";
const DECAY_FACTOR: &str = "decayFactor";
const EMBEDDING: &str = "embedding";
const CONCEPTS: &str = "concepts";
const TOTAL_SCORE: &str = "totalScore";

/// Builds the primary key for a memory set.
#[must_use]
pub fn key_for(set_id: &SetId) -> Item {
    HashMap::from([(
        SET_ID_ATTR.to_string(),
        AttributeValue::S(set_id.as_str().to_string()),
    )])
}

/// Encodes a whole memory set as one item.
#[must_use]
pub fn encode_item(
    set_id: &SetId,
    short_term: &[ShortTermRecord],
    long_term: &[LongTermRecord],
) -> Item {
    let mut item = key_for(set_id);
    item.insert(
        SHORT_TERM_ATTR.to_string(),
        AttributeValue::L(short_term.iter().map(encode_short_term).collect()),
    );
    item.insert(
        LONG_TERM_ATTR.to_string(),
        AttributeValue::L(long_term.iter().map(encode_long_term).collect()),
    );
    item
}

fn encode_short_term(record: &ShortTermRecord) -> AttributeValue {
    AttributeValue::M(HashMap::from([
        (ID.to_string(), string(&record.id)),
        (PROMPT.to_string(), string(&record.prompt)),
        (OUTPUT.to_string(), string(&record.output)),
        (TIMESTAMP.to_string(), number(record.timestamp)),
        (ACCESS_COUNT.to_string(), count(record.access_count)),
        (DECAY_FACTOR.to_string(), number(record.decay_factor)),
        (
            EMBEDDING.to_string(),
            AttributeValue::L(record.embedding.iter().copied().map(number).collect()),
        ),
        (
            CONCEPTS.to_string(),
            AttributeValue::L(record.concepts.iter().map(|c| string(c)).collect()),
        ),
    ]))
}

fn encode_long_term(record: &LongTermRecord) -> AttributeValue {
    AttributeValue::M(HashMap::from([
        (ID.to_string(), string(&record.id)),
        (PROMPT.to_string(), string(&record.prompt)),
        (OUTPUT.to_string(), string(&record.output)),
        (TIMESTAMP.to_string(), number(record.timestamp)),
        (ACCESS_COUNT.to_string(), count(record.access_count)),
        (DECAY_FACTOR.to_string(), number(record.decay_factor)),
        (TOTAL_SCORE.to_string(), number(record.total_score)),
    ]))
}

fn string(value: &str) -> AttributeValue {
    AttributeValue::S(value.to_string())
}

fn number(value: f64) -> AttributeValue {
    AttributeValue::N(value.to_string())
}

fn count(value: u64) -> AttributeValue {
    AttributeValue::N(value.to_string())
}

/// Checks that the service can store `item`.
///
/// Item size follows the service's accounting: UTF-8 attribute names plus
/// values, numbers by significant digits, and 3 bytes per list or map plus 1
/// per element.
///
/// # Errors
///
/// Returns [`Error::SerializationMismatch`] naming the first number outside
/// the storable range, or the item size when it exceeds [`MAX_ITEM_BYTES`].
pub fn check_storable(item: &Item) -> Result<()> {
    let mut size = 0;
    for (name, value) in item {
        size += name.len()
            + attribute_size(value)
                .map_err(|detail| Error::SerializationMismatch(format!("{name}{detail}")))?;
    }
    if size > MAX_ITEM_BYTES {
        return Err(Error::SerializationMismatch(format!(
            "item is {size} bytes, the limit is {MAX_ITEM_BYTES}"
        )));
    }
    Ok(())
}

/// Size of one attribute value. Errors carry the path below this value.
fn attribute_size(value: &AttributeValue) -> std::result::Result<usize, String> {
    let size = match value {
        AttributeValue::S(text) => text.len(),
        AttributeValue::N(text) => number_size(text)?,
        AttributeValue::B(blob) => blob.as_ref().len(),
        AttributeValue::Ss(values) => values.iter().map(String::len).sum(),
        AttributeValue::Ns(values) => values
            .iter()
            .map(|text| number_size(text))
            .sum::<std::result::Result<usize, String>>()?,
        AttributeValue::Bs(values) => values.iter().map(|blob| blob.as_ref().len()).sum(),
        AttributeValue::L(values) => {
            let mut size = 3;
            for (idx, element) in values.iter().enumerate() {
                size += 1 + attribute_size(element).map_err(|detail| format!("[{idx}]{detail}"))?;
            }
            size
        },
        AttributeValue::M(map) => {
            let mut size = 3;
            for (name, element) in map {
                size += 1
                    + name.len()
                    + attribute_size(element).map_err(|detail| format!(".{name}{detail}"))?;
            }
            size
        },
        _ => 1,
    };
    Ok(size)
}

fn number_size(text: &str) -> std::result::Result<usize, String> {
    let text = text.trim();
    let value: f64 = text
        .parse()
        .map_err(|_| format!(": '{text}' is not a number"))?;
    let magnitude = value.abs();
    if !value.is_finite()
        || (magnitude > 0.0 && !(MIN_NUMBER_MAGNITUDE..MAX_NUMBER_MAGNITUDE).contains(&magnitude))
    {
        return Err(format!(": {value:e} is outside the storable number range"));
    }

    let mantissa = text.split(['e', 'E']).next().unwrap_or_default();
    let digits: String = mantissa.chars().filter(char::is_ascii_digit).collect();
    let significant = digits.trim_matches('0').len().max(1);
    if significant > MAX_NUMBER_DIGITS {
        return Err(format!(
            ": '{text}' has {significant} significant digits, at most {MAX_NUMBER_DIGITS} are stored"
        ));
    }
    Ok(significant.div_ceil(2) + 1)
}

/// Decodes a stored item into a memory set.
///
/// A missing `decayFactor` decodes as [`DEFAULT_DECAY_FACTOR`]; every other
/// attribute is required.
///
/// # Errors
///
/// Returns [`Error::SerializationMismatch`] if an attribute is missing, has
/// the wrong type, or holds a number the record cannot represent.
pub fn decode_item(item: &Item) -> Result<MemorySet> {
    let root = Fields::new(item, "item");
    let short_term = root
        .list(SHORT_TERM_ATTR)?
        .iter()
        .enumerate()
        .map(|(idx, value)| {
            let context = format!("{SHORT_TERM_ATTR}[{idx}]");
            decode_short_term(as_map(value, &context)?, &context)
        })
        .collect::<Result<Vec<_>>>()?;
    let long_term = root
        .list(LONG_TERM_ATTR)?
        .iter()
        .enumerate()
        .map(|(idx, value)| {
            let context = format!("{LONG_TERM_ATTR}[{idx}]");
            decode_long_term(as_map(value, &context)?, &context)
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(MemorySet::new(short_term, long_term))
}

fn decode_short_term(map: &Item, context: &str) -> Result<ShortTermRecord> {
    let fields = Fields::new(map, context);
    Ok(ShortTermRecord {
        id: fields.string(ID)?,
        prompt: fields.string(PROMPT)?,
        output: fields.string(OUTPUT)?,
        timestamp: fields.number(TIMESTAMP)?,
        access_count: fields.count(ACCESS_COUNT)?,
        decay_factor: fields.decay_factor()?,
        embedding: fields.numbers(EMBEDDING)?,
        concepts: fields.strings(CONCEPTS)?,
    })
}

fn decode_long_term(map: &Item, context: &str) -> Result<LongTermRecord> {
    let fields = Fields::new(map, context);
    Ok(LongTermRecord {
        id: fields.string(ID)?,
        prompt: fields.string(PROMPT)?,
        output: fields.string(OUTPUT)?,
        timestamp: fields.number(TIMESTAMP)?,
        access_count: fields.count(ACCESS_COUNT)?,
        decay_factor: fields.decay_factor()?,
        total_score: fields.number(TOTAL_SCORE)?,
    })
}

fn as_map<'a>(value: &'a AttributeValue, context: &str) -> Result<&'a Item> {
    value
        .as_m()
        .map_err(|_| mismatch(context, "expected a map attribute"))
}

fn mismatch(context: &str, detail: &str) -> Error {
    Error::SerializationMismatch(format!("{context}: {detail}"))
}

fn parse_number(text: &str, context: &str) -> Result<f64> {
    text.trim()
        .parse::<f64>()
        .map_err(|_| mismatch(context, &format!("'{text}' is not a number")))
}

fn parse_count(text: &str, context: &str) -> Result<u64> {
    if let Ok(value) = text.trim().parse::<u64>() {
        return Ok(value);
    }
    // The service may normalize integers as decimals ("3.0", "3E0").
    coerce_access_count(parse_number(text, context)?)
        .map_err(|e| mismatch(context, &e.to_string()))
}

/// Typed attribute access for one map, with error context.
struct Fields<'a> {
    map: &'a Item,
    context: &'a str,
}

impl<'a> Fields<'a> {
    const fn new(map: &'a Item, context: &'a str) -> Self {
        Self { map, context }
    }

    fn get(&self, name: &str) -> Result<&'a AttributeValue> {
        self.map
            .get(name)
            .ok_or_else(|| self.error(name, "missing attribute"))
    }

    fn error(&self, name: &str, detail: &str) -> Error {
        mismatch(&format!("{}.{name}", self.context), detail)
    }

    fn string(&self, name: &str) -> Result<String> {
        self.get(name)?
            .as_s()
            .cloned()
            .map_err(|_| self.error(name, "expected a string attribute"))
    }

    fn number(&self, name: &str) -> Result<f64> {
        let text = self
            .get(name)?
            .as_n()
            .map_err(|_| self.error(name, "expected a number attribute"))?;
        parse_number(text, &format!("{}.{name}", self.context))
    }

    fn count(&self, name: &str) -> Result<u64> {
        let text = self
            .get(name)?
            .as_n()
            .map_err(|_| self.error(name, "expected a number attribute"))?;
        parse_count(text, &format!("{}.{name}", self.context))
    }

    fn decay_factor(&self) -> Result<f64> {
        if self.map.contains_key(DECAY_FACTOR) {
            self.number(DECAY_FACTOR)
        } else {
            Ok(DEFAULT_DECAY_FACTOR)
        }
    }

    fn list(&self, name: &str) -> Result<&'a Vec<AttributeValue>> {
        self.get(name)?
            .as_l()
            .map_err(|_| self.error(name, "expected a list attribute"))
    }

    fn numbers(&self, name: &str) -> Result<Vec<f64>> {
        let context = format!("{}.{name}", self.context);
        self.list(name)?
            .iter()
            .map(|value| {
                let text = value
                    .as_n()
                    .map_err(|_| mismatch(&context, "expected a list of numbers"))?;
                parse_number(text, &context)
            })
            .collect()
    }

    fn strings(&self, name: &str) -> Result<Vec<String>> {
        self.list(name)?
            .iter()
            .map(|value| {
                value
                    .as_s()
                    .cloned()
                    .map_err(|_| self.error(name, "expected a list of strings"))
            })
            .collect()
    }
}
