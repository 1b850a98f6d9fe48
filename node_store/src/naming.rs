//! Partition naming: maps an index-name template such as `sentry-{date}` and
//! a calendar day onto a physical index name, and parses the day back out of
//! a physical name.
//!
//! Parsing accepts the grammar
//!
//! ```text
//! name   := prefix year "-" month "-" day ( "-" token )*
//! ```
//!
//! where `prefix` is the template text before `{date}`. Anything after the
//! day (the template suffix, or operator markers like `-fixed` or `-reindex`
//! added during a manual reindex) is ignored.

use chrono::NaiveDate;

use crate::{NodeStoreError, NodeStoreResult};

pub const DATE_PLACEHOLDER: &str = "{date}";
pub const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionNaming {
    prefix: String,
    suffix: String,
}

impl PartitionNaming {
    /// Build from a template that contains `{date}` exactly once.
    pub fn new(template: &str) -> NodeStoreResult<Self> {
        let mut parts = template.split(DATE_PLACEHOLDER);
        let (Some(prefix), Some(suffix), None) = (parts.next(), parts.next(), parts.next()) else {
            return Err(NodeStoreError::InvalidConfig {
                reason: format!(
                    "index template '{}' must contain {} exactly once",
                    template, DATE_PLACEHOLDER
                ),
            });
        };
        Ok(Self {
            prefix: prefix.to_string(),
            suffix: suffix.to_string(),
        })
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Physical partition name for the given calendar day. Stable for the
    /// whole day.
    pub fn write_partition_for(&self, day: NaiveDate) -> String {
        format!("{}{}{}", self.prefix, day.format(DATE_FORMAT), self.suffix)
    }

    /// Glob matching every partition this template can produce.
    pub fn index_pattern(&self) -> String {
        format!("{}*", self.prefix)
    }

    /// Extract the calendar day embedded in a physical partition name.
    pub fn parse_date(&self, name: &str) -> NodeStoreResult<NaiveDate> {
        let unparsable = |reason: &str| NodeStoreError::UnparsableName {
            name: name.to_string(),
            reason: reason.to_string(),
        };

        let rest = name
            .strip_prefix(self.prefix.as_str())
            .ok_or_else(|| unparsable(&format!("missing prefix '{}'", self.prefix)))?;

        let mut tokens = rest.split('-');
        let year = date_token(tokens.next(), 4, 4).ok_or_else(|| unparsable("invalid year"))?;
        let month = date_token(tokens.next(), 1, 2).ok_or_else(|| unparsable("invalid month"))?;
        let day = date_token(tokens.next(), 1, 2).ok_or_else(|| unparsable("invalid day"))?;

        NaiveDate::from_ymd_opt(year as i32, month, day)
            .ok_or_else(|| unparsable("not a calendar date"))
    }
}

fn date_token(token: Option<&str>, min_len: usize, max_len: usize) -> Option<u32> {
    let token = token?;
    if token.len() < min_len || token.len() > max_len || !token.bytes().all(|b| b.is_ascii_digit())
    {
        return None;
    }
    token.parse().ok()
}
