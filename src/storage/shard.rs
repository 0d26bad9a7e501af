//! Prefix shards: per-prefix inverted-index fragments merged in place.

use super::protocol::{MergeStats, Posting, TermBatch};
use crate::codec::Value;
use crate::error::Result;
use crate::node::{from_value, to_value};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TermRecord {
    /// Number of distinct documents recorded under the term.
    pub df: u64,
    pub postings: BTreeMap<String, Posting>,
}

/// term -> record
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PrefixShard {
    pub terms: BTreeMap<String, TermRecord>,
}

impl PrefixShard {
    pub fn from_value(value: &Value) -> Result<Self> {
        from_value(value)
    }

    pub fn to_value(&self) -> Value {
        to_value(self)
    }

    /// Merges a term batch. A document seen for the first time under a term
    /// bumps its `df`; a known one only has its posting refreshed.
    pub fn merge(&mut self, batch: TermBatch) -> MergeStats {
        let mut stats = MergeStats {
            prefixes: 1,
            ..MergeStats::default()
        };
        for (term, postings) in batch {
            stats.terms += 1;
            let record = self.terms.entry(term).or_default();
            for posting in postings {
                match record.postings.insert(posting.document.clone(), posting) {
                    Some(_) => stats.updated_postings += 1,
                    None => {
                        record.df += 1;
                        stats.new_postings += 1;
                    }
                }
            }
        }
        stats
    }

    pub fn term(&self, term: &str) -> Option<&TermRecord> {
        self.terms.get(term)
    }
}

/// Namespace holding the shards of `gid`, kept apart from its plain keys.
pub fn shard_namespace(gid: &str) -> String {
    format!("{}.shards", gid)
}
