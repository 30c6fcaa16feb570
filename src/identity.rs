//! Composite resource identity
//!
//! A managed schedule is identified by several fields (project and cluster).
//! They are packed into one opaque token that is persisted as the resource's
//! `stateId` and decoded again for lookups, imports and destroy checks.
//!
//! Token format: every field name and value is base64 encoded, written as
//! `name:value`, sorted by name and joined with `-`. Neither separator can
//! appear inside standard base64, so decoding never has to guess.

use std::collections::BTreeMap;
use std::fmt;

use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Field name holding the project ID
pub const PROJECT_ID_FIELD: &str = "project_id";

/// Field name holding the cluster name
pub const CLUSTER_NAME_FIELD: &str = "cluster_name";

const PAIR_SEPARATOR: char = '-';
const KEY_VALUE_SEPARATOR: char = ':';

/// Encode a set of named fields into an opaque identity token
pub fn encode<'a, I>(fields: I) -> String
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let sorted: BTreeMap<&str, &str> = fields.into_iter().collect();

    sorted
        .into_iter()
        .map(|(name, value)| {
            format!(
                "{}{}{}",
                STANDARD.encode(name),
                KEY_VALUE_SEPARATOR,
                STANDARD.encode(value)
            )
        })
        .collect::<Vec<_>>()
        .join(&PAIR_SEPARATOR.to_string())
}

/// Decode an identity token back into its named fields
pub fn decode(token: &str) -> Result<BTreeMap<String, String>> {
    if token.is_empty() {
        return Err(Error::malformed_identity(token, "token is empty"));
    }

    let mut fields = BTreeMap::new();
    for segment in token.split(PAIR_SEPARATOR) {
        let mut parts = segment.split(KEY_VALUE_SEPARATOR);
        let (Some(name), Some(value), None) = (parts.next(), parts.next(), parts.next()) else {
            return Err(Error::malformed_identity(
                token,
                format!("segment '{}' is not a name:value pair", segment),
            ));
        };

        let name = decode_part(token, name)?;
        let value = decode_part(token, value)?;
        if fields.insert(name.clone(), value).is_some() {
            return Err(Error::malformed_identity(
                token,
                format!("field '{}' appears more than once", name),
            ));
        }
    }

    Ok(fields)
}

fn decode_part(token: &str, part: &str) -> Result<String> {
    let bytes = STANDARD
        .decode(part)
        .map_err(|e| Error::malformed_identity(token, format!("invalid base64 '{}': {}", part, e)))?;
    String::from_utf8(bytes)
        .map_err(|e| Error::malformed_identity(token, format!("invalid UTF-8: {}", e)))
}

/// Identity of one managed backup schedule
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleKey {
    pub project_id: String,
    pub cluster_name: String,
}

impl ScheduleKey {
    pub fn new(project_id: impl Into<String>, cluster_name: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            cluster_name: cluster_name.into(),
        }
    }

    /// Encode into the persisted identity token
    pub fn state_id(&self) -> String {
        encode([
            (PROJECT_ID_FIELD, self.project_id.as_str()),
            (CLUSTER_NAME_FIELD, self.cluster_name.as_str()),
        ])
    }

    /// Decode a persisted identity token
    pub fn from_state_id(token: &str) -> Result<Self> {
        let mut fields = decode(token)?;
        let mut take = |field: &str| {
            fields
                .remove(field)
                .filter(|v| !v.is_empty())
                .ok_or_else(|| Error::malformed_identity(token, format!("missing field '{}'", field)))
        };

        let project_id = take(PROJECT_ID_FIELD)?;
        let cluster_name = take(CLUSTER_NAME_FIELD)?;
        Ok(Self {
            project_id,
            cluster_name,
        })
    }
}

impl fmt::Display for ScheduleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.project_id, self.cluster_name)
    }
}

/// Parse a user-supplied import ID.
///
/// Accepts either an encoded state token or the short form
/// `<projectID>-<clusterName>`. Project IDs are hex and never contain `-`,
/// so the short form splits on the first one.
pub fn parse_import_id(id: &str) -> Result<ScheduleKey> {
    if id.contains(KEY_VALUE_SEPARATOR) {
        return ScheduleKey::from_state_id(id);
    }

    match id.split_once(PAIR_SEPARATOR) {
        Some((project_id, cluster_name)) if !project_id.is_empty() && !cluster_name.is_empty() => {
            Ok(ScheduleKey::new(project_id, cluster_name))
        }
        _ => Err(Error::malformed_identity(
            id,
            "expected an encoded state ID or '<projectID>-<clusterName>'",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let pairs = [
            ("5f1e2d3c4b5a697887766554", "test-acc-abcdefghij"),
            ("p", "c"),
            ("project with spaces", "cluster:with:colons"),
            ("ünïcödé", "cluster-with-many-dashes-"),
        ];

        for (project, cluster) in pairs {
            let key = ScheduleKey::new(project, cluster);
            let decoded = ScheduleKey::from_state_id(&key.state_id()).unwrap();
            assert_eq!(decoded, key);
        }
    }

    #[test]
    fn test_encode_is_order_independent() {
        let a = encode([("project_id", "p"), ("cluster_name", "c")]);
        let b = encode([("cluster_name", "c"), ("project_id", "p")]);
        assert_eq!(a, b);
    }

    #[test]
    fn test_known_encoding() {
        let key = ScheduleKey::new("p1", "c1");
        // cluster_name sorts before project_id
        assert_eq!(key.state_id(), "Y2x1c3Rlcl9uYW1l:YzE=-cHJvamVjdF9pZA==:cDE=");
    }

    #[test]
    fn test_decode_rejects_malformed_tokens() {
        for token in ["", "abc", "YQ==:Yg==:Yw==", "YQ==:Yg==-", "!!!:Yg=="] {
            let err = decode(token).unwrap_err();
            assert!(
                matches!(err, Error::MalformedIdentity { .. }),
                "token {:?} gave {:?}",
                token,
                err
            );
        }
    }

    #[test]
    fn test_decode_rejects_duplicate_fields() {
        let token = format!("{}-{}", encode([("a", "1")]), encode([("a", "2")]));
        assert!(decode(&token).is_err());
    }

    #[test]
    fn test_from_state_id_requires_both_fields() {
        let token = encode([("project_id", "p")]);
        let err = ScheduleKey::from_state_id(&token).unwrap_err();
        assert!(err.to_string().contains("cluster_name"));
    }

    #[test]
    fn test_parse_import_id_short_form() {
        let key = parse_import_id("5f1e2d3c4b5a697887766554-test-acc-cluster").unwrap();
        assert_eq!(key.project_id, "5f1e2d3c4b5a697887766554");
        assert_eq!(key.cluster_name, "test-acc-cluster");
    }

    #[test]
    fn test_parse_import_id_accepts_state_id() {
        let key = ScheduleKey::new("p", "my-cluster");
        assert_eq!(parse_import_id(&key.state_id()).unwrap(), key);
    }

    #[test]
    fn test_parse_import_id_rejects_garbage() {
        assert!(parse_import_id("no_separator").is_err());
        assert!(parse_import_id("-cluster").is_err());
        assert!(parse_import_id("project-").is_err());
    }
}
