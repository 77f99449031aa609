//! Account creation timestamp resolution
//!
//! Sources are tried in a fixed order and the first one that yields a
//! timestamp wins:
//! 1. `_xcreds_creationDate` in the directory record (ISO-8601)
//! 2. `CreateTimeStamp` in the directory record (`yyyyMMddHHmmss` UTC)
//! 3. `creationTime` inside `accountPolicyData` (floating epoch seconds)
//! 4. the same fields inside the locally persisted account record

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, NaiveDateTime};
use regex::Regex;
use std::sync::LazyLock;
use sweeper_host_api::AccountDirectory;
use sweeper_util::{EpochSeconds, Username};
use tracing::debug;

static XCREDS_DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"_xcreds_creationDate:\s*([\d\-T:]+Z)").expect("valid pattern"));

static CREATE_STAMP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"CreateTimeStamp:\s*(\d{14})Z").expect("valid pattern"));

static POLICY_CREATION_REAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<key>creationTime</key>\s*<real>(.*?)</real>").expect("valid pattern")
});

static POLICY_CREATION_STRING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<key>creationTime</key>\s*<string>(.*?)</string>").expect("valid pattern")
});

static LOCAL_XCREDS_DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<key>_xcreds_creationDate</key>\s*(?:<array>\s*)?<string>(.*?)</string>")
        .expect("valid pattern")
});

static LOCAL_POLICY_DATA: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<key>accountPolicyData</key>\s*(?:<array>\s*)?<data>(.*?)</data>")
        .expect("valid pattern")
});

/// Where a creation timestamp came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreationSource {
    IdentityProviderDate,
    DirectoryTimestamp,
    AccountPolicy,
    LocalRecord,
}

// Pre-1970 values are unresolved: the record store holds only
// non-negative epoch seconds.
fn since_epoch(t: i64) -> Option<EpochSeconds> {
    (t >= 0).then_some(t)
}

fn parse_iso8601(text: &str) -> Option<EpochSeconds> {
    DateTime::parse_from_rfc3339(text.trim())
        .ok()
        .and_then(|dt| since_epoch(dt.timestamp()))
}

fn parse_directory_stamp(text: &str) -> Option<EpochSeconds> {
    NaiveDateTime::parse_from_str(text, "%Y%m%d%H%M%S")
        .ok()
        .and_then(|dt| since_epoch(dt.and_utc().timestamp()))
}

fn parse_float_epoch(text: &str) -> Option<EpochSeconds> {
    let value: f64 = text.trim().parse().ok()?;
    if !value.is_finite() {
        return None;
    }
    since_epoch(value as i64)
}

/// Timestamp from a raw directory record dump (sources 1 and 2)
pub fn creation_from_record(record: &str) -> Option<(EpochSeconds, CreationSource)> {
    if let Some(t) = XCREDS_DATE
        .captures(record)
        .and_then(|c| parse_iso8601(&c[1]))
    {
        return Some((t, CreationSource::IdentityProviderDate));
    }
    CREATE_STAMP
        .captures(record)
        .and_then(|c| parse_directory_stamp(&c[1]))
        .map(|t| (t, CreationSource::DirectoryTimestamp))
}

/// `creationTime` from an account policy property list
pub fn creation_from_policy_data(policy: &str) -> Option<EpochSeconds> {
    if let Some(t) = POLICY_CREATION_REAL
        .captures(policy)
        .and_then(|c| parse_float_epoch(&c[1]))
    {
        return Some(t);
    }
    POLICY_CREATION_STRING
        .captures(policy)
        .and_then(|c| parse_iso8601(&c[1]))
}

/// Timestamp from the local record converted to XML (source 4).
///
/// The embedded `accountPolicyData` is base64 in a `<data>` element; only
/// XML property lists are understood once decoded.
pub fn creation_from_local_xml(xml: &str) -> Option<EpochSeconds> {
    if let Some(t) = LOCAL_XCREDS_DATE
        .captures(xml)
        .and_then(|c| parse_iso8601(&c[1]))
    {
        return Some(t);
    }

    let encoded: String = LOCAL_POLICY_DATA
        .captures(xml)?
        .get(1)?
        .as_str()
        .split_whitespace()
        .collect();
    let decoded = STANDARD.decode(encoded).ok()?;
    let nested = String::from_utf8(decoded).ok()?;
    creation_from_policy_data(&nested)
}

/// Resolve the creation timestamp for one user.
///
/// Directory errors make a source count as unresolved; `None` means no
/// source produced a timestamp.
pub async fn resolve_creation_timestamp(
    directory: &dyn AccountDirectory,
    user: &Username,
) -> Option<EpochSeconds> {
    match directory.read_record(user).await {
        Ok(record) => {
            if let Some((t, source)) = creation_from_record(&record) {
                debug!(user = %user, ?source, timestamp = t, "Resolved creation timestamp");
                return Some(t);
            }
        }
        Err(e) => debug!(user = %user, error = %e, "Directory record unreadable"),
    }

    match directory.account_policy_data(user).await {
        Ok(Some(policy)) => {
            if let Some(t) = creation_from_policy_data(&policy) {
                debug!(user = %user, source = ?CreationSource::AccountPolicy, timestamp = t, "Resolved creation timestamp");
                return Some(t);
            }
        }
        Ok(None) => {}
        Err(e) => debug!(user = %user, error = %e, "Account policy data unreadable"),
    }

    match directory.local_record_xml(user).await {
        Ok(Some(xml)) => {
            if let Some(t) = creation_from_local_xml(&xml) {
                debug!(user = %user, source = ?CreationSource::LocalRecord, timestamp = t, "Resolved creation timestamp");
                return Some(t);
            }
        }
        Ok(None) => {}
        Err(e) => debug!(user = %user, error = %e, "Local account record unreadable"),
    }

    debug!(user = %user, "No creation timestamp found");
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use sweeper_host_api::{MockAccount, MockDirectory};

    const POLICY_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<plist version="1.0">
<dict>
	<key>creationTime</key>
	<real>1678018217.5</real>
	<key>failedLoginCount</key>
	<integer>0</integer>
</dict>
</plist>"#;

    #[test]
    fn identity_provider_date_beats_directory_stamp() {
        let record = "CreateTimeStamp: 20230305121017Z\n_xcreds_creationDate: 2025-01-13T17:25:40Z\n";
        let (t, source) = creation_from_record(record).unwrap();
        assert_eq!(source, CreationSource::IdentityProviderDate);
        assert_eq!(t, 1_736_789_140);
    }

    #[test]
    fn directory_stamp_is_utc() {
        let (t, source) = creation_from_record("RecordName: bob\nCreateTimeStamp: 20230305121017Z\n").unwrap();
        assert_eq!(source, CreationSource::DirectoryTimestamp);
        assert_eq!(t, 1_678_018_217);
    }

    #[test]
    fn malformed_values_fall_through() {
        assert!(creation_from_record("CreateTimeStamp: 2023030512Z\n").is_none());
        assert!(creation_from_record("_xcreds_creationDate: 2025-13-45T99:00:00Z\n").is_none());
        assert!(creation_from_policy_data("<key>creationTime</key><real>soon</real>").is_none());
    }

    #[test]
    fn pre_epoch_values_are_unresolved() {
        assert_eq!(parse_float_epoch("-3600.5"), None);
        assert_eq!(parse_float_epoch("-0.5"), Some(0));
        assert!(creation_from_record("CreateTimeStamp: 19650101000000Z\n").is_none());
        assert!(creation_from_record("_xcreds_creationDate: 1969-12-31T23:00:00Z\n").is_none());

        // A bad first source does not hide a good later one
        let record = "_xcreds_creationDate: 1969-12-31T23:00:00Z\nCreateTimeStamp: 20230305121017Z\n";
        assert_eq!(
            creation_from_record(record),
            Some((1_678_018_217, CreationSource::DirectoryTimestamp))
        );
        assert!(creation_from_policy_data("<key>creationTime</key><real>-3600.5</real>").is_none());
    }

    #[test]
    fn policy_data_real_is_truncated() {
        assert_eq!(creation_from_policy_data(POLICY_XML), Some(1_678_018_217));
    }

    #[test]
    fn local_record_with_embedded_policy() {
        let encoded = STANDARD.encode(POLICY_XML);
        let wrapped: Vec<String> = encoded
            .as_bytes()
            .chunks(52)
            .map(|c| String::from_utf8_lossy(c).into_owned())
            .collect();
        let xml = format!(
            "<dict>\n<key>accountPolicyData</key>\n<array>\n<data>\n{}\n</data>\n</array>\n</dict>",
            wrapped.join("\n\t")
        );
        assert_eq!(creation_from_local_xml(&xml), Some(1_678_018_217));

        let xcreds = "<key>_xcreds_creationDate</key>\n<array>\n<string>2025-01-13T17:25:40Z</string>\n</array>";
        assert_eq!(creation_from_local_xml(xcreds), Some(1_736_789_140));
    }

    #[tokio::test]
    async fn sources_are_tried_in_order() {
        let directory = MockDirectory::new()
            .with_account(
                "bob",
                MockAccount {
                    record: "RecordName: bob\n".into(),
                    policy_data: Some(POLICY_XML.into()),
                    local_xml: Some("<key>_xcreds_creationDate</key><string>2025-01-13T17:25:40Z</string>".into()),
                    ..MockAccount::default()
                },
            )
            .with_account(
                "alice",
                MockAccount {
                    record: "RecordName: alice\n".into(),
                    local_xml: Some("<key>_xcreds_creationDate</key><string>2025-01-13T17:25:40Z</string>".into()),
                    ..MockAccount::default()
                },
            )
            .with_user("carol");

        assert_eq!(
            resolve_creation_timestamp(&directory, &Username::from("bob")).await,
            Some(1_678_018_217)
        );
        assert_eq!(
            resolve_creation_timestamp(&directory, &Username::from("alice")).await,
            Some(1_736_789_140)
        );
        assert_eq!(
            resolve_creation_timestamp(&directory, &Username::from("carol")).await,
            None
        );
        assert_eq!(
            resolve_creation_timestamp(&directory, &Username::from("ghost")).await,
            None
        );
    }
}
