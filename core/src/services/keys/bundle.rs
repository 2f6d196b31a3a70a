//! Layout of key material inside backend bundles
//!
//! `<app>/jwt` holds both symmetric classes as JSON string arrays, newest
//! first. `<app>/rsa` holds the PEM pair. Timestamps are RFC 3339.

use chrono::{DateTime, Utc};

use crate::domain::entities::keys::{KeyClass, KeySnapshot, RsaKeyPair, SymmetricKeySet};
use crate::domain::entities::secret::SecretBundle;
use crate::errors::KeyError;

pub const ACCESS_SECRETS: &str = "access_secrets";
pub const ACCESS_ROTATED_AT: &str = "access_rotated_at";
pub const REFRESH_SECRETS: &str = "refresh_secrets";
pub const REFRESH_ROTATED_AT: &str = "refresh_rotated_at";
pub const PUBLIC_KEY: &str = "public_key";
pub const PRIVATE_KEY: &str = "private_key";
pub const ROTATED_AT: &str = "rotated_at";

/// Symmetric material read back from a bundle
#[derive(Debug, Clone)]
pub struct StoredSymmetric {
    pub keys: SymmetricKeySet,
    pub rotated_at: Option<DateTime<Utc>>,
}

/// Bundle holding both symmetric classes of `snapshot`
pub fn jwt_bundle(snapshot: &KeySnapshot) -> SecretBundle {
    SecretBundle::new()
        .with(ACCESS_SECRETS, encode_secrets(&snapshot.access_keys().secrets()))
        .with(
            ACCESS_ROTATED_AT,
            snapshot.state(KeyClass::AccessSecret).rotated_at.to_rfc3339(),
        )
        .with(REFRESH_SECRETS, encode_secrets(&snapshot.refresh_keys().secrets()))
        .with(
            REFRESH_ROTATED_AT,
            snapshot.state(KeyClass::RefreshSecret).rotated_at.to_rfc3339(),
        )
}

/// Bundle holding an RSA pair
pub fn rsa_bundle(pair: &RsaKeyPair, rotated_at: DateTime<Utc>) -> SecretBundle {
    SecretBundle::new()
        .with(PUBLIC_KEY, pair.public_pem())
        .with(PRIVATE_KEY, pair.private_pem())
        .with(ROTATED_AT, rotated_at.to_rfc3339())
}

/// One symmetric class from a jwt bundle, if present
pub fn read_symmetric(
    bundle: &SecretBundle,
    class: KeyClass,
) -> Result<Option<StoredSymmetric>, KeyError> {
    let (secrets_key, rotated_key) = match class {
        KeyClass::AccessSecret => (ACCESS_SECRETS, ACCESS_ROTATED_AT),
        KeyClass::RefreshSecret => (REFRESH_SECRETS, REFRESH_ROTATED_AT),
        KeyClass::RsaPair => return Ok(None),
    };

    let secrets = match bundle.get(secrets_key) {
        Some(raw) => decode_secrets(raw)?,
        None => return Ok(None),
    };
    if secrets.is_empty() {
        return Ok(None);
    }

    Ok(Some(StoredSymmetric {
        keys: SymmetricKeySet::new(secrets)?,
        rotated_at: bundle.get(rotated_key).and_then(parse_timestamp),
    }))
}

/// The RSA pair from an rsa bundle, if present
pub fn read_rsa(bundle: &SecretBundle) -> Result<Option<(RsaKeyPair, Option<DateTime<Utc>>)>, KeyError> {
    match (bundle.get(PRIVATE_KEY), bundle.get(PUBLIC_KEY)) {
        (Some(private_pem), Some(public_pem)) => {
            let pair = RsaKeyPair::from_pem(private_pem, public_pem)?;
            Ok(Some((pair, bundle.get(ROTATED_AT).and_then(parse_timestamp))))
        }
        _ => Ok(None),
    }
}

/// Stored form of a secret list. Secrets are kept verbatim, commas and
/// whitespace included.
pub fn encode_secrets<S: AsRef<str>>(secrets: &[S]) -> String {
    serde_json::Value::from(
        secrets
            .iter()
            .map(|s| s.as_ref().to_string())
            .collect::<Vec<_>>(),
    )
    .to_string()
}

/// Inverse of [`encode_secrets`]
pub fn decode_secrets(raw: &str) -> Result<Vec<String>, KeyError> {
    serde_json::from_str(raw).map_err(|e| KeyError::InvalidKeyMaterial {
        message: format!("stored secret list is not a JSON string array: {}", e),
    })
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|ts| ts.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn test_jwt_bundle_layout() {
        let loaded_at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let snapshot = KeySnapshot::new(
            SymmetricKeySet::new(["a2", "a1"]).unwrap(),
            SymmetricKeySet::new(["r1"]).unwrap(),
            None,
            loaded_at,
        )
        .with_rotated_at(KeyClass::RefreshSecret, loaded_at - Duration::days(3));

        let bundle = jwt_bundle(&snapshot);

        assert_eq!(bundle.get(ACCESS_SECRETS), Some(r#"["a2","a1"]"#));
        assert_eq!(bundle.get(REFRESH_SECRETS), Some(r#"["r1"]"#));

        let access = read_symmetric(&bundle, KeyClass::AccessSecret).unwrap().unwrap();
        assert_eq!(access.keys.secrets(), vec!["a2", "a1"]);
        assert_eq!(access.rotated_at, Some(loaded_at));

        let refresh = read_symmetric(&bundle, KeyClass::RefreshSecret).unwrap().unwrap();
        assert_eq!(refresh.rotated_at, Some(loaded_at - Duration::days(3)));
    }

    #[test]
    fn test_missing_class_reads_as_none() {
        let bundle = SecretBundle::new().with(ACCESS_SECRETS, encode_secrets(&["a1"]));
        assert!(read_symmetric(&bundle, KeyClass::RefreshSecret).unwrap().is_none());

        let access = read_symmetric(&bundle, KeyClass::AccessSecret).unwrap().unwrap();
        assert_eq!(access.rotated_at, None);
    }

    #[test]
    fn test_secrets_with_commas_and_spaces_are_kept_verbatim() {
        let loaded_at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let snapshot = KeySnapshot::new(
            SymmetricKeySet::new(["abc,def", " padded "]).unwrap(),
            SymmetricKeySet::new(["r\"1\""]).unwrap(),
            None,
            loaded_at,
        );

        let bundle = jwt_bundle(&snapshot);

        let access = read_symmetric(&bundle, KeyClass::AccessSecret).unwrap().unwrap();
        assert_eq!(access.keys.secrets(), vec!["abc,def", " padded "]);
        assert_eq!(
            access.keys.signing_key().key_id(),
            snapshot.access_keys().signing_key().key_id()
        );

        let refresh = read_symmetric(&bundle, KeyClass::RefreshSecret).unwrap().unwrap();
        assert_eq!(refresh.keys.secrets(), vec!["r\"1\""]);
    }

    #[test]
    fn test_unparseable_secret_list_is_invalid() {
        let bundle = SecretBundle::new().with(ACCESS_SECRETS, "a2,a1");
        assert!(matches!(
            read_symmetric(&bundle, KeyClass::AccessSecret),
            Err(KeyError::InvalidKeyMaterial { .. })
        ));

        let empty = SecretBundle::new().with(ACCESS_SECRETS, "[]");
        assert!(read_symmetric(&empty, KeyClass::AccessSecret).unwrap().is_none());
    }

    #[test]
    fn test_rsa_bundle_requires_both_halves() {
        let bundle = SecretBundle::new().with(PUBLIC_KEY, "pem");
        assert!(read_rsa(&bundle).unwrap().is_none());
    }
}
