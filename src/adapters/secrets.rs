//! Secret fetching utilities for Kubernetes secrets

use k8s_openapi::api::core::v1::Secret;
use kube::{Api, Client};

use crate::crd::CredentialsSecretRef;
use crate::error::{Error, Result};

/// Fetch a secret from Kubernetes
pub async fn get_secret(client: &Client, name: &str, namespace: &str) -> Result<Secret> {
    let secrets: Api<Secret> = Api::namespaced(client.clone(), namespace);
    secrets
        .get(name)
        .await
        .map_err(|e| match e {
            kube::Error::Api(api_err) if api_err.code == 404 => {
                Error::SecretNotFound(format!("{}/{}", namespace, name))
            }
            other => Error::Kube(other),
        })
}

/// Get a string value from a secret
pub fn get_secret_string(secret: &Secret, key: &str) -> Result<String> {
    let missing = || Error::SecretKeyNotFound {
        secret: secret.metadata.name.clone().unwrap_or_default(),
        key: key.to_string(),
    };

    let bytes = secret
        .data
        .as_ref()
        .and_then(|data| data.get(key))
        .ok_or_else(missing)?;

    let value = String::from_utf8(bytes.0.clone())
        .map_err(|e| Error::config(format!("Invalid UTF-8 in secret key '{}': {}", key, e)))?;

    let value = value.trim().to_string();
    if value.is_empty() {
        return Err(missing());
    }
    Ok(value)
}

/// Fetch the remote API token referenced by a schedule
pub async fn get_api_token(
    client: &Client,
    namespace: &str,
    secret_ref: &CredentialsSecretRef,
) -> Result<String> {
    let secret = get_secret(client, &secret_ref.name, namespace).await?;
    get_secret_string(&secret, &secret_ref.token_key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use k8s_openapi::ByteString;

    fn secret(entries: &[(&str, &str)]) -> Secret {
        let data: BTreeMap<String, ByteString> = entries
            .iter()
            .map(|(k, v)| (k.to_string(), ByteString(v.as_bytes().to_vec())))
            .collect();
        Secret {
            metadata: ObjectMeta {
                name: Some("atlas-api".to_string()),
                ..Default::default()
            },
            data: Some(data),
            ..Default::default()
        }
    }

    #[test]
    fn test_reads_trimmed_value() {
        let s = secret(&[("token", "abc123\n")]);
        assert_eq!(get_secret_string(&s, "token").unwrap(), "abc123");
    }

    #[test]
    fn test_missing_key() {
        let s = secret(&[("other", "x")]);
        let err = get_secret_string(&s, "token").unwrap_err();
        assert!(matches!(err, Error::SecretKeyNotFound { ref key, .. } if key == "token"));
        assert!(err.to_string().contains("atlas-api"));
    }

    #[test]
    fn test_blank_value_counts_as_missing() {
        let s = secret(&[("token", "  ")]);
        assert!(get_secret_string(&s, "token").is_err());
    }
}
