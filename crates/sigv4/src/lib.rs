//! AWS Signature Version 4 request signing.
//!
//! Produces the `authorization`, `x-amz-date` and (for temporary
//! credentials) `x-amz-security-token` headers for an HTTP request; unsigned
//! streaming payloads additionally get the `x-amz-content-sha256` marker
//! header. Pure computation, no I/O; callers attach the returned headers to
//! whatever client they use.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

const ALGORITHM: &str = "AWS4-HMAC-SHA256";
const UNSIGNED_PAYLOAD: &str = "UNSIGNED-PAYLOAD";

/// Hex SHA-256 of an empty body, used for bodiless requests.
pub const EMPTY_PAYLOAD_HASH: &str =
    "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

#[derive(Debug, thiserror::Error)]
pub enum SigningError {
    #[error("missing {field} in signing input")]
    MissingField { field: &'static str },

    #[error("invalid signing key material")]
    InvalidKey,

    #[error("header name `{name}` is not valid for signing")]
    InvalidHeaderName { name: String },
}

/// Request body as seen by the signer.
///
/// Streaming uploads whose length is unknown at signing time use
/// [`Payload::Unsigned`], which signs the literal `UNSIGNED-PAYLOAD` marker
/// instead of a digest.
#[derive(Debug, Clone, Copy)]
pub enum Payload<'a> {
    Bytes(&'a [u8]),
    Unsigned,
}

impl Payload<'_> {
    fn hashed(&self) -> String {
        match self {
            Payload::Bytes(body) => hex::encode(Sha256::digest(body)),
            Payload::Unsigned => UNSIGNED_PAYLOAD.to_string(),
        }
    }
}

/// The request-shaped inputs to canonicalization.
///
/// `path` is the path exactly as it will appear in the request line,
/// percent-encoded by the caller where the wire format requires it. `query`
/// and `headers` are raw (unencoded) pairs; the signer canonicalizes them.
/// The `host` header is derived from `host` and must not be listed in
/// `headers`.
#[derive(Debug, Clone)]
pub struct SignableRequest<'a> {
    pub method: &'a str,
    pub host: &'a str,
    pub path: &'a str,
    pub query: &'a [(&'a str, &'a str)],
    pub headers: &'a [(&'a str, &'a str)],
    pub payload: Payload<'a>,
}

/// Key material and scope for one signature.
#[derive(Debug, Clone)]
pub struct Signer<'a> {
    pub access_key_id: &'a str,
    pub secret_access_key: &'a str,
    pub session_token: Option<&'a str>,
    pub region: &'a str,
    pub service: &'a str,
}

/// Headers produced by a successful signing pass.
///
/// Contains only the headers the signer generated; the caller still sends
/// the headers it supplied in [`SignableRequest::headers`] itself, and the
/// HTTP client is expected to set `host` from the URL.
#[derive(Debug)]
pub struct Signature {
    pub headers: Vec<(String, String)>,
    pub signature: String,
}

impl Signer<'_> {
    /// Sign `req` at the current time.
    pub fn sign(&self, req: &SignableRequest<'_>) -> Result<Signature, SigningError> {
        self.sign_at(req, Utc::now())
    }

    /// Sign `req` as of `at`. Deterministic; the verification side only
    /// accepts signatures within its clock-skew window, so callers pass a
    /// fresh timestamp outside of tests.
    pub fn sign_at(
        &self,
        req: &SignableRequest<'_>,
        at: DateTime<Utc>,
    ) -> Result<Signature, SigningError> {
        if self.access_key_id.is_empty() {
            return Err(SigningError::MissingField {
                field: "access key id",
            });
        }
        if self.secret_access_key.is_empty() {
            return Err(SigningError::MissingField {
                field: "secret access key",
            });
        }
        if req.host.is_empty() {
            return Err(SigningError::MissingField { field: "host" });
        }

        let amz_date = at.format("%Y%m%dT%H%M%SZ").to_string();
        let date = at.format("%Y%m%d").to_string();
        let payload_hash = req.payload.hashed();

        let mut headers: BTreeMap<String, String> = BTreeMap::new();
        headers.insert("host".into(), req.host.trim().to_string());
        headers.insert("x-amz-date".into(), amz_date.clone());
        // Unsigned payloads must declare themselves on the wire. Hashed
        // payloads only appear in the canonical request's final line; callers
        // that need the digest header (S3) pass it explicitly.
        if matches!(req.payload, Payload::Unsigned) {
            headers.insert("x-amz-content-sha256".into(), payload_hash.clone());
        }
        if let Some(token) = self.session_token {
            headers.insert("x-amz-security-token".into(), token.to_string());
        }
        for (name, value) in req.headers {
            if name.is_empty() || !name.is_ascii() {
                return Err(SigningError::InvalidHeaderName {
                    name: (*name).to_string(),
                });
            }
            let key = name.to_ascii_lowercase();
            let value = normalize_header_value(value);
            // Duplicate names fold into a single comma-joined value.
            headers
                .entry(key)
                .and_modify(|existing| {
                    existing.push(',');
                    existing.push_str(&value);
                })
                .or_insert(value);
        }

        let canonical_headers: String = headers
            .iter()
            .map(|(k, v)| format!("{k}:{v}\n"))
            .collect();
        let signed_headers: String = headers
            .keys()
            .cloned()
            .collect::<Vec<_>>()
            .join(";");

        let canonical_request = format!(
            "{}\n{}\n{}\n{}\n{}\n{}",
            req.method.to_ascii_uppercase(),
            self.canonical_path(req.path),
            canonical_query(req.query),
            canonical_headers,
            signed_headers,
            payload_hash,
        );

        let scope = format!("{date}/{}/{}/aws4_request", self.region, self.service);
        let string_to_sign = format!(
            "{ALGORITHM}\n{amz_date}\n{scope}\n{}",
            hex::encode(Sha256::digest(canonical_request.as_bytes())),
        );

        let signing_key = self.derive_key(&date)?;
        let signature = hex::encode(hmac_sha256(&signing_key, string_to_sign.as_bytes())?);

        let authorization = format!(
            "{ALGORITHM} Credential={}/{scope}, SignedHeaders={signed_headers}, Signature={signature}",
            self.access_key_id,
        );

        let mut out = vec![("x-amz-date".to_string(), amz_date)];
        if matches!(req.payload, Payload::Unsigned) {
            out.push(("x-amz-content-sha256".to_string(), payload_hash));
        }
        if let Some(token) = self.session_token {
            out.push(("x-amz-security-token".to_string(), token.to_string()));
        }
        out.push(("authorization".to_string(), authorization));

        Ok(Signature {
            headers: out,
            signature,
        })
    }

    /// Canonical URI. The wire path is encoded once more for every service
    /// except S3, which signs the wire path verbatim.
    fn canonical_path(&self, path: &str) -> String {
        let path = if path.is_empty() { "/" } else { path };
        if self.service == "s3" {
            return path.to_string();
        }
        path.split('/')
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect::<Vec<_>>()
            .join("/")
    }

    fn derive_key(&self, date: &str) -> Result<[u8; 32], SigningError> {
        let secret = format!("AWS4{}", self.secret_access_key);
        let k_date = hmac_sha256(secret.as_bytes(), date.as_bytes())?;
        let k_region = hmac_sha256(&k_date, self.region.as_bytes())?;
        let k_service = hmac_sha256(&k_region, self.service.as_bytes())?;
        hmac_sha256(&k_service, b"aws4_request")
    }
}

fn canonical_query(query: &[(&str, &str)]) -> String {
    let mut pairs: Vec<(String, String)> = query
        .iter()
        .map(|(k, v)| {
            (
                urlencoding::encode(k).into_owned(),
                urlencoding::encode(v).into_owned(),
            )
        })
        .collect();
    pairs.sort();
    pairs
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&")
}

/// Trim and collapse internal runs of spaces, per the canonicalization rules.
fn normalize_header_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut last_was_space = false;
    for ch in value.trim().chars() {
        if ch == ' ' {
            if !last_was_space {
                out.push(' ');
            }
            last_was_space = true;
        } else {
            out.push(ch);
            last_was_space = false;
        }
    }
    out
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Result<[u8; 32], SigningError> {
    let mut mac =
        Hmac::<Sha256>::new_from_slice(key).map_err(|_| SigningError::InvalidKey)?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().into())
}
