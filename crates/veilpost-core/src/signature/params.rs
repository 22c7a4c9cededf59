//! `Signature-Input` and `Signature` header values
//!
//! The grammar accepted here is the subset of RFC 9421 structured fields that
//! signers in this protocol produce: one labelled inner list of quoted
//! component names followed by `;key=value` parameters. Integers are bare,
//! strings are quoted with `\"` and `\\` escapes. Unknown parameters are
//! ignored so peers can add `tag` or similar without breaking verification:
//! parsed metadata keeps the received serialization, and the signature base
//! is rebuilt from that text rather than from the known fields.

use super::error::SignatureError;
use veilpost_crypto::encoding::{decode, encode};

/// Label used for signatures this crate produces.
pub const DEFAULT_LABEL: &str = "sig1";

const INPUT_HEADER: &str = "Signature-Input";
const SIGNATURE_HEADER: &str = "Signature";

/// Parameters describing one signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureMetadata {
    /// Identifier of the signing key in the signer's key set.
    pub key_id: String,
    /// Signature algorithm (`ed25519`).
    pub algorithm: String,
    /// Creation time, Unix seconds.
    pub created: i64,
    /// Optional expiry, Unix seconds.
    pub expires: Option<i64>,
    /// Optional signer nonce.
    pub nonce: Option<String>,
    /// Covered components in signing order.
    pub covered_fields: Vec<String>,
    /// Inner list and parameters exactly as received, when parsed.
    received: Option<String>,
}

impl SignatureMetadata {
    /// Metadata with no expiry or nonce.
    pub fn new(
        key_id: impl Into<String>,
        algorithm: impl Into<String>,
        created: i64,
        covered_fields: Vec<String>,
    ) -> Self {
        Self {
            key_id: key_id.into(),
            algorithm: algorithm.into(),
            created,
            expires: None,
            nonce: None,
            covered_fields,
            received: None,
        }
    }

    /// Set the expiry.
    #[must_use]
    pub fn with_expires(mut self, expires: i64) -> Self {
        self.expires = Some(expires);
        self.received = None;
        self
    }

    /// Set the nonce.
    #[must_use]
    pub fn with_nonce(mut self, nonce: impl Into<String>) -> Self {
        self.nonce = Some(nonce.into());
        self.received = None;
        self
    }

    /// Serialized inner list and parameters, the value of the
    /// `@signature-params` line and of the `Signature-Input` member.
    ///
    /// Metadata from [`parse_signature_input`] returns the received text
    /// verbatim, including parameter order and unknown parameters.
    pub fn serialize_params(&self) -> String {
        if let Some(received) = &self.received {
            return received.clone();
        }
        let fields: Vec<String> = self.covered_fields.iter().map(|f| quote(f)).collect();
        let mut out = format!(
            "({});created={};keyid={};alg={}",
            fields.join(" "),
            self.created,
            quote(&self.key_id),
            quote(&self.algorithm)
        );
        if let Some(expires) = self.expires {
            out.push_str(&format!(";expires={expires}"));
        }
        if let Some(nonce) = &self.nonce {
            out.push_str(&format!(";nonce={}", quote(nonce)));
        }
        out
    }

    /// Full `Signature-Input` header value under `label`.
    pub fn to_header(&self, label: &str) -> String {
        format!("{label}={}", self.serialize_params())
    }
}

/// Format a `Signature` header value: `label=:<base64url>:`.
pub fn format_signature_header(label: &str, signature: &[u8]) -> String {
    format!("{label}=:{}:", encode(signature))
}

/// Parse a `Signature-Input` header value.
///
/// # Errors
///
/// - `SignatureError::MalformedHeader` for any syntax error, a duplicate
///   component or parameter, or a missing `created`, `keyid` or `alg`
pub fn parse_signature_input(header: &str) -> Result<SignatureMetadata, SignatureError> {
    let malformed = |reason: &str| SignatureError::MalformedHeader {
        header: INPUT_HEADER,
        reason: reason.to_string(),
    };

    let value = strip_label(header.trim()).map_err(|r| malformed(&r))?;
    if !value.bytes().all(|b| (0x20..0x7f).contains(&b)) {
        return Err(malformed("non-printable character"));
    }
    let rest = value.strip_prefix('(').ok_or_else(|| malformed("expected '('"))?;
    let (inner, params) = rest.split_once(')').ok_or_else(|| malformed("unterminated inner list"))?;

    let mut covered_fields: Vec<String> = Vec::new();
    for item in inner.split_ascii_whitespace() {
        let name = item
            .strip_prefix('"')
            .and_then(|s| s.strip_suffix('"'))
            .filter(|s| !s.is_empty() && !s.contains('"'))
            .ok_or_else(|| malformed("component names must be quoted strings"))?;
        if covered_fields.iter().any(|f| f == name) {
            return Err(malformed("duplicate component"));
        }
        covered_fields.push(name.to_string());
    }

    let mut created = None;
    let mut key_id = None;
    let mut algorithm = None;
    let mut expires = None;
    let mut nonce = None;

    for (key, param) in parse_params(params).map_err(|r| malformed(&r))? {
        let wrong_type = || malformed(&format!("{key} has the wrong type"));
        let duplicate = match key.as_str() {
            "created" => created.replace(param.integer().ok_or_else(wrong_type)?).is_some(),
            "expires" => expires.replace(param.integer().ok_or_else(wrong_type)?).is_some(),
            "keyid" => key_id.replace(param.string().ok_or_else(wrong_type)?).is_some(),
            "alg" => algorithm.replace(param.string().ok_or_else(wrong_type)?).is_some(),
            "nonce" => nonce.replace(param.string().ok_or_else(wrong_type)?).is_some(),
            _ => false,
        };
        if duplicate {
            return Err(malformed(&format!("duplicate parameter {key}")));
        }
    }

    Ok(SignatureMetadata {
        key_id: key_id.ok_or_else(|| malformed("missing keyid"))?,
        algorithm: algorithm.ok_or_else(|| malformed("missing alg"))?,
        created: created.ok_or_else(|| malformed("missing created"))?,
        expires,
        nonce,
        covered_fields,
        received: Some(value.to_string()),
    })
}

/// Parse a `Signature` header value into raw signature bytes.
///
/// # Errors
///
/// - `SignatureError::MalformedHeader` if the value is not `label=:<b64>:`
///   or the payload is not base64url
pub fn parse_signature_header(header: &str) -> Result<Vec<u8>, SignatureError> {
    let malformed = |reason: &str| SignatureError::MalformedHeader {
        header: SIGNATURE_HEADER,
        reason: reason.to_string(),
    };

    let value = strip_label(header.trim()).map_err(|r| malformed(&r))?;
    let payload = value
        .strip_prefix(':')
        .and_then(|s| s.strip_suffix(':'))
        .ok_or_else(|| malformed("expected byte sequence"))?;
    let payload = payload.trim_end_matches('=');
    let bytes = decode(payload).map_err(|_| malformed("invalid base64url"))?;
    if bytes.is_empty() {
        return Err(malformed("empty signature"));
    }
    Ok(bytes)
}

fn strip_label(value: &str) -> Result<&str, String> {
    if value.starts_with('(') || value.starts_with(':') {
        return Ok(value);
    }
    let (label, rest) = value.split_once('=').ok_or("missing label")?;
    if label.is_empty() || !label.bytes().all(is_key_char) {
        return Err(format!("invalid label {label:?}"));
    }
    Ok(rest)
}

fn is_key_char(b: u8) -> bool {
    b.is_ascii_lowercase() || b.is_ascii_digit() || matches!(b, b'_' | b'-' | b'.' | b'*')
}

fn quote(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        if matches!(c, '"' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
    out
}

enum ParamValue {
    Integer(i64),
    String(String),
    Token,
}

impl ParamValue {
    fn integer(&self) -> Option<i64> {
        match self {
            Self::Integer(v) => Some(*v),
            _ => None,
        }
    }

    fn string(&self) -> Option<String> {
        match self {
            Self::String(v) => Some(v.clone()),
            _ => None,
        }
    }
}

fn parse_params(input: &str) -> Result<Vec<(String, ParamValue)>, String> {
    let bytes = input.as_bytes();
    let mut params = Vec::new();
    let mut pos = 0;

    while pos < bytes.len() {
        if bytes[pos] != b';' {
            return Err(format!("unexpected character at offset {pos}"));
        }
        pos += 1;

        let key_start = pos;
        while pos < bytes.len() && is_key_char(bytes[pos]) {
            pos += 1;
        }
        if pos == key_start {
            return Err("empty parameter name".to_string());
        }
        let key = input[key_start..pos].to_string();

        if pos >= bytes.len() || bytes[pos] != b'=' {
            // Bare key is boolean true; nothing here uses one.
            params.push((key, ParamValue::Token));
            continue;
        }
        pos += 1;

        if bytes.get(pos) == Some(&b'"') {
            pos += 1;
            let mut value = String::new();
            loop {
                match bytes.get(pos) {
                    None => return Err("unterminated string".to_string()),
                    Some(b'"') => {
                        pos += 1;
                        break;
                    },
                    Some(b'\\') => {
                        match bytes.get(pos + 1) {
                            Some(&c @ (b'"' | b'\\')) => value.push(char::from(c)),
                            _ => return Err("invalid escape".to_string()),
                        }
                        pos += 2;
                    },
                    Some(&c) if (0x20..0x7f).contains(&c) => {
                        value.push(char::from(c));
                        pos += 1;
                    },
                    Some(_) => return Err("non-printable character in string".to_string()),
                }
            }
            params.push((key, ParamValue::String(value)));
        } else {
            let start = pos;
            while pos < bytes.len() && bytes[pos] != b';' {
                pos += 1;
            }
            let raw = &input[start..pos];
            let value = raw
                .parse::<i64>()
                .map(ParamValue::Integer)
                .or_else(|_| {
                    if !raw.is_empty() && raw.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'*') {
                        Ok(ParamValue::Token)
                    } else {
                        Err(format!("invalid value for {key}"))
                    }
                })?;
            params.push((key, value));
        }
    }

    Ok(params)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(names: &[&str]) -> Vec<String> {
        names.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn parses_rfc_style_input() {
        let header = r#"sig1=("@method" "@path" "content-digest");created=1618884473;keyid="test-key-ed25519";alg="ed25519""#;
        let meta = parse_signature_input(header).unwrap();

        assert_eq!(meta.key_id, "test-key-ed25519");
        assert_eq!(meta.algorithm, "ed25519");
        assert_eq!(meta.created, 1_618_884_473);
        assert_eq!(meta.expires, None);
        assert_eq!(meta.covered_fields, fields(&["@method", "@path", "content-digest"]));
    }

    #[test]
    fn serialize_then_parse_preserves_everything() {
        let meta = SignatureMetadata::new("k\"1", "ed25519", 100, fields(&["@method", "x-device-id"]))
            .with_expires(400)
            .with_nonce("n;1");

        let mut parsed = parse_signature_input(&meta.to_header(DEFAULT_LABEL)).unwrap();
        assert_eq!(parsed.received.take(), Some(meta.serialize_params()));
        assert_eq!(parsed, meta);
    }

    #[test]
    fn ignores_unknown_parameters() {
        let header = r#"sig1=("@method");created=1;keyid="k";alg="ed25519";tag="app";flag"#;
        assert!(parse_signature_input(header).is_ok());
    }

    #[test]
    fn parsed_params_serialize_as_received() {
        let params = r#"("@method" "@path");alg="ed25519";tag="app";keyid="k";created=1"#;
        let meta = parse_signature_input(&format!("sig1={params}")).unwrap();

        assert_eq!(meta.serialize_params(), params);
        assert_eq!(meta.to_header("sig1"), format!("sig1={params}"));

        // Changing a parameter drops the received text
        let rebuilt = meta.with_nonce("n");
        assert_eq!(
            rebuilt.serialize_params(),
            r#"("@method" "@path");created=1;keyid="k";alg="ed25519";nonce="n""#
        );
    }

    #[test]
    fn rejects_malformed_input() {
        let cases = [
            "",
            "sig1",
            r#"sig1="@method";created=1;keyid="k";alg="ed25519""#,
            r#"sig1=("@method";created=1;keyid="k";alg="ed25519""#,
            r#"sig1=(@method);created=1;keyid="k";alg="ed25519""#,
            r#"sig1=("@method" "@method");created=1;keyid="k";alg="ed25519""#,
            r#"sig1=("@method");keyid="k";alg="ed25519""#,
            r#"sig1=("@method");created="1";keyid="k";alg="ed25519""#,
            r#"sig1=("@method");created=1;created=2;keyid="k";alg="ed25519""#,
            r#"sig1=("@method");created=1;keyid="k"#,
            r#"Sig1=("@method");created=1;keyid="k";alg="ed25519""#,
            "sig1=(\"@method\"\n\"@path\");created=1;keyid=\"k\";alg=\"ed25519\"",
        ];
        for case in cases {
            assert!(
                matches!(parse_signature_input(case), Err(SignatureError::MalformedHeader { .. })),
                "accepted {case:?}"
            );
        }
    }

    #[test]
    fn signature_header_round_trip() {
        let header = format_signature_header(DEFAULT_LABEL, &[7u8; 64]);
        assert!(header.starts_with("sig1=:"));
        assert_eq!(parse_signature_header(&header).unwrap(), vec![7u8; 64]);
    }

    #[test]
    fn rejects_malformed_signature_header() {
        for case in ["sig1=AAAA", "sig1=::", "sig1=:!!:", ":AAAA", "=:AAAA:"] {
            assert!(
                matches!(parse_signature_header(case), Err(SignatureError::MalformedHeader { .. })),
                "accepted {case:?}"
            );
        }
    }
}
