//! Signature base construction

use super::{error::SignatureError, params::SignatureMetadata, request::RequestParts};

const PARAMS_COMPONENT: &str = "@signature-params";

/// Build the signature base for `request` under `metadata`.
///
/// One `"name": value` line per covered component in the order listed in
/// `metadata.covered_fields`, then the `"@signature-params"` line. The order
/// is never normalized: a verifier rebuilding the base from a reordered list
/// produces different bytes and the signature fails.
///
/// # Errors
///
/// - `SignatureError::MissingComponent` if a covered component has no value
///   in the request
/// - `SignatureError::MalformedHeader` if `@signature-params` is itself
///   listed as covered, or a component value contains a control character
///   (a line break would add lines to the base)
pub fn build_signature_base(
    request: &RequestParts,
    metadata: &SignatureMetadata,
) -> Result<String, SignatureError> {
    let mut lines = Vec::with_capacity(metadata.covered_fields.len() + 1);

    for field in &metadata.covered_fields {
        if field == PARAMS_COMPONENT {
            return Err(SignatureError::MalformedHeader {
                header: "Signature-Input",
                reason: format!("{PARAMS_COMPONENT} cannot be covered"),
            });
        }
        let value = request
            .component(field)
            .ok_or_else(|| SignatureError::MissingComponent { name: field.clone() })?;
        if value.chars().any(|c| c.is_ascii_control() && c != '\t') {
            return Err(SignatureError::MalformedHeader {
                header: "covered",
                reason: format!("{field} value contains a control character"),
            });
        }
        lines.push(format!("\"{field}\": {value}"));
    }

    lines.push(format!("\"{PARAMS_COMPONENT}\": {}", metadata.serialize_params()));
    Ok(lines.join("\n"))
}
