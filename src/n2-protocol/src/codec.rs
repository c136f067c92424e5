// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Codec utilities for envelopes and responses.

use crate::types::{ClientCommand, ClientEnvelope, ClientResponse};

/// Parse a JSON string into a ClientEnvelope.
///
/// First tries to parse as a full ClientEnvelope.
/// If that fails, tries to parse as a bare ClientCommand and wraps it with token: None.
pub fn parse_envelope(input: &str) -> Result<ClientEnvelope, serde_json::Error> {
    match serde_json::from_str::<ClientEnvelope>(input) {
        Ok(envelope) => Ok(envelope),
        Err(_) => {
            let cmd = serde_json::from_str::<ClientCommand>(input)?;
            Ok(ClientEnvelope { token: None, cmd })
        }
    }
}

/// Serialize a response as one newline-terminated JSON line.
pub fn encode_response(resp: &ClientResponse) -> Result<String, serde_json::Error> {
    let mut line = serde_json::to_string(resp)?;
    line.push('\n');
    Ok(line)
}

#[cfg(test)]
mod tests {
    use super::*;
    use n2_core::RequestedMode;

    #[test]
    fn test_parse_envelope_full_envelope() {
        let json = r#"{"token":"abc123","cmd":"get_state"}"#;
        let envelope = parse_envelope(json).unwrap();
        assert_eq!(envelope.token, Some("abc123".to_string()));
        assert!(matches!(envelope.cmd, ClientCommand::GetState));
    }

    #[test]
    fn test_parse_envelope_bare_command() {
        let json = r#"{"cmd":"whoami"}"#;
        let envelope = parse_envelope(json).unwrap();
        assert_eq!(envelope.token, None);
        assert_eq!(envelope.cmd, ClientCommand::Whoami);
    }

    #[test]
    fn test_parse_set_mode() {
        let json = r#"{"cmd":"set_mode","mode":"advisory"}"#;
        let envelope = parse_envelope(json).unwrap();
        assert_eq!(
            envelope.cmd,
            ClientCommand::SetMode {
                mode: RequestedMode::Advisory
            }
        );
    }

    #[test]
    fn test_failsafe_is_not_a_requestable_mode() {
        let json = r#"{"cmd":"set_mode","mode":"failsafe"}"#;
        assert!(parse_envelope(json).is_err());
    }

    #[test]
    fn test_optional_limits_default_to_none() {
        let env = parse_envelope(r#"{"cmd":"get_history"}"#).unwrap();
        assert_eq!(env.cmd, ClientCommand::GetHistory { limit: None });
        let env = parse_envelope(r#"{"cmd":"get_events","limit":5}"#).unwrap();
        assert_eq!(env.cmd, ClientCommand::GetEvents { limit: Some(5) });
        let env = parse_envelope(r#"{"cmd":"trigger_failsafe"}"#).unwrap();
        assert_eq!(env.cmd, ClientCommand::TriggerFailsafe { reason: None });
    }

    #[test]
    fn test_parse_envelope_invalid_json() {
        assert!(parse_envelope("not valid json").is_err());
        assert!(parse_envelope(r#"{"cmd":"open_valve"}"#).is_err());
    }

    #[test]
    fn test_encode_error_response() {
        let line = encode_response(&ClientResponse::error("denied")).unwrap();
        assert_eq!(line, "{\"success\":false,\"error\":\"denied\"}\n");
    }
}
