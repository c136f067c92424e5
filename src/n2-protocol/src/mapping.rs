// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

use n2_core::ControlCommand;

use crate::types::ClientCommand;

/// Reason recorded when an operator trips failsafe without giving one.
pub const DEFAULT_TRIGGER_REASON: &str = "manual emergency stop";

/// Map a client command onto a control-task command.
///
/// Returns `None` for commands the listener answers on its own
/// (history, events, whoami).
pub fn client_command_to_control(cmd: &ClientCommand) -> Option<ControlCommand> {
    match cmd {
        ClientCommand::GetState => Some(ControlCommand::GetState),
        ClientCommand::SetMode { mode } => Some(ControlCommand::SetMode(*mode)),
        ClientCommand::ClearFailsafe => Some(ControlCommand::ClearFailsafe),
        ClientCommand::TriggerFailsafe { reason } => Some(ControlCommand::TriggerFailsafe {
            reason: reason
                .as_deref()
                .map(str::trim)
                .filter(|r| !r.is_empty())
                .unwrap_or(DEFAULT_TRIGGER_REASON)
                .to_string(),
        }),
        ClientCommand::GetHistory { .. } | ClientCommand::GetEvents { .. } | ClientCommand::Whoami => {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use n2_core::RequestedMode;

    #[test]
    fn test_mapping() {
        assert_eq!(
            client_command_to_control(&ClientCommand::SetMode {
                mode: RequestedMode::Auto
            }),
            Some(ControlCommand::SetMode(RequestedMode::Auto))
        );
        assert_eq!(client_command_to_control(&ClientCommand::Whoami), None);
    }

    #[test]
    fn test_trigger_reason_defaults() {
        let cmd = client_command_to_control(&ClientCommand::TriggerFailsafe {
            reason: Some("  ".to_string()),
        });
        assert_eq!(
            cmd,
            Some(ControlCommand::TriggerFailsafe {
                reason: DEFAULT_TRIGGER_REASON.to_string()
            })
        );
        let cmd = client_command_to_control(&ClientCommand::TriggerFailsafe {
            reason: Some("strip break".to_string()),
        });
        assert_eq!(
            cmd,
            Some(ControlCommand::TriggerFailsafe {
                reason: "strip break".to_string()
            })
        );
    }
}
