// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

use tokio::sync::oneshot;

use crate::{Actor, ControlCommand, ControlResult, ProcessView};

/// Request sent to the control task.
#[derive(Debug)]
pub struct ControlRequest {
    pub cmd: ControlCommand,
    pub actor: Actor,
    pub respond_to: oneshot::Sender<ControlResult<ProcessView>>,
}
