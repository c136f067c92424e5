// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Client protocol for n2ctl.
//!
//! JSON line DTOs, envelope parsing, mapping onto control commands and
//! token to role resolution.

pub mod auth;
pub mod codec;
pub mod mapping;
pub mod types;

pub use auth::{strip_bearer, RoleResolver};
pub use codec::{encode_response, parse_envelope};
pub use mapping::client_command_to_control;
pub use types::{ClientCommand, ClientEnvelope, ClientResponse};
