// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent socket protocol.
//!
//! Wire format: one JSON object per WebSocket text frame,
//! `{"event": "<name>", "data": {...}}`.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod event;
mod wire;

pub use event::{
    AgentEvent, AppInformersArgs, DeployArgs, PreflightArgs, SupportBundleArgs,
    DEPLOY_RESULT_CALLBACK, UNDEPLOY_RESULT_CALLBACK,
};
pub use wire::{decode, encode, ProtocolError, MAX_MESSAGE_SIZE};
