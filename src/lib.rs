// Copyright 2026 The Parapet Project
// SPDX-License-Identifier: Apache-2.0

pub mod aggregate;
pub mod config;
pub mod dedup;
pub mod delta;
pub mod deserialize;
pub mod finalize;
pub mod frame;
pub mod pipeline;
pub mod repair;
pub mod shape;
pub mod tool_call;
pub mod transport;
