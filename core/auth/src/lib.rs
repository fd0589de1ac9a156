// Copyright AGNTCY Contributors (https://github.com/agntcy)
// SPDX-License-Identifier: Apache-2.0

pub mod bearer;
pub mod claims;
pub mod decision;
pub mod errors;
pub mod exchange;
pub mod redact;
pub mod server;
pub mod spiffe;
pub mod traits;
