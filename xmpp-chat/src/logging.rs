// Copyright (c) 2026 xmpp-rs contributors.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use env_logger::Env;

/// Log target used for raw protocol traffic.
pub const WIRE_TARGET: &str = "xmpp_chat::wire";

const DEFAULT_FILTER: &str = "warn,xmpp_chat=info";

/// Install the process logger, writing timestamped lines to standard error.
///
/// `RUST_LOG` takes precedence over the default filter.
pub fn init() {
    let _ = env_logger::Builder::from_env(Env::default().default_filter_or(DEFAULT_FILTER))
        .format_target(false)
        .try_init();
}

/// Handle deciding whether raw protocol bytes get logged.
///
/// This is handed to whatever touches the transport; there is no global
/// switch.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WireLog {
    enabled: bool,
}

impl WireLog {
    /// A handle which logs when `enabled` is set.
    pub fn new(enabled: bool) -> WireLog {
        WireLog { enabled }
    }

    /// A handle which never logs.
    pub fn disabled() -> WireLog {
        WireLog::default()
    }

    /// Whether traffic is being logged.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Report bytes written to the peer.
    pub fn sent(&self, bytes: &[u8]) {
        self.log("SENT", bytes);
    }

    /// Report bytes read from the peer.
    pub fn received(&self, bytes: &[u8]) {
        self.log("RECV", bytes);
    }

    fn log(&self, direction: &str, bytes: &[u8]) {
        if self.enabled && !bytes.is_empty() {
            info!(target: WIRE_TARGET, "{} {}", direction, String::from_utf8_lossy(bytes));
        }
    }
}
