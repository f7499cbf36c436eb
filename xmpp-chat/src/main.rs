// Copyright (c) 2026 xmpp-rs contributors.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::process::ExitCode;

use clap::error::ErrorKind;
use xmpp_chat::{client, config::RunConfig, logging};

#[tokio::main]
async fn main() -> ExitCode {
    let config = match RunConfig::try_parse_from(std::env::args_os()) {
        Ok(config) => config,
        Err(e) => {
            // Help goes to stdout, usage errors to stderr.
            let _ = e.print();
            return match e.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => ExitCode::SUCCESS,
                _ => ExitCode::FAILURE,
            };
        }
    };

    logging::init();

    match client::run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
