// Copyright (c) 2026 xmpp-rs contributors.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Command-line flags.
//!
//! The client historically took Go-style flags (`-quic`, `-v`, `-h`), so
//! single-dash spellings of the long flags are rewritten to their double-dash
//! form before handing the arguments to clap.

use std::ffi::OsString;

use clap::Parser;

/// Long flags which may also be spelled with a single dash.
const LONG_FLAGS: &[&str] = &["help", "quic", "verbose"];

/// Transport used to reach the account's server.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transport {
    /// Plain TCP, upgraded with STARTTLS during negotiation.
    Tcp,
    /// QUIC, not implemented.
    Quic,
}

#[derive(Parser, Debug)]
#[command(
    about = "Chat with a single XMPP contact from the terminal.",
    after_help = "Running: xmpp-chat <flags> <JID Target>"
)]
struct Cli {
    /// Show verbose logging.
    #[arg(short, long)]
    verbose: bool,

    /// Use quic to connect to server.
    #[arg(long)]
    quic: bool,

    /// Address of the contact to chat with.
    #[arg(value_name = "JID Target")]
    target: String,
}

/// Settings parsed once at startup.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunConfig {
    /// Echo raw protocol traffic to standard error.
    pub verbose: bool,
    /// Transport selection.
    pub transport: Transport,
    /// The conversation target, as typed.
    pub target: String,
}

impl RunConfig {
    /// Parse the process arguments, program name included.
    pub fn try_parse_from<I, T>(args: I) -> Result<RunConfig, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString>,
    {
        let cli = Cli::try_parse_from(normalize_args(args))?;
        Ok(RunConfig {
            verbose: cli.verbose,
            transport: if cli.quic {
                Transport::Quic
            } else {
                Transport::Tcp
            },
            target: cli.target,
        })
    }
}

fn normalize_args<I, T>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString>,
{
    let mut positional_only = false;
    args.into_iter()
        .map(Into::into)
        .enumerate()
        .map(|(index, arg)| {
            if index == 0 || positional_only {
                return arg;
            }
            if arg == "--" {
                positional_only = true;
                return arg;
            }
            match arg.to_str().and_then(|s| s.strip_prefix('-')) {
                Some(name) if LONG_FLAGS.contains(&name) => OsString::from(format!("--{}", name)),
                _ => arg,
            }
        })
        .collect()
}
