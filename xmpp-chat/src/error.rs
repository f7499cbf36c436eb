// Copyright (c) 2026 xmpp-rs contributors.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::error::Error as StdError;
use std::fmt;
use std::io::Error as IoError;
use std::time::Duration;

use crate::jid::{self, Jid};
use crate::negotiate::NegotiationError;

/// Top-level error type
///
/// Every variant is fatal for the chat client. Errors decoding a single
/// incoming stanza are not represented here, they are logged and skipped.
#[derive(Debug)]
pub enum Error {
    /// Reading credentials or messages from standard input failed
    Input(IoError),
    /// An address could not be parsed as a JID
    Address {
        /// The string as typed by the user
        input: String,
        /// Why it was rejected
        source: jid::Error,
    },
    /// The account address has no local part to authenticate with
    MissingLocalpart(Jid),
    /// The QUIC transport was selected
    QuicNotImplemented,
    /// Resolving or connecting to the server failed
    Dial(tokio_xmpp::Error),
    /// The server could not be reached before the connect deadline
    DialTimeout(Duration),
    /// The negotiation policy cannot be honoured by the negotiator
    Policy(&'static str),
    /// Stream negotiation or authentication failed
    Negotiation(NegotiationError),
    /// The session was not established before the connect deadline
    NegotiationTimeout(Duration),
    /// Sending the initial presence failed
    Presence(IoError),
    /// Sending a chat message failed
    Send(IoError),
    /// Ending the stream failed
    CloseSession(IoError),
    /// Releasing the underlying connection failed
    CloseConnection(IoError),
}

impl fmt::Display for Error {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Input(e) => write!(fmt, "Error reading from stdin: {}", e),
            Error::Address { input, source } => {
                write!(fmt, "Error parsing {:?} as a JID: {}", input, source)
            }
            Error::MissingLocalpart(jid) => {
                write!(fmt, "Account address {} has no local part", jid)
            }
            Error::QuicNotImplemented => write!(fmt, "QUIC transport is not implemented"),
            Error::Dial(e) => write!(fmt, "Error dialing connection: {}", e),
            Error::DialTimeout(timeout) => {
                write!(fmt, "Error dialing connection: timed out after {:?}", timeout)
            }
            Error::Policy(reason) => write!(fmt, "Unsupported negotiation policy: {}", reason),
            Error::Negotiation(reason) => write!(fmt, "Error logging in: {}", reason),
            Error::NegotiationTimeout(timeout) => {
                write!(fmt, "Error logging in: timed out after {:?}", timeout)
            }
            Error::Presence(e) => write!(fmt, "Error sending initial presence: {}", e),
            Error::Send(e) => write!(fmt, "Error sending message: {}", e),
            Error::CloseSession(e) => write!(fmt, "Error ending session: {}", e),
            Error::CloseConnection(e) => write!(fmt, "Error ending connection: {}", e),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Error::Input(e)
            | Error::Presence(e)
            | Error::Send(e)
            | Error::CloseSession(e)
            | Error::CloseConnection(e) => Some(e),
            Error::Address { source, .. } => Some(source),
            Error::Dial(e) => Some(e),
            Error::Negotiation(e) => Some(e),
            _ => None,
        }
    }
}

impl From<tokio_xmpp::Error> for Error {
    fn from(e: tokio_xmpp::Error) -> Self {
        Error::Dial(e)
    }
}
