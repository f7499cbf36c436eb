// Copyright (c) 2026 xmpp-rs contributors.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! A one-to-one [XMPP](https://xmpp.org/) chat client for the terminal.
//!
//! The client logs into an account, announces its presence, then sends every
//! word typed on standard input as a chat message to a single peer, while
//! printing the chat messages it receives. Typing `exit` ends the session.
//!
//! The XML stream layer comes from [`tokio_xmpp::xmlstream`]. On top of it,
//! this crate dials the server, upgrades the connection with STARTTLS
//! ([`connector`]), authenticates and binds a resource ([`login`]), all under
//! one deadline, and logs the XML exchanged on the wire when asked to. The
//! session then carries raw elements, decoded only where they are used.

#![deny(unsafe_code, bare_trait_objects)]

#[macro_use]
extern crate log;

pub mod address;
pub mod client;
pub mod config;
pub mod connector;
pub mod dial;
pub mod error;
pub mod input;
pub mod logging;
pub mod login;
pub mod message;
pub mod negotiate;
pub mod presence;
pub mod receive;
pub mod send;
pub mod session;
pub mod shutdown;
pub mod tap;

#[doc(inline)]
pub use crate::error::Error;

// Re-exports
pub use tokio_xmpp::{jid, minidom, parsers};
