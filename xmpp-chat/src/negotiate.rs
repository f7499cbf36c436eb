// Copyright (c) 2026 xmpp-rs contributors.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Session establishment.
//!
//! This module describes what the client is willing to accept as a
//! [`NegotiationPolicy`] and drives a dialed connection through STARTTLS
//! ([`DialedConnector`]), then SASL and resource binding ([`login`]),
//! under the shared connect deadline.

use std::error::Error as StdError;
use std::fmt;
use std::io;

use sasl::client::MechanismError;
use tokio::net::TcpStream;
use tokio::time::{timeout_at, Instant};
use tokio_xmpp::xmlstream::{RecvFeaturesError, Timeouts, XmlStream};

use crate::config::Transport;
use crate::connector::{ConnectorError, DialedConnector, SecureStream};
use crate::dial::CONNECT_TIMEOUT;
use crate::input::Credentials;
use crate::jid::Jid;
use crate::logging::WireLog;
use crate::login::login;
use crate::minidom::Element;
use crate::parsers::sasl::DefinedCondition;
use crate::Error;

/// How the stream gets encrypted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TlsPolicy {
    /// Upgrade the plaintext stream with `<starttls/>` before authenticating.
    StartTls,
    /// The transport is secure by itself, no STARTTLS step.
    Transport,
}

/// SASL mechanisms, as advertised in `<mechanisms/>`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mechanism {
    ScramSha256Plus,
    ScramSha1Plus,
    ScramSha256,
    ScramSha1,
    Plain,
}

impl Mechanism {
    pub fn name(&self) -> &'static str {
        match self {
            Mechanism::ScramSha256Plus => "SCRAM-SHA-256-PLUS",
            Mechanism::ScramSha1Plus => "SCRAM-SHA-1-PLUS",
            Mechanism::ScramSha256 => "SCRAM-SHA-256",
            Mechanism::ScramSha1 => "SCRAM-SHA-1",
            Mechanism::Plain => "PLAIN",
        }
    }

    /// Whether the mechanism binds to the TLS channel.
    pub fn uses_channel_binding(&self) -> bool {
        matches!(self, Mechanism::ScramSha256Plus | Mechanism::ScramSha1Plus)
    }
}

/// Ordered preference, strongest first.
const DEFAULT_MECHANISMS: &[Mechanism] = &[
    Mechanism::ScramSha256Plus,
    Mechanism::ScramSha1Plus,
    Mechanism::ScramSha256,
    Mechanism::ScramSha1,
    Mechanism::Plain,
];

/// What the client accepts while negotiating a stream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NegotiationPolicy {
    pub tls: TlsPolicy,
    pub mechanisms: Vec<Mechanism>,
    pub bind_resource: bool,
}

impl NegotiationPolicy {
    /// The policy for a given transport.
    ///
    /// QUIC carries its own transport security so it skips STARTTLS; the
    /// rest is shared.
    pub fn for_transport(transport: Transport) -> NegotiationPolicy {
        NegotiationPolicy {
            tls: match transport {
                Transport::Tcp => TlsPolicy::StartTls,
                Transport::Quic => TlsPolicy::Transport,
            },
            mechanisms: DEFAULT_MECHANISMS.to_vec(),
            bind_resource: true,
        }
    }

    /// Whether tls-exporter channel binding should be offered to SASL.
    pub fn allows_channel_binding(&self) -> bool {
        self.mechanisms.iter().any(Mechanism::uses_channel_binding)
    }

    /// Reject policies the login cannot honour.
    ///
    /// It always binds a resource and only knows how to secure TCP streams
    /// with STARTTLS.
    pub fn check(&self) -> Result<(), Error> {
        if self.tls == TlsPolicy::Transport {
            return Err(Error::QuicNotImplemented);
        }
        if self.mechanisms.is_empty() {
            return Err(Error::Policy("no SASL mechanism allowed"));
        }
        if !self.bind_resource {
            return Err(Error::Policy("resource binding cannot be skipped"));
        }
        Ok(())
    }
}

/// Why a session could not be established.
#[derive(Debug)]
pub enum NegotiationError {
    /// Securing the connection failed.
    Connector(ConnectorError),
    /// The server sent a stream error or garbage instead of its features.
    Features(RecvFeaturesError),
    /// I/O error on the secured stream.
    Io(io::Error),
    /// None of the allowed mechanisms is offered; holds what the server
    /// offers.
    NoMechanism(Vec<String>),
    /// The SASL exchange could not be computed.
    Sasl(MechanismError),
    /// The server rejected the credentials.
    AuthFailed(DefinedCondition),
    /// Resource binding failed.
    Bind(String),
    /// The server closed the stream.
    Disconnected,
}

impl fmt::Display for NegotiationError {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match self {
            NegotiationError::Connector(e) => write!(fmt, "{}", e),
            NegotiationError::Features(e) => write!(fmt, "receiving stream features failed: {}", e),
            NegotiationError::Io(e) => write!(fmt, "connection error: {}", e),
            NegotiationError::NoMechanism(offered) => write!(
                fmt,
                "no acceptable SASL mechanism, the server offers {:?}",
                offered
            ),
            NegotiationError::Sasl(e) => write!(fmt, "SASL error: {}", e),
            NegotiationError::AuthFailed(condition) => {
                write!(fmt, "authentication failed: {:?}", condition)
            }
            NegotiationError::Bind(reason) => write!(fmt, "resource binding failed: {}", reason),
            NegotiationError::Disconnected => write!(fmt, "the server closed the stream"),
        }
    }
}

impl StdError for NegotiationError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            NegotiationError::Connector(e) => Some(e),
            NegotiationError::Features(e) => Some(e),
            NegotiationError::Io(e) => Some(e),
            NegotiationError::Sasl(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ConnectorError> for NegotiationError {
    fn from(e: ConnectorError) -> Self {
        NegotiationError::Connector(e)
    }
}

impl From<RecvFeaturesError> for NegotiationError {
    fn from(e: RecvFeaturesError) -> Self {
        NegotiationError::Features(e)
    }
}

impl From<io::Error> for NegotiationError {
    fn from(e: io::Error) -> Self {
        NegotiationError::Io(e)
    }
}

impl From<MechanismError> for NegotiationError {
    fn from(e: MechanismError) -> Self {
        NegotiationError::Sasl(e)
    }
}

/// An authenticated stream with a bound resource.
pub struct Negotiated {
    pub stream: XmlStream<SecureStream, Element>,
    /// The address the server bound for this session.
    pub bound_jid: Jid,
}

/// Establish a session over `stream`, giving up at `deadline`.
pub async fn negotiate(
    stream: TcpStream,
    credentials: &Credentials,
    policy: &NegotiationPolicy,
    wire: WireLog,
    deadline: Instant,
) -> Result<Negotiated, Error> {
    policy.check()?;
    debug!(
        "Negotiating as {} with mechanisms {:?}",
        credentials.jid,
        policy
            .mechanisms
            .iter()
            .map(Mechanism::name)
            .collect::<Vec<_>>()
    );

    let connector = DialedConnector::new(stream, policy, wire);
    let establish = async {
        let (pending, channel_binding) = connector
            .connect(credentials.jid.domain().as_str(), Timeouts::default())
            .await?;
        login(pending, credentials, policy, channel_binding).await
    };

    match timeout_at(deadline, establish).await {
        Ok(Ok((stream, bound_jid))) => {
            info!("Logged in as {}", bound_jid);
            Ok(Negotiated { stream, bound_jid })
        }
        Ok(Err(e)) => Err(Error::Negotiation(e)),
        Err(_) => Err(Error::NegotiationTimeout(CONNECT_TIMEOUT)),
    }
}
