// Copyright (c) 2026 xmpp-rs contributors.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! STARTTLS upgrade of a connection which was dialed beforehand.

use std::borrow::Cow;
use std::error::Error as StdError;
use std::fmt;
use std::io;
use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use sasl::common::ChannelBinding;
use tokio::io::{AsyncBufRead, AsyncWrite, BufStream};
use tokio::net::TcpStream;
use tokio_rustls::{
    client::TlsStream,
    rustls::{self, pki_types::ServerName, ClientConfig, RootCertStore},
    TlsConnector,
};
use tokio_xmpp::xmlstream::{
    initiate_stream, PendingFeaturesRecv, ReadError, RecvFeaturesError, StreamHeader, Timeouts,
    XmppStreamElement,
};

use crate::logging::WireLog;
use crate::negotiate::NegotiationPolicy;
use crate::parsers::{
    ns,
    starttls::{Nonza, Request},
};
use crate::tap::WireTap;

/// Errors while securing a dialed connection.
#[derive(Debug)]
pub enum ConnectorError {
    /// The server does not offer `<starttls/>`.
    NoStartTls,
    /// The STARTTLS exchange failed before the handshake.
    StartTls(String),
    /// The server sent a stream error or garbage instead of its features.
    Features(RecvFeaturesError),
    /// I/O error on the connection.
    Io(io::Error),
    /// TLS error
    Tls(rustls::Error),
    /// The account domain is not a valid TLS server name
    ServerName(String),
}

impl fmt::Display for ConnectorError {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::NoStartTls => write!(fmt, "server does not offer STARTTLS"),
            Self::StartTls(e) => write!(fmt, "STARTTLS failed: {}", e),
            Self::Features(e) => write!(fmt, "receiving stream features failed: {}", e),
            Self::Io(e) => write!(fmt, "connection error: {}", e),
            Self::Tls(e) => write!(fmt, "TLS error: {}", e),
            Self::ServerName(name) => write!(fmt, "invalid TLS server name: {}", name),
        }
    }
}

impl StdError for ConnectorError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Self::Features(e) => Some(e),
            Self::Io(e) => Some(e),
            Self::Tls(e) => Some(e),
            _ => None,
        }
    }
}

impl From<rustls::Error> for ConnectorError {
    fn from(e: rustls::Error) -> Self {
        Self::Tls(e)
    }
}

impl From<io::Error> for ConnectorError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<RecvFeaturesError> for ConnectorError {
    fn from(e: RecvFeaturesError) -> Self {
        Self::Features(e)
    }
}

/// The encrypted, tapped stream a session runs over.
pub type SecureStream = BufStream<WireTap<TlsStream<TcpStream>>>;

/// Secures one already dialed TCP connection.
///
/// The stream is upgraded with STARTTLS, and both the plaintext and the
/// encrypted legs are tapped into the [`WireLog`]. The connection is used
/// once; there is no reconnection.
pub struct DialedConnector {
    stream: TcpStream,
    channel_binding: bool,
    wire: WireLog,
}

impl fmt::Debug for DialedConnector {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        fmt.debug_struct("DialedConnector")
            .field("peer", &self.stream.peer_addr().ok())
            .field("channel_binding", &self.channel_binding)
            .finish_non_exhaustive()
    }
}

impl DialedConnector {
    pub fn new(stream: TcpStream, policy: &NegotiationPolicy, wire: WireLog) -> DialedConnector {
        DialedConnector {
            stream,
            channel_binding: policy.allows_channel_binding(),
            wire,
        }
    }

    /// Run STARTTLS and the TLS handshake, then open the encrypted stream.
    ///
    /// The returned stream still has to receive the server's features.
    pub async fn connect(
        self,
        domain: &str,
        timeouts: Timeouts,
    ) -> Result<(PendingFeaturesRecv<SecureStream>, ChannelBinding), ConnectorError> {
        let plaintext = BufStream::new(WireTap::new(self.stream, self.wire));
        let tcp_stream = starttls(plaintext, domain, timeouts)
            .await?
            .into_inner()
            .into_inner();

        let tls_stream = handshake(tcp_stream, domain).await?;
        let channel_binding = if self.channel_binding {
            channel_binding(&tls_stream)?
        } else {
            ChannelBinding::None
        };

        let encrypted = initiate_stream(
            BufStream::new(WireTap::new(tls_stream, self.wire)),
            ns::JABBER_CLIENT,
            header(domain),
            timeouts,
        )
        .await?;
        Ok((encrypted, channel_binding))
    }
}

pub(crate) fn header(domain: &str) -> StreamHeader<'_> {
    StreamHeader {
        to: Some(Cow::Borrowed(domain)),
        from: None,
        id: None,
    }
}

/// Open the plaintext stream, send `<starttls/>` and wait for `<proceed/>`,
/// then strip the XML layer off `io` again.
async fn starttls<Io: AsyncBufRead + AsyncWrite + Unpin>(
    io: Io,
    domain: &str,
    timeouts: Timeouts,
) -> Result<Io, ConnectorError> {
    let plaintext = initiate_stream(io, ns::JABBER_CLIENT, header(domain), timeouts).await?;
    let (features, mut stream) = plaintext.recv_features::<XmppStreamElement>().await?;
    if !features.can_starttls() {
        return Err(ConnectorError::NoStartTls);
    }

    stream
        .send(&XmppStreamElement::Starttls(Nonza::Request(Request)))
        .await?;

    loop {
        match stream.next().await {
            Some(Ok(XmppStreamElement::Starttls(Nonza::Proceed(_)))) => break,
            Some(Ok(XmppStreamElement::Starttls(Nonza::Failure(_)))) => {
                return Err(ConnectorError::StartTls(String::from(
                    "the server replied with <failure/>",
                )));
            }
            Some(Ok(XmppStreamElement::StreamError(e))) => {
                return Err(ConnectorError::StartTls(e.to_string()));
            }
            Some(Ok(other)) => {
                return Err(ConnectorError::StartTls(format!("unexpected {:?}", other)));
            }
            Some(Err(ReadError::SoftTimeout)) => (),
            Some(Err(ReadError::HardError(e))) => return Err(e.into()),
            Some(Err(ReadError::ParseError(e))) => {
                return Err(ConnectorError::StartTls(e.to_string()));
            }
            Some(Err(ReadError::StreamFooterReceived)) | None => {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "stream closed during STARTTLS",
                )
                .into())
            }
        }
    }

    Ok(stream.into_inner())
}

async fn handshake(
    stream: TcpStream,
    domain: &str,
) -> Result<TlsStream<TcpStream>, ConnectorError> {
    let server_name = ServerName::try_from(domain.to_owned())
        .map_err(|_| ConnectorError::ServerName(domain.to_owned()))?;

    let mut root_store = RootCertStore::empty();
    root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let config = ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()?
        .with_root_certificates(root_store)
        .with_no_client_auth();

    let tls_stream = TlsConnector::from(Arc::new(config))
        .connect(server_name, stream)
        .await?;
    debug!(
        "TLS established with {} ({:?})",
        domain,
        tls_stream.get_ref().1.protocol_version()
    );
    Ok(tls_stream)
}

fn channel_binding(stream: &TlsStream<TcpStream>) -> Result<ChannelBinding, ConnectorError> {
    let (_, connection) = stream.get_ref();
    Ok(match connection.protocol_version() {
        // tls-exporter is only defined for TLS 1.3.
        Some(rustls::ProtocolVersion::TLSv1_3) => {
            let data = connection.export_keying_material(
                vec![0u8; 32],
                b"EXPORTER-Channel-Binding",
                None,
            )?;
            ChannelBinding::TlsExporter(data)
        }
        _ => ChannelBinding::None,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::Transport;
    use crate::minidom::Element;
    use crate::parsers::stream_features::StreamFeatures;
    use tokio::net::TcpListener;
    use tokio_xmpp::xmlstream::{accept_stream, XmlStream};

    pub(crate) async fn connected_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (client, server) = tokio::join!(TcpStream::connect(addr), listener.accept());
        (client.unwrap(), server.unwrap().0)
    }

    /// Accept a client stream on `server` and advertise `features`.
    pub(crate) async fn serve_features(
        server: TcpStream,
        features: &str,
    ) -> XmlStream<BufStream<TcpStream>, Element> {
        let features = StreamFeatures::try_from(features.parse::<Element>().unwrap()).unwrap();
        accept_stream(
            BufStream::new(server),
            ns::JABBER_CLIENT,
            Timeouts::tight(),
        )
        .await
        .unwrap()
        .send_header(StreamHeader::default())
        .await
        .unwrap()
        .send_features::<Element>(&features)
        .await
        .unwrap()
    }

    fn connector(client: TcpStream) -> DialedConnector {
        let policy = NegotiationPolicy::for_transport(Transport::Tcp);
        DialedConnector::new(client, &policy, WireLog::disabled())
    }

    #[tokio::test]
    async fn server_without_starttls_is_refused() {
        let (client, server) = connected_pair().await;
        let server = tokio::spawn(async move {
            serve_features(
                server,
                "<stream:features xmlns:stream='http://etherx.jabber.org/streams'/>",
            )
            .await
        });

        let err = connector(client)
            .connect("capulet.example", Timeouts::tight())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, ConnectorError::NoStartTls), "{:?}", err);
        drop(server.await.unwrap());
    }

    #[tokio::test]
    async fn starttls_failure_reply_is_reported() {
        let (client, server) = connected_pair().await;
        let server = tokio::spawn(async move {
            let mut stream = serve_features(
                server,
                "<stream:features xmlns:stream='http://etherx.jabber.org/streams'>\
                     <starttls xmlns='urn:ietf:params:xml:ns:xmpp-tls'/>\
                 </stream:features>",
            )
            .await;
            let request = stream.next().await.unwrap().unwrap();
            assert_eq!(request.name(), "starttls");
            let failure: Element = "<failure xmlns='urn:ietf:params:xml:ns:xmpp-tls'/>"
                .parse()
                .unwrap();
            stream.send(&failure).await.unwrap();
            stream
        });

        let err = connector(client)
            .connect("capulet.example", Timeouts::tight())
            .await
            .err()
            .unwrap();
        match err {
            ConnectorError::StartTls(reason) => assert!(reason.contains("<failure/>")),
            other => panic!("unexpected error: {:?}", other),
        }
        drop(server.await.unwrap());
    }

    #[tokio::test]
    async fn stream_error_instead_of_features() {
        let (client, server) = connected_pair().await;
        let server = tokio::spawn(async move {
            let pending = accept_stream(
                BufStream::new(server),
                ns::JABBER_CLIENT,
                Timeouts::tight(),
            )
            .await
            .unwrap()
            .send_header(StreamHeader::default())
            .await
            .unwrap();
            let error = crate::parsers::stream_error::StreamError::new(
                crate::parsers::stream_error::DefinedCondition::HostUnknown,
                "en",
                "no such host",
            );
            pending.send_error(&error).await.unwrap();
        });

        let err = connector(client)
            .connect("capulet.example", Timeouts::tight())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, ConnectorError::Features(_)), "{:?}", err);
        assert!(err.source().is_some());
        server.await.unwrap();
    }

    #[tokio::test]
    async fn channel_binding_follows_policy() {
        let (client, _server) = connected_pair().await;
        let mut policy = NegotiationPolicy::for_transport(Transport::Tcp);
        policy.mechanisms.retain(|m| !m.uses_channel_binding());
        let connector = DialedConnector::new(client, &policy, WireLog::disabled());
        assert!(!connector.channel_binding);
    }

    #[test]
    fn stream_header_targets_the_domain() {
        let header = header("capulet.example");
        assert_eq!(header.to.as_deref(), Some("capulet.example"));
        assert!(header.from.is_none());
        assert!(header.id.is_none());
    }
}
