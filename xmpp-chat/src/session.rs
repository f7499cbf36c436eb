// Copyright (c) 2026 xmpp-rs contributors.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use core::future::Future;
use core::pin::Pin;
use core::task::{Context, Poll};
use std::io;

use futures::{SinkExt, Stream, StreamExt};
use tokio::io::{AsyncBufRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_xmpp::xmlstream::{ReadError, XmlStream};
use tokio_xmpp::Stanza;

use crate::minidom::Element;
use crate::parsers::{
    iq::Iq,
    ns,
    ping::Ping,
    stanza_error::{DefinedCondition, ErrorType, StanzaError},
};

/// Write side of a session.
pub trait StanzaSink {
    /// Send one stanza, returning once it has been written out.
    fn send_stanza(&mut self, stanza: Stanza) -> impl Future<Output = io::Result<()>> + Send;
}

/// Teardown of a session, in two steps which must run in this order.
pub trait SessionControl: StanzaSink {
    /// End the XML stream. The connection must still be open.
    fn close_session(&mut self) -> impl Future<Output = io::Result<()>> + Send;

    /// Release the underlying connection.
    fn close_connection(self) -> impl Future<Output = io::Result<()>> + Send;
}

enum Command {
    Send(Stanza, oneshot::Sender<io::Result<()>>),
    Close(oneshot::Sender<io::Result<()>>),
}

/// Incoming stanzas, as elements, until the session ends.
pub struct Inbound {
    rx: mpsc::UnboundedReceiver<Element>,
}

impl Stream for Inbound {
    type Item = Element;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Element>> {
        self.rx.poll_recv(cx)
    }
}

/// A negotiated session.
///
/// The XML stream lives in a driver task which owns the connection; this
/// handle talks to it over a channel, so that reading (through [`Inbound`])
/// and writing can happen from different tasks.
///
/// Received top-level elements are forwarded as they are. Nothing is decoded
/// here, so a stanza which is well-formed XML but not valid XMPP only affects
/// whoever tries to decode it.
pub struct XmppSession {
    commands: mpsc::UnboundedSender<Command>,
    driver: JoinHandle<()>,
}

impl XmppSession {
    /// Spawn the driver task over a bound stream.
    pub fn start<Io>(stream: XmlStream<Io, Element>) -> (XmppSession, Inbound)
    where
        Io: AsyncBufRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (commands, command_rx) = mpsc::unbounded_channel();
        let (inbound_tx, rx) = mpsc::unbounded_channel();
        let driver = tokio::spawn(drive(stream, command_rx, inbound_tx));
        (XmppSession { commands, driver }, Inbound { rx })
    }

    async fn request(
        &self,
        command: impl FnOnce(oneshot::Sender<io::Result<()>>) -> Command,
    ) -> io::Result<()> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(command(reply))
            .map_err(|_| not_connected())?;
        response.await.map_err(|_| not_connected())?
    }
}

impl StanzaSink for XmppSession {
    async fn send_stanza(&mut self, stanza: Stanza) -> io::Result<()> {
        self.request(|reply| Command::Send(stanza, reply)).await
    }
}

impl SessionControl for XmppSession {
    async fn close_session(&mut self) -> io::Result<()> {
        self.request(Command::Close).await
    }

    async fn close_connection(self) -> io::Result<()> {
        drop(self.commands);
        self.driver.await.map_err(io::Error::other)
    }
}

fn not_connected() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "session is closed")
}

/// Sent after a stretch of silence from the server; any answer will do.
fn keepalive(seq: u64) -> Iq {
    Iq::from_get(format!("keepalive-{}", seq), Ping)
}

/// The reply owed to a request from the server, if `element` is one.
///
/// Pings get a result, every other request is refused.
fn answer(element: &Element) -> Option<Iq> {
    if !element.is("iq", ns::JABBER_CLIENT) {
        return None;
    }
    match Iq::try_from(element.clone()) {
        Ok(Iq::Get {
            from, id, payload, ..
        }) if payload.is("ping", ns::PING) => Some(Iq::Result {
            from: None,
            to: from,
            id,
            payload: None,
        }),
        Ok(Iq::Get { from, id, .. }) | Ok(Iq::Set { from, id, .. }) => Some(Iq::Error {
            from: None,
            to: from,
            id,
            error: StanzaError::new(
                ErrorType::Cancel,
                DefinedCondition::ServiceUnavailable,
                "en",
                "",
            ),
            payload: None,
        }),
        Ok(_) => None,
        Err(e) => {
            debug!("Not answering malformed iq: {}", e);
            None
        }
    }
}

async fn drive<Io>(
    mut stream: XmlStream<Io, Element>,
    mut commands: mpsc::UnboundedReceiver<Command>,
    inbound: mpsc::UnboundedSender<Element>,
) where
    Io: AsyncBufRead + AsyncWrite + Unpin,
{
    let mut pings = 0u64;

    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(Command::Send(stanza, reply)) => {
                    let _ = reply.send(stream.send(&stanza).await);
                }
                Some(Command::Close(reply)) => {
                    let _ = reply.send(stream.shutdown().await);
                    break;
                }
                None => {
                    if let Err(e) = stream.shutdown().await {
                        debug!("Stream closure failed: {}", e);
                    }
                    break;
                }
            },
            item = stream.next() => match item {
                Some(Ok(element)) => {
                    if element.is("error", ns::STREAM) {
                        error!("Stream error from the server: {:?}", element);
                        continue;
                    }
                    if let Some(reply) = answer(&element) {
                        if let Err(e) = stream.send(&reply).await {
                            error!("Answering the server failed: {}", e);
                            break;
                        }
                    }
                    let _ = inbound.send(element);
                }
                Some(Err(ReadError::ParseError(e))) => {
                    warn!("Dropping element which cannot be parsed: {}", e);
                }
                Some(Err(ReadError::SoftTimeout)) => {
                    pings += 1;
                    if let Err(e) = stream.send(&keepalive(pings)).await {
                        error!("Sending keepalive failed: {}", e);
                        break;
                    }
                }
                Some(Err(ReadError::StreamFooterReceived)) => {
                    debug!("The server closed the stream");
                    break;
                }
                Some(Err(ReadError::HardError(e))) => {
                    error!("Connection to the server lost: {}", e);
                    break;
                }
                None => {
                    debug!("Stream terminated");
                    break;
                }
            },
        }
    }

    drop(stream);
    drop(inbound);
    while let Some(command) = commands.recv().await {
        let reply = match command {
            Command::Send(_, reply) | Command::Close(reply) => reply,
        };
        let _ = reply.send(Err(not_connected()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connector::header;
    use crate::jid::Jid;
    use crate::message::ChatMessage;
    use crate::parsers::{message::Message, presence::Presence, stream_features::StreamFeatures};
    use crate::receive;
    use tokio::io::{duplex, AsyncBufReadExt, BufReader, BufStream, DuplexStream};
    use tokio_util::sync::CancellationToken;
    use tokio_xmpp::xmlstream::{accept_stream, initiate_stream, StreamHeader, Timeouts};

    type Wire = BufStream<DuplexStream>;

    /// A bound stream pair, client side first.
    async fn streams() -> (XmlStream<Wire, Element>, XmlStream<Wire, Element>) {
        let (lhs, rhs) = duplex(65536);
        let server = tokio::spawn(async move {
            accept_stream(BufStream::new(rhs), ns::JABBER_CLIENT, Timeouts::tight())
                .await
                .unwrap()
                .send_header(StreamHeader::default())
                .await
                .unwrap()
                .send_features::<Element>(&StreamFeatures::default())
                .await
                .unwrap()
        });
        let (_, client) = initiate_stream(
            BufStream::new(lhs),
            ns::JABBER_CLIENT,
            header("capulet.example"),
            Timeouts::tight(),
        )
        .await
        .unwrap()
        .recv_features::<Element>()
        .await
        .unwrap();
        (client, server.await.unwrap())
    }

    fn jid(s: &str) -> Jid {
        Jid::new(s).unwrap()
    }

    #[tokio::test]
    async fn invalid_stanza_does_not_end_the_session() {
        let (client, mut server) = streams().await;
        let (mut session, inbound) = XmppSession::start(client);

        let (out, printed) = duplex(1024);
        let cancel = CancellationToken::new();
        let receiver = receive::spawn(
            inbound,
            out,
            jid("juliet@capulet.example"),
            cancel.clone(),
        );

        for xml in [
            "<message xmlns='jabber:client' type='coucou'><body>bad</body></message>",
            "<message xmlns='jabber:client' type='chat'><body>good</body></message>",
        ] {
            server.send(&xml.parse::<Element>().unwrap()).await.unwrap();
        }

        let mut printed = BufReader::new(printed);
        let mut line = String::new();
        printed.read_line(&mut line).await.unwrap();
        assert_eq!(line, "juliet@capulet.example: good\n");

        let reply = ChatMessage::new(
            jid("romeo@montague.example"),
            jid("juliet@capulet.example"),
            "still here",
        );
        session
            .send_stanza(Stanza::from(Message::from(reply)))
            .await
            .unwrap();
        let sent = ChatMessage::try_from(server.next().await.unwrap().unwrap()).unwrap();
        assert_eq!(sent.body, "still here");

        cancel.cancel();
        receiver.await.unwrap().unwrap();
        session.close_session().await.unwrap();
        session.close_connection().await.unwrap();
        assert!(matches!(
            server.next().await,
            Some(Err(ReadError::StreamFooterReceived))
        ));
    }

    #[tokio::test]
    async fn server_closing_the_stream_ends_inbound() {
        let (client, mut server) = streams().await;
        let (mut session, mut inbound) = XmppSession::start(client);

        server
            .send(&"<presence xmlns='jabber:client'/>".parse::<Element>().unwrap())
            .await
            .unwrap();
        server.shutdown().await.unwrap();

        assert_eq!(inbound.next().await.unwrap().name(), "presence");
        assert!(inbound.next().await.is_none());

        let err = session
            .send_stanza(Stanza::from(Presence::available()))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotConnected);
        session.close_connection().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn silence_is_answered_with_a_ping() {
        let (client, mut server) = streams().await;
        let (session, _inbound) = XmppSession::start(client);

        let ping = loop {
            match server.next().await.unwrap() {
                Ok(element) => break Iq::try_from(element).unwrap(),
                Err(ReadError::SoftTimeout) => continue,
                Err(e) => panic!("unexpected read error: {}", e),
            }
        };
        let Iq::Get { id, payload, .. } = ping else {
            panic!("expected a get iq");
        };
        assert_eq!(id, "keepalive-1");
        assert!(payload.is("ping", ns::PING));
        session.close_connection().await.unwrap();
    }

    #[tokio::test]
    async fn server_requests_are_answered() {
        let (client, mut server) = streams().await;
        let (session, mut inbound) = XmppSession::start(client);

        for xml in [
            "<iq xmlns='jabber:client' type='get' id='p1' from='capulet.example'><ping xmlns='urn:xmpp:ping'/></iq>",
            "<iq xmlns='jabber:client' type='get' id='v1' from='capulet.example'><query xmlns='jabber:iq:version'/></iq>",
        ] {
            server.send(&xml.parse::<Element>().unwrap()).await.unwrap();
        }

        let pong = Iq::try_from(server.next().await.unwrap().unwrap()).unwrap();
        assert!(matches!(pong, Iq::Result { ref id, payload: None, .. } if id == "p1"));
        let refusal = Iq::try_from(server.next().await.unwrap().unwrap()).unwrap();
        match refusal {
            Iq::Error { id, to, error, .. } => {
                assert_eq!(id, "v1");
                assert_eq!(to, Some(jid("capulet.example")));
                assert_eq!(error.defined_condition, DefinedCondition::ServiceUnavailable);
            }
            other => panic!("expected an error iq, got {:?}", other),
        }

        // Requests still reach the reader, which ignores them.
        assert_eq!(inbound.next().await.unwrap().attr("id"), Some("p1"));
        session.close_connection().await.unwrap();
    }

    #[tokio::test]
    async fn inbound_ends_with_the_session() {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut inbound = Inbound { rx };
        tx.send("<presence xmlns='jabber:client'/>".parse::<Element>().unwrap())
            .unwrap();
        drop(tx);
        assert_eq!(inbound.next().await.unwrap().name(), "presence");
        assert!(inbound.next().await.is_none());
    }

    #[tokio::test]
    async fn requests_fail_once_the_driver_is_gone() {
        let (commands, command_rx) = mpsc::unbounded_channel();
        drop(command_rx);
        let mut session = XmppSession {
            commands,
            driver: tokio::spawn(async {}),
        };
        let err = session
            .send_stanza(Stanza::from(Presence::available()))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotConnected);
        let err = session.close_session().await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotConnected);
        session.close_connection().await.unwrap();
    }
}
