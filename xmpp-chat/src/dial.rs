// Copyright (c) 2026 xmpp-rs contributors.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::time::Duration;

use tokio::net::TcpStream;
use tokio::time::{timeout_at, Instant};
use tokio_xmpp::connect::DnsConfig;

use crate::config::Transport;
use crate::jid::Jid;
use crate::Error;

/// Budget for reaching the server and negotiating the session.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Where to find the server hosting `account`.
///
/// Uses the `_xmpp-client._tcp` SRV record of the account's domain, falling
/// back to port 5222 on the domain itself.
pub fn server_for(account: &Jid) -> DnsConfig {
    DnsConfig::srv_default_client(account.domain().as_str())
}

/// Opens the transport connection. TLS is left to the negotiator.
#[derive(Clone, Copy, Debug)]
pub struct Dialer {
    transport: Transport,
}

impl Dialer {
    pub fn new(transport: Transport) -> Dialer {
        Dialer { transport }
    }

    /// Connect to `server`, giving up at `deadline`.
    pub async fn dial(&self, server: &DnsConfig, deadline: Instant) -> Result<TcpStream, Error> {
        if self.transport == Transport::Quic {
            return Err(Error::QuicNotImplemented);
        }
        debug!("Dialing {}", server);
        let budget = deadline.saturating_duration_since(Instant::now());
        match timeout_at(deadline, server.resolve()).await {
            Ok(Ok(stream)) => {
                if let Ok(peer) = stream.peer_addr() {
                    debug!("Connected to {}", peer);
                }
                Ok(stream)
            }
            Ok(Err(e)) => Err(e.into()),
            Err(_) => Err(Error::DialTimeout(budget)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn quic_fails_before_dialing() {
        // Nothing listens there; reaching the network would fail differently.
        let server = DnsConfig::addr("127.0.0.1:9");
        let dialer = Dialer::new(Transport::Quic);
        match dialer.dial(&server, Instant::now() + CONNECT_TIMEOUT).await {
            Err(Error::QuicNotImplemented) => (),
            other => panic!("unexpected {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn tcp_connects() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let accept = tokio::spawn(async move { listener.accept().await.map(|(_, peer)| peer) });

        let server = DnsConfig::addr(&addr.to_string());
        let stream = Dialer::new(Transport::Tcp)
            .dial(&server, Instant::now() + CONNECT_TIMEOUT)
            .await
            .unwrap();
        assert_eq!(stream.peer_addr().unwrap(), addr);
        assert_eq!(
            accept.await.unwrap().unwrap(),
            stream.local_addr().unwrap()
        );
    }

    #[tokio::test]
    async fn refused_connection() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let server = DnsConfig::addr(&addr.to_string());
        match Dialer::new(Transport::Tcp)
            .dial(&server, Instant::now() + CONNECT_TIMEOUT)
            .await
        {
            Err(Error::Dial(_)) => (),
            other => panic!("unexpected {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn server_uses_account_domain() {
        let account = Jid::new("juliet@capulet.example/balcony").unwrap();
        assert_eq!(server_for(&account).to_string(), "capulet.example");
    }
}
