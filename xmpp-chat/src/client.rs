// Copyright (c) 2026 xmpp-rs contributors.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The whole client lifecycle, from the credential prompts to the teardown.

use futures::Stream;
use tokio::io::{AsyncBufRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::address::parse_address;
use crate::config::RunConfig;
use crate::dial::{server_for, Dialer, CONNECT_TIMEOUT};
use crate::input::{prompt_credentials, Credentials, Tokens};
use crate::jid::Jid;
use crate::logging::WireLog;
use crate::minidom::Element;
use crate::negotiate::{negotiate, NegotiationPolicy};
use crate::session::{SessionControl, XmppSession};
use crate::{presence, receive, send, shutdown, Error};

/// Who talks to whom.
#[derive(Clone, Debug, PartialEq)]
pub struct Conversation {
    /// Our own address, used as the sender of every message.
    pub account: Jid,
    /// The only peer messages are sent to, and the label of received ones.
    pub target: Jid,
}

async fn say<W: AsyncWrite + Unpin>(console: &mut W, line: &str) {
    let written = async {
        console.write_all(line.as_bytes()).await?;
        console.write_all(b"\n").await?;
        console.flush().await
    };
    if let Err(e) = written.await {
        warn!("Error writing to stdout: {}", e);
    }
}

/// Chat over an established session, then tear it down.
///
/// Received messages are written to `out` from a separate task, while
/// `console` gets the status lines. Teardown happens even when announcing
/// presence or sending fails; that first error is the one returned.
pub async fn converse<R, S, I, W, C>(
    input: &mut Tokens<R>,
    mut session: S,
    inbound: I,
    out: W,
    console: &mut C,
    conversation: &Conversation,
) -> Result<(), Error>
where
    R: AsyncBufRead + Unpin,
    S: SessionControl,
    I: Stream<Item = Element> + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
    C: AsyncWrite + Unpin,
{
    let cancel = CancellationToken::new();
    let mut receiver = None;

    let result = match presence::announce(&mut session).await {
        Ok(()) => {
            receiver = Some(receive::spawn(
                inbound,
                out,
                conversation.target.clone(),
                cancel.clone(),
            ));
            say(console, "Start messaging (type 'exit' to exit)").await;
            send::run(
                input,
                &mut session,
                &conversation.account,
                &conversation.target,
            )
            .await
        }
        Err(e) => Err(e),
    };

    say(console, "Closing session...").await;
    let closed = shutdown::run(session, receiver, &cancel).await;
    match (result, closed) {
        (Err(e), Err(closing)) => {
            error!("{}", closing);
            Err(e)
        }
        (result, closed) => result.and(closed),
    }
}

/// Run the client as configured on the command line, on the process'
/// standard streams.
pub async fn run(config: RunConfig) -> Result<(), Error> {
    let mut input = Tokens::new(BufReader::new(tokio::io::stdin()));
    let mut stdout = tokio::io::stdout();

    let (addr, password) = prompt_credentials(&mut input, &mut stdout).await?;
    let credentials = Credentials::parse(&addr, password)?;
    let target = parse_address(&config.target)?;

    say(&mut stdout, "Logging in...").await;
    let policy = NegotiationPolicy::for_transport(config.transport);
    let wire = WireLog::new(config.verbose);
    let deadline = Instant::now() + CONNECT_TIMEOUT;

    let stream = Dialer::new(config.transport)
        .dial(&server_for(&credentials.jid), deadline)
        .await?;
    let negotiated = negotiate(stream, &credentials, &policy, wire, deadline).await?;
    let (session, inbound) = XmppSession::start(negotiated.stream);

    let conversation = Conversation {
        account: credentials.jid,
        target,
    };
    converse(
        &mut input,
        session,
        inbound,
        tokio::io::stdout(),
        &mut stdout,
        &conversation,
    )
    .await
}
