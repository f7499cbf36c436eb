// Copyright (c) 2026 xmpp-rs contributors.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::io;

use futures::{Stream, StreamExt};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::jid::Jid;
use crate::message::ChatMessage;
use crate::minidom::Element;

/// Print incoming chat messages until the stream ends or `cancel` fires.
///
/// Lines are labelled with `target`, whoever the actual sender is.
pub async fn run<I, W>(
    mut inbound: I,
    mut out: W,
    target: Jid,
    cancel: CancellationToken,
) -> io::Result<()>
where
    I: Stream<Item = Element> + Unpin,
    W: AsyncWrite + Unpin,
{
    loop {
        let elem = tokio::select! {
            _ = cancel.cancelled() => break,
            elem = inbound.next() => match elem {
                Some(elem) => elem,
                None => break,
            },
        };

        if elem.name() != "message" {
            continue;
        }
        let message = match ChatMessage::try_from(elem) {
            Ok(message) => message,
            Err(e) => {
                warn!("Error decoding message: {}", e);
                continue;
            }
        };
        if !message.is_displayable() {
            continue;
        }

        out.write_all(format!("{}: {}\n", target, message.body).as_bytes())
            .await?;
        out.flush().await?;
    }
    Ok(())
}

/// Run the receiver on its own task.
pub fn spawn<I, W>(
    inbound: I,
    out: W,
    target: Jid,
    cancel: CancellationToken,
) -> JoinHandle<io::Result<()>>
where
    I: Stream<Item = Element> + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    tokio::spawn(run(inbound, out, target, cancel))
}
