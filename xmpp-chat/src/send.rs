// Copyright (c) 2026 xmpp-rs contributors.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use tokio::io::AsyncBufRead;
use tokio_xmpp::Stanza;

use crate::input::Tokens;
use crate::jid::Jid;
use crate::message::ChatMessage;
use crate::parsers::message::Message;
use crate::session::StanzaSink;
use crate::Error;

/// Typing this stops the conversation.
pub const EXIT: &str = "exit";

/// Send every token read from `input` as its own chat message to `target`,
/// until [`EXIT`] is read.
pub async fn run<R, S>(
    input: &mut Tokens<R>,
    session: &mut S,
    account: &Jid,
    target: &Jid,
) -> Result<(), Error>
where
    R: AsyncBufRead + Unpin,
    S: StanzaSink,
{
    loop {
        let token = input.next_token().await.map_err(Error::Input)?;
        if token == EXIT {
            return Ok(());
        }
        if token.is_empty() {
            continue;
        }

        let message = ChatMessage::new(account.clone(), target.clone(), &token);
        session
            .send_stanza(Stanza::from(Message::from(message)))
            .await
            .map_err(Error::Send)?;
    }
}
