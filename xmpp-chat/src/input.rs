// Copyright (c) 2026 xmpp-rs contributors.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::collections::VecDeque;
use std::fmt;
use std::io;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use crate::address::parse_address;
use crate::jid::Jid;
use crate::Error;

/// Whitespace-delimited tokens read from a line-oriented input.
///
/// Tokens remaining on a line are kept for the following calls, so a prompt
/// answered with several words consumes only the first one.
pub struct Tokens<R> {
    reader: R,
    pending: VecDeque<String>,
    line: String,
}

impl<R: AsyncBufRead + Unpin> Tokens<R> {
    pub fn new(reader: R) -> Tokens<R> {
        Tokens {
            reader,
            pending: VecDeque::new(),
            line: String::new(),
        }
    }

    /// Wait for the next token.
    ///
    /// End of input is reported as [`io::ErrorKind::UnexpectedEof`].
    pub async fn next_token(&mut self) -> io::Result<String> {
        loop {
            if let Some(token) = self.pending.pop_front() {
                return Ok(token);
            }
            self.line.clear();
            if self.reader.read_line(&mut self.line).await? == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "end of input",
                ));
            }
            self.pending
                .extend(self.line.split_whitespace().map(str::to_owned));
        }
    }
}

/// Account address and password, held in memory only.
#[derive(Clone)]
pub struct Credentials {
    pub jid: Jid,
    pub password: String,
}

impl Credentials {
    /// Validate what the user typed.
    pub fn parse(addr: &str, password: String) -> Result<Credentials, Error> {
        let jid = parse_address(addr)?;
        if jid.node().is_none() {
            return Err(Error::MissingLocalpart(jid));
        }
        Ok(Credentials { jid, password })
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        fmt.debug_struct("Credentials")
            .field("jid", &self.jid)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Ask for the account address and the password.
///
/// The password is echoed like any other input.
pub async fn prompt_credentials<R, W>(
    input: &mut Tokens<R>,
    prompts: &mut W,
) -> Result<(String, String), Error>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let addr = ask(input, prompts, "Input your JID: ").await?;
    let password = ask(input, prompts, "Password: ").await?;
    Ok((addr, password))
}

async fn ask<R, W>(input: &mut Tokens<R>, prompts: &mut W, prompt: &str) -> Result<String, Error>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    prompts
        .write_all(prompt.as_bytes())
        .await
        .map_err(Error::Input)?;
    prompts.flush().await.map_err(Error::Input)?;
    input.next_token().await.map_err(Error::Input)
}
