// Copyright (c) 2026 xmpp-rs contributors.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use core::pin::Pin;
use core::task::{Context, Poll};
use std::io;

use pin_project_lite::pin_project;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

use crate::logging::WireLog;

pin_project! {
    /// Transparent I/O adapter reporting all traffic to a [`WireLog`].
    #[derive(Debug)]
    pub struct WireTap<S> {
        #[pin]
        inner: S,
        log: WireLog,
    }
}

impl<S> WireTap<S> {
    /// Wrap `inner`.
    pub fn new(inner: S, log: WireLog) -> WireTap<S> {
        WireTap { inner, log }
    }

    /// Access the wrapped stream.
    pub fn get_ref(&self) -> &S {
        &self.inner
    }

    /// Remove the tap.
    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S: AsyncRead> AsyncRead for WireTap<S> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.project();
        let before = buf.filled().len();
        let result = this.inner.poll_read(cx, buf);
        if let Poll::Ready(Ok(())) = result {
            this.log.received(&buf.filled()[before..]);
        }
        result
    }
}

impl<S: AsyncWrite> AsyncWrite for WireTap<S> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.project();
        let result = this.inner.poll_write(cx, buf);
        if let Poll::Ready(Ok(written)) = result {
            this.log.sent(&buf[..written]);
        }
        result
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.project().inner.poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.project().inner.poll_shutdown(cx)
    }
}
