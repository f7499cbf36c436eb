// Copyright (c) 2026 xmpp-rs contributors.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::io;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::session::SessionControl;
use crate::Error;

/// Tear the session down.
///
/// The receiver is stopped first. The stream is then ended while the
/// connection is still open, and the connection released last.
pub async fn run<S: SessionControl>(
    mut session: S,
    receiver: Option<JoinHandle<io::Result<()>>>,
    cancel: &CancellationToken,
) -> Result<(), Error> {
    cancel.cancel();
    if let Some(receiver) = receiver {
        match receiver.await {
            Ok(Ok(())) => (),
            Ok(Err(e)) => warn!("Error printing received messages: {}", e),
            Err(e) => warn!("Receiver task failed: {}", e),
        }
    }

    session.close_session().await.map_err(Error::CloseSession)?;
    session
        .close_connection()
        .await
        .map_err(Error::CloseConnection)
}
