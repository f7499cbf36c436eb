// Copyright (c) 2026 xmpp-rs contributors.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use tokio_xmpp::Stanza;

use crate::parsers::presence::Presence;
use crate::session::StanzaSink;
use crate::Error;

/// Announce availability, so that the server starts routing messages to
/// this resource.
pub async fn announce<S: StanzaSink>(session: &mut S) -> Result<(), Error> {
    session
        .send_stanza(Stanza::from(Presence::available()))
        .await
        .map_err(Error::Presence)
}
