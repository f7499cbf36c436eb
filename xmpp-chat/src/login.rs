// Copyright (c) 2026 xmpp-rs contributors.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! SASL authentication and resource binding on a secured stream.
//!
//! Once bound, the stream carries plain [`Element`]s: stanzas are only
//! decoded by whoever consumes them, so a stanza this crate cannot make sense
//! of never tears the stream down.

use futures::{SinkExt, StreamExt};
use sasl::client::mechanisms::{Plain, Scram};
use sasl::client::{Mechanism as ClientMechanism, MechanismError};
use sasl::common::scram::{Sha1, Sha256};
use sasl::common::{ChannelBinding, Credentials as SaslCredentials};
use tokio::io::{AsyncBufRead, AsyncWrite};
use tokio_xmpp::xmlstream::{
    InitiatingStream, PendingFeaturesRecv, ReadError, XmlStream, XmppStream, XmppStreamElement,
};

use crate::connector::header;
use crate::input::Credentials;
use crate::jid::Jid;
use crate::minidom::Element;
use crate::negotiate::{Mechanism, NegotiationError, NegotiationPolicy};
use crate::parsers::{
    bind::{BindQuery, BindResponse},
    iq::Iq,
    ns,
    sasl::{Auth, Mechanism as WireMechanism, Nonza, Response},
    stream_features::StreamFeatures,
};

const BIND_REQ_ID: &str = "resource-bind";

type BoxedMechanism = Box<dyn ClientMechanism + Send + Sync>;

/// Authenticate on `pending`, restart the stream and bind a resource.
pub async fn login<Io: AsyncBufRead + AsyncWrite + Unpin>(
    pending: PendingFeaturesRecv<Io>,
    credentials: &Credentials,
    policy: &NegotiationPolicy,
    channel_binding: ChannelBinding,
) -> Result<(XmlStream<Io, Element>, Jid), NegotiationError> {
    let (features, stream) = pending.recv_features::<XmppStreamElement>().await?;
    let (chosen, client) = pick_mechanism(&features, credentials, policy, channel_binding)?;
    debug!("Authenticating with {}", chosen.name());

    let stream = auth(stream, chosen, client)
        .await?
        .send_header(header(credentials.jid.domain().as_str()))
        .await?;
    let (features, stream) = stream.recv_features::<Element>().await?;
    if !features.can_bind() {
        return Err(NegotiationError::Bind(String::from(
            "the server does not offer resource binding",
        )));
    }

    let resource = credentials.jid.resource().map(|r| r.as_str().to_owned());
    bind(stream, resource).await
}

/// The first mechanism of the policy the server offers and we can run.
fn pick_mechanism(
    features: &StreamFeatures,
    credentials: &Credentials,
    policy: &NegotiationPolicy,
    channel_binding: ChannelBinding,
) -> Result<(Mechanism, BoxedMechanism), NegotiationError> {
    let offered = &features.sasl_mechanisms.mechanisms;
    let username = match credentials.jid.node() {
        Some(node) => node.as_str().to_owned(),
        None => return Err(MechanismError::ScramRequiresUsername.into()),
    };
    let bound = channel_binding != ChannelBinding::None;

    for mechanism in policy.mechanisms.iter().copied() {
        if !offered.iter().any(|name| name == mechanism.name()) {
            continue;
        }
        let binding = match (mechanism.uses_channel_binding(), bound) {
            (true, true) => channel_binding.clone(),
            (true, false) => continue,
            // We could bind but the server does not offer a -PLUS mechanism.
            (false, true) => ChannelBinding::Unsupported,
            (false, false) => ChannelBinding::None,
        };
        let creds = SaslCredentials::default()
            .with_username(username.clone())
            .with_password(credentials.password.clone())
            .with_channel_binding(binding);
        return Ok((mechanism, client_mechanism(mechanism, creds)?));
    }

    Err(NegotiationError::NoMechanism(offered.clone()))
}

fn client_mechanism(
    mechanism: Mechanism,
    creds: SaslCredentials,
) -> Result<BoxedMechanism, MechanismError> {
    Ok(match mechanism {
        Mechanism::ScramSha256Plus | Mechanism::ScramSha256 => {
            Box::new(Scram::<Sha256>::from_credentials(creds)?)
        }
        Mechanism::ScramSha1Plus | Mechanism::ScramSha1 => {
            Box::new(Scram::<Sha1>::from_credentials(creds)?)
        }
        Mechanism::Plain => Box::new(Plain::from_credentials(creds)?),
    })
}

impl From<Mechanism> for WireMechanism {
    fn from(mechanism: Mechanism) -> WireMechanism {
        match mechanism {
            Mechanism::ScramSha256Plus => WireMechanism::ScramSha256Plus,
            Mechanism::ScramSha1Plus => WireMechanism::ScramSha1Plus,
            Mechanism::ScramSha256 => WireMechanism::ScramSha256,
            Mechanism::ScramSha1 => WireMechanism::ScramSha1,
            Mechanism::Plain => WireMechanism::Plain,
        }
    }
}

async fn auth<Io: AsyncBufRead + AsyncWrite + Unpin>(
    mut stream: XmppStream<Io>,
    chosen: Mechanism,
    mut client: BoxedMechanism,
) -> Result<InitiatingStream<Io>, NegotiationError> {
    stream
        .send(&XmppStreamElement::Sasl(Nonza::Auth(Auth {
            mechanism: chosen.into(),
            data: client.initial(),
        })))
        .await?;

    loop {
        match stream.next().await {
            Some(Ok(XmppStreamElement::Sasl(Nonza::Challenge(challenge)))) => {
                let data = client.response(&challenge.data)?;
                stream
                    .send(&XmppStreamElement::Sasl(Nonza::Response(Response { data })))
                    .await?;
            }
            Some(Ok(XmppStreamElement::Sasl(Nonza::Success(success)))) => {
                client.success(&success.data)?;
                return Ok(stream.initiate_reset());
            }
            Some(Ok(XmppStreamElement::Sasl(Nonza::Failure(failure)))) => {
                return Err(NegotiationError::AuthFailed(failure.defined_condition));
            }
            Some(Ok(XmppStreamElement::StreamError(e))) => {
                return Err(std::io::Error::other(e).into());
            }
            Some(Ok(other)) => debug!("Ignoring {:?} during SASL", other),
            Some(Err(ReadError::SoftTimeout)) => (),
            Some(Err(ReadError::HardError(e))) => return Err(e.into()),
            Some(Err(ReadError::ParseError(e))) => {
                return Err(std::io::Error::new(std::io::ErrorKind::InvalidData, e).into());
            }
            Some(Err(ReadError::StreamFooterReceived)) | None => {
                return Err(NegotiationError::Disconnected);
            }
        }
    }
}

async fn bind<Io: AsyncBufRead + AsyncWrite + Unpin>(
    mut stream: XmlStream<Io, Element>,
    resource: Option<String>,
) -> Result<(XmlStream<Io, Element>, Jid), NegotiationError> {
    let request = Iq::from_set(BIND_REQ_ID, BindQuery::new(resource));
    stream.send(&request).await?;

    loop {
        let element = match stream.next().await {
            Some(Ok(element)) => element,
            Some(Err(ReadError::SoftTimeout)) => continue,
            Some(Err(ReadError::HardError(e))) => return Err(e.into()),
            Some(Err(ReadError::ParseError(e))) => {
                warn!("Dropping unparsable element before bind: {}", e);
                continue;
            }
            Some(Err(ReadError::StreamFooterReceived)) | None => {
                return Err(NegotiationError::Disconnected);
            }
        };

        if !element.is("iq", ns::JABBER_CLIENT) || element.attr("id") != Some(BIND_REQ_ID) {
            debug!("Dropping <{}/> received before bind", element.name());
            continue;
        }

        let bound_jid = match Iq::try_from(element) {
            Ok(Iq::Result {
                payload: Some(payload),
                ..
            }) => BindResponse::try_from(payload)
                .map(Jid::from)
                .map_err(|e| NegotiationError::Bind(e.to_string()))?,
            Ok(Iq::Result { payload: None, .. }) => {
                return Err(NegotiationError::Bind(String::from(
                    "bind response has no payload",
                )));
            }
            Ok(Iq::Error { error, .. }) => {
                return Err(NegotiationError::Bind(format!(
                    "{:?}",
                    error.defined_condition
                )));
            }
            Ok(_) => {
                return Err(NegotiationError::Bind(String::from(
                    "unexpected IQ type in response to bind request",
                )));
            }
            Err(e) => return Err(NegotiationError::Bind(e.to_string())),
        };
        return Ok((stream, bound_jid));
    }
}
