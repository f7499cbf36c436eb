// Copyright (c) 2026 xmpp-rs contributors.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use crate::{
    jid::Jid,
    minidom::Element,
    parsers::message::{Lang, Message, MessageType},
};

/// Error returned when an element cannot be decoded as a `<message/>`.
pub type DecodeError = <Message as TryFrom<Element>>::Error;

/// The subset of a `<message/>` this client deals with.
#[derive(Clone, Debug, PartialEq)]
pub struct ChatMessage {
    pub from: Option<Jid>,
    pub to: Option<Jid>,
    pub type_: MessageType,
    pub body: String,
}

impl ChatMessage {
    /// A chat message from `from` to `to`.
    pub fn new(from: Jid, to: Jid, body: &str) -> ChatMessage {
        ChatMessage {
            from: Some(from),
            to: Some(to),
            type_: MessageType::Chat,
            body: body.to_owned(),
        }
    }

    /// Only chat messages carrying text get shown.
    pub fn is_displayable(&self) -> bool {
        self.type_ == MessageType::Chat && !self.body.is_empty()
    }
}

impl From<Message> for ChatMessage {
    fn from(mut message: Message) -> ChatMessage {
        let body = match message.bodies.remove("") {
            Some(body) => Some(body),
            None => message.bodies.into_values().next(),
        };
        ChatMessage {
            from: message.from,
            to: message.to,
            type_: message.type_,
            body: body.unwrap_or_default(),
        }
    }
}

impl From<ChatMessage> for Message {
    fn from(chat: ChatMessage) -> Message {
        let mut message = Message::new(chat.to);
        message.from = chat.from;
        message.type_ = chat.type_;
        message.bodies.insert(Lang::default(), chat.body);
        message
    }
}

impl TryFrom<Element> for ChatMessage {
    type Error = DecodeError;

    fn try_from(elem: Element) -> Result<ChatMessage, DecodeError> {
        Message::try_from(elem).map(ChatMessage::from)
    }
}
