// Copyright (c) 2026 xmpp-rs contributors.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use crate::jid::Jid;
use crate::Error;

/// Parse an address typed by the user.
pub fn parse_address(input: &str) -> Result<Jid, Error> {
    Jid::new(input).map_err(|source| Error::Address {
        input: input.to_owned(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parts(jid: &Jid) -> (Option<&str>, &str, Option<&str>) {
        (
            jid.node().map(|node| node.as_str()),
            jid.domain().as_str(),
            jid.resource().map(|resource| resource.as_str()),
        )
    }

    #[test]
    fn bare_jid() {
        let jid = parse_address("juliet@capulet.example").unwrap();
        assert_eq!(parts(&jid), (Some("juliet"), "capulet.example", None));
    }

    #[test]
    fn full_jid() {
        let jid = parse_address("romeo@montague.example/orchard").unwrap();
        assert_eq!(
            parts(&jid),
            (Some("romeo"), "montague.example", Some("orchard"))
        );
    }

    #[test]
    fn domain_only() {
        let jid = parse_address("montague.example").unwrap();
        assert_eq!(parts(&jid), (None, "montague.example", None));
    }

    #[test]
    fn resource_keeps_slashes() {
        let jid = parse_address("nurse@capulet.example/balcony/left").unwrap();
        assert_eq!(
            parts(&jid),
            (Some("nurse"), "capulet.example", Some("balcony/left"))
        );
    }

    #[test]
    fn invalid_addresses() {
        for input in ["", "@capulet.example", "juliet@", "juliet@capulet.example/"] {
            match parse_address(input) {
                Err(Error::Address { input: kept, .. }) => assert_eq!(kept, input),
                other => panic!("{:?} parsed as {:?}", input, other),
            }
        }
    }
}
