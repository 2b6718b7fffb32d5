// SPDX-License-Identifier: Apache-2.0

//! `MessageParser`: stateless translator from a decoded speaker message to
//! an ordered list of `FibIntent`s.

use std::collections::BTreeSet;

use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error};

use crate::address::IPAddress;
use crate::fib::{FibIntent, FibOperation};
use crate::prefix::IPPrefix;

pub const SUPPORTED_API_VERSION: &str = "4.0.1";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ParseError {
    #[error("unsupported exabgp API version '{0}', expected '{SUPPORTED_API_VERSION}'")]
    UnsupportedApiVersion(String),
}

/// Reasons a single message failed to translate. Never propagated to the
/// caller — logged and folded into an empty intent list for that message.
#[derive(Debug)]
enum MessageError {
    MissingField(&'static str),
    InvalidValue(String),
}

impl std::fmt::Display for MessageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageError::MissingField(field) => write!(f, "missing field '{field}'"),
            MessageError::InvalidValue(v) => write!(f, "invalid value: {v}"),
        }
    }
}

fn get<'a>(value: &'a Value, path: &'static str) -> Result<&'a Value, MessageError> {
    value.get(path).ok_or(MessageError::MissingField(path))
}

fn as_str<'a>(value: &'a Value, field: &'static str) -> Result<&'a str, MessageError> {
    value
        .as_str()
        .ok_or_else(|| MessageError::InvalidValue(format!("'{field}' is not a string")))
}

fn parse_prefix(text: &str) -> Result<IPPrefix, MessageError> {
    text.parse()
        .map_err(|_| MessageError::InvalidValue(format!("'{text}' is not a prefix")))
}

fn parse_address(text: &str) -> Result<IPAddress, MessageError> {
    IPAddress::parse(text)
        .map_err(|_| MessageError::InvalidValue(format!("'{text}' is not an address")))
}

/// Stateless translator configured once with the address families the
/// deployment cares about (`advertise`/`learn` config, defaulting to
/// `ipv4 unicast` and `ipv6 unicast`).
pub struct MessageParser {
    wanted_families: BTreeSet<String>,
}

impl Default for MessageParser {
    fn default() -> Self {
        Self::new(
            ["ipv4 unicast", "ipv6 unicast"]
                .into_iter()
                .map(String::from)
                .collect(),
        )
    }
}

impl MessageParser {
    pub fn new(wanted_families: BTreeSet<String>) -> Self {
        Self { wanted_families }
    }

    /// Translate one decoded speaker message into an ordered, possibly
    /// empty, list of intents. `healthy_prefixes` feeds peer-up
    /// reconciliation for `state` messages.
    pub fn parse(
        &self,
        message: &Value,
        healthy_prefixes: Option<&BTreeSet<IPPrefix>>,
    ) -> Result<Vec<FibIntent>, ParseError> {
        let api_version = message
            .get("exabgp")
            .and_then(Value::as_str)
            .unwrap_or("");
        if api_version != SUPPORTED_API_VERSION {
            return Err(ParseError::UnsupportedApiVersion(api_version.to_string()));
        }

        let msg_type = message.get("type").and_then(Value::as_str).unwrap_or("");
        let intents = match msg_type {
            "state" => self.parse_state(message, healthy_prefixes),
            "update" => self.parse_update(message),
            other => {
                debug!(msg_type = other, "ignoring unsupported message type");
                Ok(Vec::new())
            }
        };

        Ok(intents.unwrap_or_else(|e| {
            error!(error = %e, "dropping malformed message");
            Vec::new()
        }))
    }

    fn parse_state(
        &self,
        message: &Value,
        healthy_prefixes: Option<&BTreeSet<IPPrefix>>,
    ) -> Result<Vec<FibIntent>, MessageError> {
        let neighbor = get(message, "neighbor")?;
        let state = as_str(get(neighbor, "state")?, "state")?;
        let peer_text = as_str(
            get(get(neighbor, "address")?, "peer")?,
            "neighbor.address.peer",
        )?;
        let peer = parse_address(peer_text)?;

        match state {
            "connected" => {
                debug!(%peer, "peer connected");
                Ok(Vec::new())
            }
            "up" => {
                debug!(%peer, "peer up");
                let intents = healthy_prefixes
                    .filter(|set| !set.is_empty())
                    .map(|set| {
                        set.iter()
                            .map(|prefix| FibIntent::add_route(*prefix, peer))
                            .collect()
                    })
                    .unwrap_or_default();
                Ok(intents)
            }
            "down" => {
                debug!(%peer, "peer down");
                Ok(vec![FibIntent::remove_all_routes(Some(peer))])
            }
            other => {
                debug!(%peer, state = other, "ignoring state");
                Ok(Vec::new())
            }
        }
    }

    fn parse_update(&self, message: &Value) -> Result<Vec<FibIntent>, MessageError> {
        let neighbor = get(message, "neighbor")?;
        let direction = neighbor
            .get("direction")
            .and_then(Value::as_str)
            .unwrap_or("receive");
        if direction != "receive" {
            return Ok(Vec::new());
        }

        let peer_text = as_str(
            get(get(neighbor, "address")?, "peer")?,
            "neighbor.address.peer",
        )?;
        let peer = parse_address(peer_text)?;

        let update = get(get(neighbor, "message")?, "update")?;
        let update_obj = update
            .as_object()
            .ok_or_else(|| MessageError::InvalidValue("'update' is not an object".to_string()))?;

        let mut intents = Vec::new();
        for (operation, families) in update_obj {
            if operation == "attribute" {
                continue;
            }
            let families_obj = families.as_object().ok_or_else(|| {
                MessageError::InvalidValue(format!("'{operation}' is not an object"))
            })?;

            for (family, payload) in families_obj {
                if !self.wanted_families.contains(family.as_str()) {
                    debug!(%peer, family, "ignoring unwanted family");
                    continue;
                }

                match operation.as_str() {
                    "announce" => intents.extend(self.parse_announce(payload)?),
                    "withdraw" => intents.extend(self.parse_withdraw(payload, peer)?),
                    other => debug!(operation = other, "ignoring unknown update operation"),
                }
            }
        }
        Ok(intents)
    }

    fn parse_announce(&self, payload: &Value) -> Result<Vec<FibIntent>, MessageError> {
        let by_next_hop = payload.as_object().ok_or_else(|| {
            MessageError::InvalidValue("announce family is not an object".to_string())
        })?;
        let mut intents = Vec::new();
        for (next_hop_text, nlris) in by_next_hop {
            let next_hop = parse_address(next_hop_text)?;
            let nlris = nlris.as_array().ok_or_else(|| {
                MessageError::InvalidValue("announce next-hop value is not an array".to_string())
            })?;
            for entry in nlris {
                let prefix_text = as_str(get(entry, "nlri")?, "nlri")?;
                let prefix = parse_prefix(prefix_text)?;
                intents.push(FibIntent::add_route(prefix, next_hop));
            }
        }
        Ok(intents)
    }

    fn parse_withdraw(
        &self,
        payload: &Value,
        peer: IPAddress,
    ) -> Result<Vec<FibIntent>, MessageError> {
        let nlris = payload.as_array().ok_or_else(|| {
            MessageError::InvalidValue("withdraw family is not an array".to_string())
        })?;
        let mut intents = Vec::new();
        for entry in nlris {
            let prefix_text = as_str(get(entry, "nlri")?, "nlri")?;
            let prefix = parse_prefix(prefix_text)?;
            intents.push(FibIntent::remove_route(prefix, peer));
        }
        Ok(intents)
    }
}
