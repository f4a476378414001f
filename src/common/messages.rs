//! Serialize and deserialize DHT messages.

mod internal;

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use bytes::Bytes;
use serde_bytes::ByteBuf;

use crate::common::{Contact, Key, Value, ValueType};
use crate::{Error, Result};

#[derive(Debug, PartialEq, Clone)]
pub struct Message {
    pub transaction_id: u32,

    /// The author of the message, the requester or the responder.
    pub sender: Contact,

    pub message_type: MessageType,
}

#[derive(Debug, PartialEq, Clone)]
pub enum MessageType {
    Request(RequestSpecific),

    Response(ResponseSpecific),
}

#[derive(Debug, PartialEq, Clone)]
pub enum RequestSpecific {
    Ping,
    FindNode(FindNodeRequestArguments),
    FindValue(FindValueRequestArguments),
    Store(StoreRequestArguments),
}

#[derive(Debug, PartialEq, Clone)]
pub enum ResponseSpecific {
    Ping(PingResponseArguments),
    FindNode(FindNodeResponseArguments),
    FindValue(FindValueResponseArguments),
    Store(StoreResponseArguments),
}

// === PING ===

#[derive(Debug, PartialEq, Clone)]
pub struct PingResponseArguments {
    /// The requester's address as seen by the responder.
    pub external_address: SocketAddr,
}

// === FIND_NODE ===

#[derive(Debug, PartialEq, Clone)]
pub struct FindNodeRequestArguments {
    pub target: Key,
}

#[derive(Debug, PartialEq, Clone)]
pub struct FindNodeResponseArguments {
    /// Token the requester must present in a following store request.
    pub token: Vec<u8>,
    pub nodes: Vec<Contact>,
}

// === FIND_VALUE ===

#[derive(Debug, PartialEq, Clone)]
pub struct FindValueRequestArguments {
    pub target: Key,
    pub value_type: ValueType,
    /// Secondary keys of the values the requester wants in full.
    ///
    /// Empty on the first request of a lookup.
    pub secondary_keys: Vec<Key>,
}

#[derive(Debug, PartialEq, Clone)]
pub struct FindValueResponseArguments {
    pub request_load: f32,
    pub values: Vec<Value>,
    /// Secondary keys of values available for a follow up request.
    pub keys: Vec<Key>,
}

// === STORE ===

#[derive(Debug, PartialEq, Clone)]
pub struct StoreRequestArguments {
    pub token: Option<Vec<u8>>,
    pub values: Vec<Value>,
}

#[derive(Debug, PartialEq, Clone)]
pub struct StoreResponseArguments {
    /// One status per stored value, in request order.
    pub statuses: Vec<StoreStatus>,
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct StoreStatus {
    pub primary_key: Key,
    pub secondary_key: Key,
    pub code: StoreStatusCode,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum StoreStatusCode {
    Succeeded,
    Failed,
}

impl StoreStatusCode {
    pub fn code(&self) -> u16 {
        match self {
            StoreStatusCode::Succeeded => 1,
            StoreStatusCode::Failed => 2,
        }
    }

    pub fn from_code(code: u16) -> Result<StoreStatusCode> {
        match code {
            1 => Ok(StoreStatusCode::Succeeded),
            2 => Ok(StoreStatusCode::Failed),
            _ => Err(Error::InvalidStatusCode(code)),
        }
    }
}

impl Message {
    fn into_serde_message(self) -> internal::DHTMessage {
        internal::DHTMessage {
            transaction_id: ByteBuf::from(self.transaction_id.to_be_bytes().to_vec()),
            contact: contact_to_serde(&self.sender),
            variant: match self.message_type {
                MessageType::Request(request) => {
                    internal::DHTMessageVariant::Request(match request {
                        RequestSpecific::Ping => internal::DHTRequestSpecific::Ping {
                            arguments: internal::DHTPingRequestArguments {},
                        },
                        RequestSpecific::FindNode(arguments) => {
                            internal::DHTRequestSpecific::FindNode {
                                arguments: internal::DHTFindNodeRequestArguments {
                                    target: key_to_bytes(&arguments.target),
                                },
                            }
                        }
                        RequestSpecific::FindValue(arguments) => {
                            internal::DHTRequestSpecific::FindValue {
                                arguments: internal::DHTFindValueRequestArguments {
                                    target: key_to_bytes(&arguments.target),
                                    value_type: arguments.value_type.0,
                                    keys: arguments
                                        .secondary_keys
                                        .iter()
                                        .map(key_to_bytes)
                                        .collect(),
                                },
                            }
                        }
                        RequestSpecific::Store(arguments) => internal::DHTRequestSpecific::Store {
                            arguments: internal::DHTStoreRequestArguments {
                                token: arguments.token.map(ByteBuf::from),
                                values: arguments.values.iter().map(value_to_serde).collect(),
                            },
                        },
                    })
                }

                MessageType::Response(response) => {
                    internal::DHTMessageVariant::Response(match response {
                        ResponseSpecific::Ping(arguments) => internal::DHTResponseSpecific::Ping {
                            arguments: internal::DHTPingResponseArguments {
                                ip: ByteBuf::from(sockaddr_to_bytes(&arguments.external_address)),
                            },
                        },
                        ResponseSpecific::FindNode(arguments) => {
                            internal::DHTResponseSpecific::FindNode {
                                arguments: internal::DHTFindNodeResponseArguments {
                                    token: ByteBuf::from(arguments.token),
                                    nodes: arguments.nodes.iter().map(contact_to_serde).collect(),
                                },
                            }
                        }
                        ResponseSpecific::FindValue(arguments) => {
                            internal::DHTResponseSpecific::FindValue {
                                arguments: internal::DHTFindValueResponseArguments {
                                    load: arguments.request_load.to_bits(),
                                    values: arguments.values.iter().map(value_to_serde).collect(),
                                    keys: arguments.keys.iter().map(key_to_bytes).collect(),
                                },
                            }
                        }
                        ResponseSpecific::Store(arguments) => {
                            internal::DHTResponseSpecific::Store {
                                arguments: internal::DHTStoreResponseArguments {
                                    statuses: arguments
                                        .statuses
                                        .iter()
                                        .map(|status| internal::DHTStoreStatus {
                                            primary_key: key_to_bytes(&status.primary_key),
                                            secondary_key: key_to_bytes(&status.secondary_key),
                                            code: status.code.code(),
                                        })
                                        .collect(),
                                },
                            }
                        }
                    })
                }
            },
        }
    }

    fn from_serde_message(msg: internal::DHTMessage) -> Result<Message> {
        let sender = contact_from_serde(&msg.contact)?;

        Ok(Message {
            transaction_id: transaction_id(&msg.transaction_id)?,
            message_type: match msg.variant {
                internal::DHTMessageVariant::Request(request) => {
                    MessageType::Request(match request {
                        internal::DHTRequestSpecific::Ping { .. } => RequestSpecific::Ping,
                        internal::DHTRequestSpecific::FindNode { arguments } => {
                            RequestSpecific::FindNode(FindNodeRequestArguments {
                                target: Key::from_bytes(&arguments.target)?,
                            })
                        }
                        internal::DHTRequestSpecific::FindValue { arguments } => {
                            RequestSpecific::FindValue(FindValueRequestArguments {
                                target: Key::from_bytes(&arguments.target)?,
                                value_type: ValueType(arguments.value_type),
                                secondary_keys: arguments
                                    .keys
                                    .iter()
                                    .map(Key::from_bytes)
                                    .collect::<Result<_>>()?,
                            })
                        }
                        internal::DHTRequestSpecific::Store { arguments } => {
                            RequestSpecific::Store(StoreRequestArguments {
                                token: arguments.token.map(ByteBuf::into_vec),
                                values: arguments
                                    .values
                                    .iter()
                                    .map(|value| value_from_serde(value, &sender))
                                    .collect::<Result<_>>()?,
                            })
                        }
                    })
                }

                internal::DHTMessageVariant::Response(response) => {
                    MessageType::Response(match response {
                        internal::DHTResponseSpecific::Ping { arguments } => {
                            ResponseSpecific::Ping(PingResponseArguments {
                                external_address: bytes_to_sockaddr(&arguments.ip)?,
                            })
                        }
                        internal::DHTResponseSpecific::FindNode { arguments } => {
                            ResponseSpecific::FindNode(FindNodeResponseArguments {
                                token: arguments.token.into_vec(),
                                nodes: arguments
                                    .nodes
                                    .iter()
                                    .map(contact_from_serde)
                                    .collect::<Result<_>>()?,
                            })
                        }
                        internal::DHTResponseSpecific::FindValue { arguments } => {
                            ResponseSpecific::FindValue(FindValueResponseArguments {
                                request_load: f32::from_bits(arguments.load),
                                values: arguments
                                    .values
                                    .iter()
                                    .map(|value| value_from_serde(value, &sender))
                                    .collect::<Result<_>>()?,
                                keys: arguments
                                    .keys
                                    .iter()
                                    .map(Key::from_bytes)
                                    .collect::<Result<_>>()?,
                            })
                        }
                        internal::DHTResponseSpecific::Store { arguments } => {
                            ResponseSpecific::Store(StoreResponseArguments {
                                statuses: arguments
                                    .statuses
                                    .iter()
                                    .map(|status| {
                                        Ok(StoreStatus {
                                            primary_key: Key::from_bytes(&status.primary_key)?,
                                            secondary_key: Key::from_bytes(&status.secondary_key)?,
                                            code: StoreStatusCode::from_code(status.code)?,
                                        })
                                    })
                                    .collect::<Result<_>>()?,
                            })
                        }
                    })
                }
            },
            sender,
        })
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(self.clone().into_serde_message().to_bytes()?)
    }

    pub fn from_bytes<T: AsRef<[u8]>>(bytes: T) -> Result<Message> {
        Message::from_serde_message(internal::DHTMessage::from_bytes(bytes.as_ref())?)
    }

    /// Stamp the address this message actually arrived from on its sender,
    /// and on the sender of every value it carries (and on the creator of
    /// values stored directly).
    pub fn received_from(mut self, from: SocketAddr) -> Message {
        self.sender.source_address = Some(from);

        if let MessageType::Request(RequestSpecific::Store(arguments)) = &mut self.message_type {
            for value in arguments.values.iter_mut() {
                value.sender.source_address = Some(from);

                if value.is_direct() {
                    value.creator.source_address = Some(from);
                }
            }
        }

        self
    }

    /// Short name of the message kind, for logging.
    pub fn kind(&self) -> &'static str {
        match &self.message_type {
            MessageType::Request(request) => request.kind(),
            MessageType::Response(response) => match response {
                ResponseSpecific::Ping(_) => "ping",
                ResponseSpecific::FindNode(_) => "find_node",
                ResponseSpecific::FindValue(_) => "find_value",
                ResponseSpecific::Store(_) => "store",
            },
        }
    }
}

impl RequestSpecific {
    pub fn kind(&self) -> &'static str {
        match self {
            RequestSpecific::Ping => "ping",
            RequestSpecific::FindNode(_) => "find_node",
            RequestSpecific::FindValue(_) => "find_value",
            RequestSpecific::Store(_) => "store",
        }
    }
}

/// Parse a big endian transaction id of up to 4 bytes.
pub fn transaction_id(bytes: &[u8]) -> Result<u32> {
    if bytes.is_empty() || bytes.len() > 4 {
        return Err(Error::InvalidTransactionId(bytes.to_vec()));
    }

    Ok(bytes
        .iter()
        .fold(0_u32, |acc, byte| (acc << 8) | *byte as u32))
}

fn key_to_bytes(key: &Key) -> ByteBuf {
    ByteBuf::from(key.to_vec())
}

fn contact_to_serde(contact: &Contact) -> internal::DHTContact {
    internal::DHTContact {
        key: key_to_bytes(&contact.key),
        address: ByteBuf::from(sockaddr_to_bytes(&contact.contact_address)),
        vendor: contact.vendor,
        version: contact.version,
        instance_id: contact.instance_id,
        flags: contact.flags,
    }
}

fn contact_from_serde(contact: &internal::DHTContact) -> Result<Contact> {
    Ok(Contact {
        key: Key::from_bytes(&contact.key)?,
        contact_address: bytes_to_sockaddr(&contact.address)?,
        source_address: None,
        vendor: contact.vendor,
        version: contact.version,
        instance_id: contact.instance_id,
        flags: contact.flags,
        round_trip_time: None,
    })
}

fn value_to_serde(value: &Value) -> internal::DHTValue {
    internal::DHTValue {
        primary_key: key_to_bytes(&value.primary_key),
        creator: contact_to_serde(&value.creator),
        value_type: value.value_type.0,
        version: value.version,
        payload: ByteBuf::from(value.payload.to_vec()),
    }
}

/// Values on the wire never carry their sender, it is the message author.
fn value_from_serde(value: &internal::DHTValue, sender: &Contact) -> Result<Value> {
    Ok(Value {
        primary_key: Key::from_bytes(&value.primary_key)?,
        creator: contact_from_serde(&value.creator)?,
        sender: sender.clone(),
        value_type: ValueType(value.value_type),
        version: value.version,
        payload: Bytes::copy_from_slice(&value.payload),
        local: false,
    })
}

pub fn sockaddr_to_bytes(sockaddr: &SocketAddr) -> Vec<u8> {
    let mut bytes = match sockaddr.ip() {
        IpAddr::V4(v4) => v4.octets().to_vec(),
        IpAddr::V6(v6) => v6.octets().to_vec(),
    };

    bytes.extend(sockaddr.port().to_be_bytes());

    bytes
}

fn bytes_to_sockaddr<T: AsRef<[u8]>>(bytes: T) -> Result<SocketAddr> {
    let bytes = bytes.as_ref();

    let ip = match bytes.len() {
        6 => IpAddr::V4(Ipv4Addr::new(bytes[0], bytes[1], bytes[2], bytes[3])),
        18 => {
            let mut octets = [0_u8; 16];
            octets.copy_from_slice(&bytes[..16]);
            IpAddr::V6(Ipv6Addr::from(octets))
        }
        len => return Err(Error::InvalidAddressLength(len)),
    };

    let port = u16::from_be_bytes([bytes[bytes.len() - 2], bytes[bytes.len() - 1]]);

    Ok(SocketAddr::new(ip, port))
}
