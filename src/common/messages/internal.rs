use serde::{Deserialize, Serialize};
use serde_bytes::ByteBuf;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DHTMessage {
    #[serde(rename = "t")]
    pub transaction_id: ByteBuf,

    /// The author of the message.
    #[serde(rename = "c")]
    pub contact: DHTContact,

    #[serde(flatten)]
    pub variant: DHTMessageVariant,
}

impl DHTMessage {
    pub fn from_bytes(bytes: &[u8]) -> Result<DHTMessage, serde_bencode::Error> {
        let obj = serde_bencode::from_bytes(bytes)?;
        Ok(obj)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_bencode::Error> {
        serde_bencode::to_bytes(self)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "y")]
pub enum DHTMessageVariant {
    #[serde(rename = "q")]
    Request(DHTRequestSpecific),

    #[serde(rename = "r")]
    Response(DHTResponseSpecific),
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "q")]
pub enum DHTRequestSpecific {
    #[serde(rename = "ping")]
    Ping {
        #[serde(rename = "a")]
        arguments: DHTPingRequestArguments,
    },

    #[serde(rename = "find_node")]
    FindNode {
        #[serde(rename = "a")]
        arguments: DHTFindNodeRequestArguments,
    },

    #[serde(rename = "find_value")]
    FindValue {
        #[serde(rename = "a")]
        arguments: DHTFindValueRequestArguments,
    },

    #[serde(rename = "store")]
    Store {
        #[serde(rename = "a")]
        arguments: DHTStoreRequestArguments,
    },
}

// Responses carry their kind too, unlike KRPC, so decoding never has to
// guess from the shape of the arguments.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "q")]
pub enum DHTResponseSpecific {
    #[serde(rename = "ping")]
    Ping {
        #[serde(rename = "r")]
        arguments: DHTPingResponseArguments,
    },

    #[serde(rename = "find_node")]
    FindNode {
        #[serde(rename = "r")]
        arguments: DHTFindNodeResponseArguments,
    },

    #[serde(rename = "find_value")]
    FindValue {
        #[serde(rename = "r")]
        arguments: DHTFindValueResponseArguments,
    },

    #[serde(rename = "store")]
    Store {
        #[serde(rename = "r")]
        arguments: DHTStoreResponseArguments,
    },
}

// === Shared ===

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DHTContact {
    #[serde(rename = "k")]
    pub key: ByteBuf,

    /// Compact address, 6 bytes for IPv4 and 18 bytes for IPv6.
    #[serde(rename = "a")]
    pub address: ByteBuf,

    #[serde(rename = "v")]
    pub vendor: u32,

    #[serde(rename = "n")]
    pub version: u16,

    #[serde(rename = "i")]
    pub instance_id: u8,

    #[serde(rename = "f")]
    pub flags: u8,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DHTValue {
    #[serde(rename = "k")]
    pub primary_key: ByteBuf,

    #[serde(rename = "c")]
    pub creator: DHTContact,

    #[serde(rename = "t")]
    pub value_type: u32,

    #[serde(rename = "n")]
    pub version: u16,

    #[serde(rename = "v")]
    pub payload: ByteBuf,
}

// === PING ===

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DHTPingRequestArguments {}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DHTPingResponseArguments {
    /// The requester's address as seen by the responder.
    pub ip: ByteBuf,
}

// === FIND NODE ===

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DHTFindNodeRequestArguments {
    pub target: ByteBuf,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DHTFindNodeResponseArguments {
    pub token: ByteBuf,

    pub nodes: Vec<DHTContact>,
}

// === FIND VALUE ===

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DHTFindValueRequestArguments {
    pub target: ByteBuf,

    #[serde(rename = "type")]
    pub value_type: u32,

    pub keys: Vec<ByteBuf>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DHTFindValueResponseArguments {
    /// Bits of an `f32`, bencode has no floats.
    pub load: u32,

    pub values: Vec<DHTValue>,

    pub keys: Vec<ByteBuf>,
}

// === STORE ===

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DHTStoreRequestArguments {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<ByteBuf>,

    pub values: Vec<DHTValue>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DHTStoreResponseArguments {
    pub statuses: Vec<DHTStoreStatus>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DHTStoreStatus {
    #[serde(rename = "k")]
    pub primary_key: ByteBuf,

    #[serde(rename = "s")]
    pub secondary_key: ByteBuf,

    #[serde(rename = "c")]
    pub code: u16,
}
