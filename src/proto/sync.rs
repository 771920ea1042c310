//! App-state sync records.

use prost::Message;

/// Plaintext of one encrypted mutation.
#[derive(Clone, PartialEq, Message)]
pub struct SyncActionData {
    /// JSON-encoded index array.
    #[prost(bytes, optional, tag = "1")]
    pub index: Option<Vec<u8>>,
    #[prost(message, optional, tag = "2")]
    pub value: Option<SyncActionValue>,
    #[prost(bytes, optional, tag = "3")]
    pub padding: Option<Vec<u8>>,
    #[prost(int32, optional, tag = "4")]
    pub version: Option<i32>,
}

#[derive(Clone, PartialEq, Message)]
pub struct SyncActionValue {
    #[prost(int64, optional, tag = "1")]
    pub timestamp: Option<i64>,
    #[prost(message, optional, tag = "2")]
    pub star_action: Option<StarAction>,
    #[prost(message, optional, tag = "3")]
    pub contact_action: Option<ContactAction>,
    #[prost(message, optional, tag = "4")]
    pub mute_action: Option<MuteAction>,
    #[prost(message, optional, tag = "5")]
    pub pin_action: Option<PinAction>,
    #[prost(message, optional, tag = "17")]
    pub archive_chat_action: Option<ArchiveChatAction>,
}

#[derive(Clone, PartialEq, Message)]
pub struct StarAction {
    #[prost(bool, optional, tag = "1")]
    pub starred: Option<bool>,
}

#[derive(Clone, PartialEq, Message)]
pub struct ContactAction {
    #[prost(string, optional, tag = "1")]
    pub full_name: Option<String>,
    #[prost(string, optional, tag = "2")]
    pub first_name: Option<String>,
}

#[derive(Clone, PartialEq, Message)]
pub struct MuteAction {
    #[prost(bool, optional, tag = "1")]
    pub muted: Option<bool>,
    #[prost(int64, optional, tag = "2")]
    pub mute_end_timestamp: Option<i64>,
}

#[derive(Clone, PartialEq, Message)]
pub struct PinAction {
    #[prost(bool, optional, tag = "1")]
    pub pinned: Option<bool>,
}

#[derive(Clone, PartialEq, Message)]
pub struct ArchiveChatAction {
    #[prost(bool, optional, tag = "1")]
    pub archived: Option<bool>,
}
