//! Version 1 of the session RPC messages.

/// Lifecycle state of a session as seen on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum SessionStateV1 {
    Created = 0,
    InUse = 1,
    Revoked = 2,
    Expired = 3,
}

impl SessionStateV1 {
    /// Name of the enum value as it appears in the schema.
    pub fn as_str_name(&self) -> &'static str {
        match self {
            SessionStateV1::Created => "STATE_CREATED",
            SessionStateV1::InUse => "STATE_IN_USE",
            SessionStateV1::Revoked => "STATE_REVOKED",
            SessionStateV1::Expired => "STATE_EXPIRED",
        }
    }
}

/// Authorization mode of a session as seen on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum SessionTypeV1 {
    MacaroonReadonly = 0,
    MacaroonAdmin = 1,
    MacaroonCustom = 2,
    UiPassword = 3,
}

impl SessionTypeV1 {
    /// Name of the enum value as it appears in the schema.
    pub fn as_str_name(&self) -> &'static str {
        match self {
            SessionTypeV1::MacaroonReadonly => "TYPE_MACAROON_READONLY",
            SessionTypeV1::MacaroonAdmin => "TYPE_MACAROON_ADMIN",
            SessionTypeV1::MacaroonCustom => "TYPE_MACAROON_CUSTOM",
            SessionTypeV1::UiPassword => "TYPE_UI_PASSWORD",
        }
    }
}

/// Flat session record returned by Add and List.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SessionV1 {
    #[prost(string, tag = "1")]
    pub label: ::prost::alloc::string::String,
    #[prost(enumeration = "SessionStateV1", tag = "2")]
    pub session_state: i32,
    #[prost(enumeration = "SessionTypeV1", tag = "3")]
    pub session_type: i32,
    #[prost(uint64, tag = "4")]
    pub expiry_timestamp_seconds: u64,
    #[prost(string, tag = "5")]
    pub mailbox_server_addr: ::prost::alloc::string::String,
    #[prost(bool, tag = "6")]
    pub dev_server: bool,
    #[prost(bytes = "vec", tag = "7")]
    pub pairing_secret: ::prost::alloc::vec::Vec<u8>,
    #[prost(string, tag = "8")]
    pub pairing_secret_mnemonic: ::prost::alloc::string::String,
    /// Compressed secp256k1 point (33 bytes).
    #[prost(bytes = "vec", tag = "9")]
    pub local_public_key: ::prost::alloc::vec::Vec<u8>,
    /// Compressed secp256k1 point, empty until a remote peer has paired.
    #[prost(bytes = "vec", tag = "10")]
    pub remote_public_key: ::prost::alloc::vec::Vec<u8>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct AddSessionRequestV1 {
    #[prost(string, tag = "1")]
    pub label: ::prost::alloc::string::String,
    #[prost(enumeration = "SessionTypeV1", tag = "2")]
    pub session_type: i32,
    #[prost(uint64, tag = "3")]
    pub expiry_timestamp_seconds: u64,
    #[prost(string, tag = "4")]
    pub mailbox_server_addr: ::prost::alloc::string::String,
    #[prost(bool, tag = "5")]
    pub dev_server: bool,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct AddSessionResponseV1 {
    #[prost(message, optional, tag = "1")]
    pub session: ::core::option::Option<SessionV1>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ListSessionsRequestV1 {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ListSessionsResponseV1 {
    #[prost(message, repeated, tag = "1")]
    pub sessions: ::prost::alloc::vec::Vec<SessionV1>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RevokeSessionRequestV1 {
    #[prost(bytes = "vec", tag = "8")]
    pub local_public_key: ::prost::alloc::vec::Vec<u8>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RevokeSessionResponseV1 {}
