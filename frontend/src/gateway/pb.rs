//! Gateway wire messages (`moby.buildkit.v1.frontend` and `google.rpc`).
//!
//! Only the fields the frontend reads or writes are declared; unknown fields
//! sent by the engine are skipped by prost.

use std::collections::BTreeMap;

use crate::llb::pb::Definition;

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SolveRequest {
    #[prost(message, optional, tag = "1")]
    pub definition: Option<Definition>,
    #[prost(string, tag = "2")]
    pub frontend: String,
    #[prost(btree_map = "string, string", tag = "3")]
    pub frontend_opt: BTreeMap<String, String>,
    #[prost(bool, tag = "5")]
    pub allow_result_return: bool,
    #[prost(bool, tag = "10")]
    pub r#final: bool,
    #[prost(bool, tag = "14")]
    pub evaluate: bool,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SolveResponse {
    /// Deprecated single reference, still sent by older engines
    #[prost(string, tag = "1")]
    pub r#ref: String,
    #[prost(message, optional, tag = "3")]
    pub result: Option<BuildResult>,
}

/// `moby.buildkit.v1.frontend.Result`
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct BuildResult {
    #[prost(oneof = "build_result::Kind", tags = "1, 3")]
    pub result: Option<build_result::Kind>,
    #[prost(btree_map = "string, bytes", tag = "10")]
    pub metadata: BTreeMap<String, Vec<u8>>,
}

pub mod build_result {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Kind {
        #[prost(string, tag = "1")]
        RefDeprecated(String),
        #[prost(message, tag = "3")]
        Ref(super::Ref),
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Ref {
    #[prost(string, tag = "1")]
    pub id: String,
    #[prost(message, optional, tag = "2")]
    pub def: Option<Definition>,
}

impl BuildResult {
    /// Reference id carried by the result, in either encoding.
    pub fn reference(&self) -> Option<&str> {
        match &self.result {
            Some(build_result::Kind::Ref(r)) => Some(r.id.as_str()),
            Some(build_result::Kind::RefDeprecated(id)) => Some(id.as_str()),
            None => None,
        }
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ReadFileRequest {
    #[prost(string, tag = "1")]
    pub r#ref: String,
    #[prost(string, tag = "2")]
    pub file_path: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ReadFileResponse {
    #[prost(bytes = "vec", tag = "1")]
    pub data: Vec<u8>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ReturnRequest {
    #[prost(message, optional, tag = "1")]
    pub result: Option<BuildResult>,
    #[prost(message, optional, tag = "2")]
    pub error: Option<RpcStatus>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ReturnResponse {}

/// `google.rpc.Status`
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RpcStatus {
    #[prost(int32, tag = "1")]
    pub code: i32,
    #[prost(string, tag = "2")]
    pub message: String,
}

impl From<&tonic::Status> for RpcStatus {
    fn from(status: &tonic::Status) -> Self {
        Self {
            code: status.code() as i32,
            message: status.message().to_string(),
        }
    }
}
