//! Protobuf messages exchanged between the two signers.
//!
//! Equivalent to this schema:
//!
//! ```proto
//! syntax = "proto3";
//! package balanceswire;
//!
//! message BalancesState {
//!   bytes participant0 = 1;
//!   bytes nonce = 2;          // big-endian, at most 32 bytes
//!   bytes participant1 = 3;
//!   bytes balance0 = 4;
//!   bytes balance1 = 5;
//! }
//! message StateProposalMsg { BalancesState state = 1; }
//! message StateSignatureMsg { bytes hash = 1; bytes sig = 2; }
//! message StateRejectedMsg { bytes hash = 1; string reason = 2; }
//!
//! message Envelope {
//!   oneof msg {
//!     StateProposalMsg state_proposal = 1;
//!     StateSignatureMsg state_signature = 2;
//!     StateRejectedMsg state_rejected = 3;
//!   }
//! }
//! ```

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct BalancesState {
    #[prost(bytes = "vec", tag = "1")]
    pub participant0: Vec<u8>,
    #[prost(bytes = "vec", tag = "2")]
    pub nonce: Vec<u8>,
    #[prost(bytes = "vec", tag = "3")]
    pub participant1: Vec<u8>,
    #[prost(bytes = "vec", tag = "4")]
    pub balance0: Vec<u8>,
    #[prost(bytes = "vec", tag = "5")]
    pub balance1: Vec<u8>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct StateProposalMsg {
    #[prost(message, optional, tag = "1")]
    pub state: Option<BalancesState>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct StateSignatureMsg {
    #[prost(bytes = "vec", tag = "1")]
    pub hash: Vec<u8>,
    #[prost(bytes = "vec", tag = "2")]
    pub sig: Vec<u8>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct StateRejectedMsg {
    #[prost(bytes = "vec", tag = "1")]
    pub hash: Vec<u8>,
    #[prost(string, tag = "2")]
    pub reason: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Envelope {
    #[prost(oneof = "envelope::Msg", tags = "1, 2, 3")]
    pub msg: Option<envelope::Msg>,
}

pub mod envelope {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Msg {
        #[prost(message, tag = "1")]
        StateProposal(super::StateProposalMsg),
        #[prost(message, tag = "2")]
        StateSignature(super::StateSignatureMsg),
        #[prost(message, tag = "3")]
        StateRejected(super::StateRejectedMsg),
    }
}
