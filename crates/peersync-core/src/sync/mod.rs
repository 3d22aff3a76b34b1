//! Peer replication: merge engine, protocol, transport, and cycle scheduling

mod client;
mod merge;
mod orchestrator;
mod protocol;
mod scheduler;
mod transport;

pub use client::{HttpPeerClient, DEFAULT_HANDSHAKE_TIMEOUT, DEFAULT_REQUEST_TIMEOUT};
pub use merge::{merge_record, ApplyReport, MergeError, MergeOutcome};
pub use orchestrator::{CyclePhase, CycleStatus, SyncOrchestrator, SyncReport};
pub use protocol::{
    change_count, handshake, pull, push, to_wire, ChangeSet, HandshakeResponse, PullRequest,
    PullResponse, PushRequest, PushResponse, WireChangeSet, WireRecord,
};
pub use scheduler::{SchedulerHandle, SyncScheduler};
pub use transport::{PeerTransport, TransportError};
