pub mod activation;
pub mod job_store;
pub mod models;
pub mod release;
pub mod submit_description;
pub mod transfer_service;
pub mod transfer_spec;
pub mod wait;

pub use activation::{AutoActivationPass, EndpointActivator, InteractionMode, Prompter};
pub use job_store::JobStore;
pub use models::{
    ActivationStatus, AttrValue, AutoActivation, CancelOutcome, DirEntry, Endpoint, EntryKind,
    JobId, JobRecord, JobStatus, PollOutcome, SyncLevel, Task, TaskState, TransferItem, TransferRequest,
};
pub use release::{HoldResolver, JobResolution, ReleaseReport};
pub use transfer_service::TransferService;
pub use transfer_spec::{parse_transfer_spec, parse_transfer_specs};
pub use wait::{WaitPolicy, wait_for_task};
