//! Trigger requests and their submission.
//!
//! # Components
//!
//! - [`TriggerRequest`]: one dialect-neutral request, parsed from and
//!   serialized to either client dialect
//! - [`parse_trigger_dump`]: task id / invocation extraction from the
//!   client's JSON dump
//! - [`TaskTriggerDispatcher`]: scopes the request per shard and submits it
//!
//! # Dialects
//!
//! | item      | legacy                  | go                       |
//! |-----------|-------------------------|--------------------------|
//! | server    | `--swarming host`       | `--server host`          |
//! | dimension | `--dimension key value` | `--dimension key=value`  |
//! | env       | `--env KEY=VALUE`       | `-env KEY=VALUE`         |
//! | tag       | `--tag t`               | `-tag t`                 |

pub mod dispatcher;
pub mod request;
pub mod response;

pub use dispatcher::{DispatchSummary, ShardFailure, TaskTriggerDispatcher, TriggerResult};
pub use request::{convert_to_go_args, RequestItem, TriggerRequest};
pub use response::{parse_trigger_dump, TriggeredTask};
