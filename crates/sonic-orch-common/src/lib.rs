//! Common orchestration abstractions for SONiC.
//!
//! - [`Orch`]: Base trait for orchestration agents
//! - [`Consumer`]: Per-table pending queue of change-feed entries
//! - [`TaskStatus`]: Outcome of processing one entry
//!
//! # Architecture
//!
//! 1. Producers write SET/DEL operations into APPL_DB tables
//! 2. Each Orch owns one [`Consumer`] per subscribed table
//! 3. The daemon loop calls [`Orch::do_task`] while entries are pending
//! 4. Entries whose [`TaskStatus`] keeps them pending are re-queued
//!
//! # Example
//!
//! ```ignore
//! use sonic_orch_common::{Consumer, Orch, TaskStatus};
//!
//! async fn do_task(&mut self) {
//!     for entry in self.consumer.drain() {
//!         if self.process(&entry).keeps_pending() {
//!             self.consumer.retry(entry);
//!         }
//!     }
//! }
//! ```

mod consumer;
mod orch;
mod task;

pub use consumer::{Consumer, ConsumerConfig, FieldValue, KeyOpFieldsValues, Operation};
pub use orch::Orch;
pub use task::TaskStatus;
