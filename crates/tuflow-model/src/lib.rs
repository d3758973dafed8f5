//! `tuflow-model` - Editable object graph for TUFLOW control files.
//!
//! This crate builds on `tuflow-syntax` and owns everything that touches
//! files:
//!
//! - **Build state**: Every control file, `Read File` fragment and database
//!   of a model, loaded depth-first with every branch and scope kept
//! - **Queries**: Input lookup by command, value, kind and scope
//! - **Edits**: Insert, remove, comment, rescope and retarget inputs, each
//!   recorded in an undo log
//! - **Run state**: The model seen through one scenario/event selection
//! - **Writing**: Lossless output with configurable file renaming
//!
//! # Architecture
//!
//! Control files, inputs and databases live in arenas owned by [`Model`]
//! and refer to each other by id. Ids stay valid for the lifetime of the
//! model; removed inputs are detached, never freed, so undo can reattach
//! them.
//!
//! # Example
//!
//! ```
//! use tuflow_model::{FileGis, MemoryFileSystem, Model, RunContext};
//!
//! let fs = MemoryFileSystem::new().with_file(
//!     "/m/model.tcf",
//!     "If Scenario == D01\nCell Size == 2\nElse\nCell Size == 5\nEnd If\n",
//! );
//! let model = Model::load("/m/model.tcf", fs, FileGis).unwrap();
//! let run = model.context(RunContext::new().scenario("D01")).unwrap();
//! assert_eq!(run.value("Cell Size"), Some("2"));
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![allow(clippy::module_name_repetitions)]

pub mod changes;
pub mod conditions;
pub mod config;
pub mod control_file;
pub mod database;
pub mod dispatch;
pub mod error;
pub mod ids;
pub mod input;
mod loader;
mod model;
pub mod query;
pub mod run_state;
pub mod services;
pub mod writer;

pub use changes::{Change, ChangeKind, ChangeLog};
pub use conditions::{Condition, ConditionCode, Severity};
pub use config::{GisFormat, ModelConfig, ModelSettings};
pub use control_file::{ControlFile, ControlFileKind, LoadState};
pub use database::{Database, DatabaseKind, Entry, EntryValue, EventDatabase, TableFormat};
pub use error::{ModelError, Result};
pub use ids::{ChildRef, ControlFileId, DatabaseId, InputId};
pub use input::{Input, InputKind, Position};
pub use model::Model;
pub use query::InputQuery;
pub use run_state::{ResolvedEntry, ResolvedInput, RunContext, RunState};
pub use services::{FileGis, FileSystem, GeometryType, GisService, MemoryFileSystem, StdFileSystem};
pub use writer::{WritePolicy, WriteSummary};
