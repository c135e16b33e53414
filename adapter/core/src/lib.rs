//! Adapter Core - Declarative Provider Adapter Engine
//!
//! Executes administrator-authored provider profiles against arbitrary HTTP
//! APIs and normalizes whatever comes back. Adding a provider means writing a
//! profile, not code.
//!
//! # Architecture
//!
//! ```text
//!             ┌────────────────────────────────────────────┐
//!  vars ─────>│                  Engine                    │
//!  profile ──>│                                            │
//!             │  ┌──────────────┐    ┌──────────────────┐  │
//!             │  │  Workflow    │───>│ Transport        │──┼──> provider
//!             │  │ Orchestrator │<───│ Executor         │<─┼─── HTTP
//!             │  └──────┬───────┘    └────────┬─────────┘  │
//!             │         │           inject / deep_merge    │
//!             │         v                                  │
//!             │  ┌──────────────┐                          │
//!             │  │  Response    │── get_by_path            │
//!             │  │  Mapper      │                          │
//!             │  └──────┬───────┘                          │
//!             └─────────┼──────────────────────────────────┘
//!                       v
//!               NormalizedContent
//!
//!  rules + context + availability ──> select_model ──> RouteSelection
//! ```
//!
//! # Key Types
//!
//! - [`Engine`]: entry point for [`Engine::execute_profile`] and
//!   [`Engine::select_model`]
//! - [`Profile`]: transport, response mapping and workflow for one provider
//! - [`NormalizedContent`]: provider-independent result
//! - [`RoutingRule`] / [`RequestContext`]: model routing inputs
//! - [`EngineError`]: every failure, tagged by step
//!
//! # Quick Start
//!
//! ```ignore
//! use adapter_core::{Engine, EngineConfig, ExecuteOptions, Profile, Vars};
//!
//! let engine = Engine::new(EngineConfig::default())?;
//! let profile = Profile::from_json(&std::fs::read_to_string("dalle.json")?)?;
//! let vars = Vars::new()
//!     .with("api_key", key)
//!     .with("prompt", "a lighthouse at dawn");
//!
//! let content = engine
//!     .execute_profile(&profile, &vars, &ExecuteOptions::new())
//!     .await?;
//! println!("{}", content.summary());
//! ```
//!
//! # Module Overview
//!
//! - [`template`]: placeholder injection, path extraction, deep merge
//! - [`transport`]: HTTP call assembly and execution
//! - [`workflow`]: sync calls and submit/poll/download jobs
//! - [`response`]: response mapping into [`NormalizedContent`]
//! - [`routing`]: rule matching and model selection
//! - [`profile`]: profile model and selection
//! - [`auth`]: credential seam and token cache
//! - [`config`]: engine configuration file support

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod auth;
pub mod config;
pub mod engine;
pub mod error;
pub mod profile;
pub mod response;
pub mod routing;
pub mod template;
pub mod transport;
pub mod workflow;

pub use auth::{AuthResolution, AuthResolver, CachedToken, StaticAuth, TokenCache};
pub use config::{load_config, ConfigError, ConfigOverrides, ConfigSource, EngineConfig, HttpSettings};
pub use engine::{Engine, ExecuteOptions};
pub use error::{EngineError, EngineResult};
pub use profile::{select_profile, Profile, Purpose};
pub use response::{MediaItem, MediaKind, NormalizedContent, ResponseMappingSpec, ResponseMode};
pub use routing::{
    select_model, AllAvailable, Condition, ModelAvailability, RequestContext, RouteSelection,
    RoutingRule, RuleScope,
};
pub use template::{deep_merge, get_by_path, inject, Vars};
pub use transport::{CallOverrides, HttpMethod, TransportSpec};
pub use workflow::{JobState, WorkflowSpec};

pub use tokio_util::sync::CancellationToken;
