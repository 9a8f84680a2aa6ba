//! Threshold-driven deletion of extreme points from a time-series middleware.
//!
//! [`validate`] turns operator input into a [`DeletionRequest`]; the
//! [`DeletionEngine`] then repeatedly fetches the window's extreme through a
//! [`DataGateway`] and deletes it while it crosses the threshold.

pub mod engine;
pub mod events;
pub mod gateway;
pub mod request;
pub mod threshold;
pub mod validate;

pub use engine::{DeletionEngine, RunHandle, StartError};
pub use events::{EngineEvent, EventLevel, RunEvent, RunOutcome, RunSnapshot, RunStatus};
pub use gateway::{DataGateway, FakeGateway, GatewayError, HttpGateway};
pub use request::{DeletionRequest, ExtremePoint, RawFields};
pub use threshold::{exceeds, Sign, Threshold};
pub use validate::{validate, Field, ValidationError, ValidationErrors};
