//! speakeasy-workflow: The analysis session state machine.
//!
//! One [`WorkflowController`] owns one session at a time:
//!
//! ```text
//! Idle ──select+submit──▶ Uploading(0) ──progress──▶ Uploading(p) ──100──▶ Analyzing
//!   ▲                          │                                             │
//!   │                          └──────────── transport error ──────┐        │
//!   │                                                               ▼        ▼
//!   └──────────── reset ─────────── Success ◀── service ok ──── Error ◀── service error
//!                                                                │
//!                                               resubmit ────────┘──▶ Uploading(0)
//! ```

pub mod controller;
pub mod events;

pub use controller::{WorkflowController, WorkflowError};
pub use events::WorkflowEvent;
