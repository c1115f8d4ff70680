//! Request lifecycle control.
//!
//! `lifecycle` owns the Ready/Busy state machine and renders outcomes into the
//! display; `controller` executes submissions against the backend. UI and CLI
//! layers drive both and only ever touch the display through a `Session`.

mod controller;
mod lifecycle;

pub(crate) use controller::{execute_submission, run_controller, UiCommand};
pub(crate) use lifecycle::{Display, Editor, Session};
