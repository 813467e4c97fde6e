// src/tests/mod.rs

//! Tests for _eltlib_.
//!
//! Tests are placed at `src/tests/`, inside the `eltlib`. This is a
//! reasonable trade-off of separation and access.
//!
//! Tests placed at top-level path `tests/` do not have crate-internal
//! visibility. While it is recommended to not require internal visibility for
//! testing, in practice that often makes tests difficult or impossible to
//! implement.
//!
//! Every test runs against the in-memory event log in [`common`], on every
//! platform.

pub mod common;
pub mod dispatch_tests;
pub mod event_tests;
