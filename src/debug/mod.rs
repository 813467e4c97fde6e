// src/debug/mod.rs

//! The `debug` module is functions for printing in debug builds and
//! test builds, and the diagnostic macros used throughout _eltlib_.

pub mod printers;
