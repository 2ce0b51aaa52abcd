#![allow(clippy::excessive_precision)]
#![allow(missing_docs)]

pub mod backend;
pub mod cache;
pub mod config;
pub mod error;
pub mod graphics;
pub mod interop;
pub mod pipeline;
pub mod scene;
pub mod session;
