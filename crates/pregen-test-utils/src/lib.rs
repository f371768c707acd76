//! Testing utilities for the pregen workspace
//!
//! An in-memory target: class images built on the fly, a runtime that
//! defines types from those (patched) images, and a scripted server for
//! release 1.14.4.

#![allow(missing_docs)]

mod class;
mod runtime;
mod server;

pub use class::ClassImage;
pub use runtime::{FakeRuntime, FieldGetter, MethodBehavior};
pub use server::{FakeConsole, FakeServer, FakeServerBuilder, CATALOG, MAPPING_1_14_4, RELEASE};
