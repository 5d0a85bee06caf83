// SPDX-License-Identifier: MIT OR Apache-2.0
//! Host-facing change notifications.
//!
//! Observers are registered on a graph and called synchronously, on the
//! graph's thread, right after the change they describe.

use crate::port::{InputRef, OutputRef, TypeMask};
use crate::value::Value;
use crate::variables::Version;

/// Handle returned by [`Graph::observe`](crate::Graph::observe)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(pub(crate) u64);

/// Receives graph change notifications. Every method defaults to doing nothing.
pub trait GraphObserver {
    /// `input` now reads from `output`
    fn input_connected(&mut self, input: InputRef, output: OutputRef) {
        let _ = (input, output);
    }

    /// `input` no longer reads from `output`
    fn input_disconnected(&mut self, input: InputRef, output: OutputRef) {
        let _ = (input, output);
    }

    /// An output resolved to a different type
    fn output_type_changed(&mut self, output: OutputRef, ty: TypeMask) {
        let _ = (output, ty);
    }

    /// A variable slot was written during evaluation
    fn variable_written(&mut self, name: &str, value: &Value, version: Version) {
        let _ = (name, value, version);
    }

    /// The work queue drained after doing work
    fn pass_completed(&mut self) {}
}
