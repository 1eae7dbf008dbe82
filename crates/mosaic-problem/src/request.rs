//! Evaluation requests, results, and cancellation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use indexmap::IndexMap;
use nalgebra::DVector;
use nalgebra_sparse::CsrMatrix;

/// Which tag vectors and tag matrices one evaluation should fill.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EvalRequest {
    /// Vector tag names, in output order.
    pub vector_tags: Vec<String>,
    /// Matrix tag names, in output order.
    pub matrix_tags: Vec<String>,
}

impl EvalRequest {
    /// An empty request.
    pub fn new() -> Self {
        Self::default()
    }

    /// A request for one vector tag.
    pub fn residual(tag: &str) -> Self {
        Self::new().with_vector(tag)
    }

    /// A request for one matrix tag.
    pub fn jacobian(tag: &str) -> Self {
        Self::new().with_matrix(tag)
    }

    /// Add a vector tag.
    pub fn with_vector(mut self, tag: &str) -> Self {
        self.vector_tags.push(tag.to_string());
        self
    }

    /// Add a matrix tag.
    pub fn with_matrix(mut self, tag: &str) -> Self {
        self.matrix_tags.push(tag.to_string());
        self
    }
}

/// The filled tag vectors and matrices of one evaluation.
#[derive(Clone, Debug, Default)]
pub struct EvalOutput {
    /// Vector per requested vector tag.
    pub vectors: IndexMap<String, DVector<f64>>,
    /// Matrix per requested matrix tag.
    pub matrices: IndexMap<String, CsrMatrix<f64>>,
}

impl EvalOutput {
    /// The vector of a tag, if requested.
    pub fn vector(&self, tag: &str) -> Option<&DVector<f64>> {
        self.vectors.get(tag)
    }

    /// The matrix of a tag, if requested.
    pub fn matrix(&self, tag: &str) -> Option<&CsrMatrix<f64>> {
        self.matrices.get(tag)
    }
}

/// Shared flag that aborts an in-flight evaluation.
///
/// Workers poll it between elements. Every evaluation clears it on
/// return, so a cancel that lands after the last poll is dropped with the
/// call it was aimed at. A cancel issued between calls aborts the next one.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// A token that is not cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Returns `true` if cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    pub(crate) fn reset(&self) {
        self.0.store(false, Ordering::Release);
    }
}
