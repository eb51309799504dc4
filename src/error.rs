//! Crate-level error aggregate. Every module keeps its own typed error (per
//! the teacher's `NetflowError` shape); `FlowpackError` exists for callers
//! who want one type to match on, the same role `NetflowError` plays over
//! the teacher's per-version parse failures.

use std::fmt;

#[derive(Debug)]
pub enum FlowpackError {
    Classifier(crate::classifier::ClassifierError),
    Classify(crate::classifier::ClassifyError),
    Stream(crate::stream::Error),
    Compress(crate::compress::Error),
    Match(crate::rwmatch::Error),
    Config(crate::config::Error),
}

impl fmt::Display for FlowpackError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Classifier(e) => write!(f, "classifier: {e}"),
            Self::Classify(e) => write!(f, "classify: {e}"),
            Self::Stream(e) => write!(f, "stream: {e}"),
            Self::Compress(e) => write!(f, "compress: {e}"),
            Self::Match(e) => write!(f, "rwmatch: {e}"),
            Self::Config(e) => write!(f, "config: {e}"),
        }
    }
}

impl std::error::Error for FlowpackError {}

impl From<crate::classifier::ClassifierError> for FlowpackError {
    fn from(e: crate::classifier::ClassifierError) -> Self {
        Self::Classifier(e)
    }
}

impl From<crate::classifier::ClassifyError> for FlowpackError {
    fn from(e: crate::classifier::ClassifyError) -> Self {
        Self::Classify(e)
    }
}

impl From<crate::stream::Error> for FlowpackError {
    fn from(e: crate::stream::Error) -> Self {
        Self::Stream(e)
    }
}

impl From<crate::compress::Error> for FlowpackError {
    fn from(e: crate::compress::Error) -> Self {
        Self::Compress(e)
    }
}

impl From<crate::rwmatch::Error> for FlowpackError {
    fn from(e: crate::rwmatch::Error) -> Self {
        Self::Match(e)
    }
}

impl From<crate::config::Error> for FlowpackError {
    fn from(e: crate::config::Error) -> Self {
        Self::Config(e)
    }
}
