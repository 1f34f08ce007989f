#![forbid(unsafe_code)]

mod error;
mod fallback;
mod policy;

pub use crate::{
    error::{LoadError, LoadResult, ParserErrorKind},
    fallback::{FallbackOptions, FallbackSelection, FallbackType},
    policy::{
        DefaultLoadErrorHandlingPolicy, LoadErrorDecision, LoadErrorHandlingPolicy,
        LoadErrorInfo, PolicyOptions,
    },
};
