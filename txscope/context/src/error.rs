use miette::Diagnostic;
use thiserror::Error;

use crate::key::ResourceKey;

#[derive(Debug, Error, Diagnostic)]
pub enum ContextError {
    #[error("a resource is already bound for key [{0}]")]
    AlreadyBound(ResourceKey),
}

pub type ContextResult<T> = std::result::Result<T, ContextError>;
