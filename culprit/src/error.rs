use gix::{bstr::BString, ObjectId};

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// The error produced when a blame cannot be generated.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("no such path '{path}' in {commit}")]
    NoSuchPath { path: BString, commit: ObjectId },
    #[error("file has only {lines} lines, requested range ends at line {requested}")]
    FileTooShort { lines: u32, requested: u32 },
    #[error("Error finding object: {0}")]
    FindObject(#[from] gix::object::find::existing::Error),
    #[error("Error peeling object: {0}")]
    Peel(#[from] gix::object::peel::to_kind::Error),
    #[error("Object is not a commit: {0}")]
    NotACommit(#[from] gix::object::try_into::Error),
    #[error("Error reading commit metadata: {0}")]
    Commit(#[from] gix::object::commit::Error),
    #[error("Error decoding object: {0}")]
    Decode(#[from] gix::objs::decode::Error),
    #[error("Malformed object id in ancestry file: {0}")]
    AncestryId(#[from] gix::hash::decode::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
