//! Repository traits for metadata operations.

pub mod cases;
pub mod comments;
pub mod evidences;
pub mod users;

pub use cases::CaseRepo;
pub use comments::CommentRepo;
pub use evidences::EvidenceRepo;
pub use users::UserRepo;
