pub mod archive;

pub use archive::ArchivedSubject;
