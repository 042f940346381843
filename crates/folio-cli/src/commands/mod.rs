pub mod cleanup;
pub mod content;
pub mod daemon;
pub mod revisions;
pub mod trash;
