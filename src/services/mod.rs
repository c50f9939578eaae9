//! Collaborator boundaries (traits plus their default implementations) and
//! the two engines built on top of them.

pub mod authorization;
pub mod bucket_service;
pub mod group_directory;
pub mod metadata_store;
pub mod notifier;
pub mod object_storage;
pub mod provisioner;
pub mod reconciler;
