//! Collaborators that pull external data into the store.

pub mod download;
pub mod error;
pub mod postal;
pub mod stations;
pub mod topojson;
pub mod weather;
