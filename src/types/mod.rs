pub mod geometry;
pub mod link;
pub mod observation;
pub mod postal_area;
pub mod scope;
pub mod station;
