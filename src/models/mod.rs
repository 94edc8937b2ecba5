mod bike;
mod counting_method;
mod maintenance;

pub use bike::{Bike, UNSAVED_ID};
pub use counting_method::CountingMethod;
pub use maintenance::{Maintenance, PENDING_DATE, PENDING_VALUE};
